use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::document::chunker::TextChunker;
use crate::document::extractor::{extract_pages_blocking, join_pages, ExtractionError};
use crate::document::uploads::UploadDir;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("Could not store upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub file_name: String,
    pub pages: usize,
    pub text_chars: usize,
    pub chunks: Vec<String>,
}

/// Collection name for a document: stable for the same name and bytes.
pub fn collection_name(file_name: &str, bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    file_name.hash(&mut hasher);
    bytes.hash(&mut hasher);
    format!("doc_{:016x}", hasher.finish())
}

pub struct DocumentProcessor {
    chunker: TextChunker,
    uploads: UploadDir,
}

impl DocumentProcessor {
    pub fn new(chunker: TextChunker, uploads: UploadDir) -> Self {
        Self { chunker, uploads }
    }

    pub fn uploads(&self) -> &UploadDir {
        &self.uploads
    }

    /// Saves the upload, extracts and chunks its text, then deletes the
    /// saved file whether or not extraction succeeded.
    pub async fn process(&self, file_name: &str, bytes: Vec<u8>) -> Result<ProcessedDocument, ProcessingError> {
        let path = self.uploads.save(file_name, &bytes).await?;
        let extracted = extract_pages_blocking(bytes).await;

        if let Err(e) = self.uploads.remove(&path).await {
            log::warn!("Failed to remove upload {}: {}", path.display(), e);
        }

        let pages = extracted?;
        let text = join_pages(&pages);
        let chunks = self.chunker.split(&text);
        if chunks.is_empty() {
            return Err(ExtractionError::NoText.into());
        }

        log::info!(
            "Processed {}: {} pages, {} chunks",
            file_name,
            pages.len(),
            chunks.len()
        );

        Ok(ProcessedDocument {
            file_name: file_name.to_string(),
            pages: pages.len(),
            text_chars: text.chars().count(),
            chunks,
        })
    }
}
