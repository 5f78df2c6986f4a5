use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use crate::database::vector_db::{ChunkRecord, VectorDB, VectorDBError};
use crate::document::chunker::{ChunkerError, TextChunker};
use crate::document::extractor::ExtractionError;
use crate::document::processor::{collection_name, DocumentProcessor, ProcessedDocument, ProcessingError};
use crate::document::uploads::UploadDir;
use crate::llm::chat::{ChatHistory, ChatMessage, Role};
use crate::llm::embeddings::{EmbeddingError, EmbeddingGenerator};
use crate::llm::generator::{Answer, AnswerGenerator};
use crate::llm::semantic_search::{RetrievalError, SemanticSearch};
use crate::providers::traits::{CompletionProvider, EmbeddingProvider, ProviderError};

const INDEX_CACHE_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Upload a PDF before asking questions")]
    NoDocument,
    #[error("Invalid chunking configuration: {0}")]
    Chunker(#[from] ChunkerError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("Could not store upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("Generation failed: {0}")]
    Generation(#[from] ProviderError),
    #[error("Vector store error: {0}")]
    Store(#[from] VectorDBError),
    #[error("Indexed {stored} chunks but produced {chunks}")]
    IndexMismatch { chunks: usize, stored: usize },
}

impl From<ProcessingError> for RagError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Extraction(e) => RagError::Extraction(e),
            ProcessingError::Io(e) => RagError::Io(e),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexedDocument {
    pub file_name: String,
    pub collection: String,
    pub pages: usize,
    pub text_chars: usize,
    pub chunks: usize,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    #[serde(flatten)]
    pub document: IndexedDocument,
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub removed_files: usize,
    pub dropped_collections: usize,
}

/// One chat session over one active PDF: indexing, question answering and
/// the chat history that goes with it.
pub struct RagSystem {
    processor: DocumentProcessor,
    embeddings: EmbeddingGenerator,
    search: SemanticSearch,
    generator: AnswerGenerator,
    vector_db: VectorDB,
    indexed: LruCache<String, IndexedDocument>,
    active: Option<IndexedDocument>,
    history: ChatHistory,
}

impl RagSystem {
    pub fn new(
        config: &AppConfig,
        vector_db: VectorDB,
        completion: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, RagError> {
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        let embeddings = EmbeddingGenerator::new(embedder);
        let search = SemanticSearch::new(
            vector_db.clone(),
            embeddings.clone(),
            completion.clone(),
            config.top_k,
            config.hyde_enabled,
        );
        let generator = AnswerGenerator::new(completion);
        let capacity = NonZeroUsize::new(INDEX_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);

        log::info!(
            "Pipeline: model {}, embeddings {}, chunks {} chars with {} overlap, top {} (hyde: {})",
            generator.model(),
            embeddings.model(),
            chunker.chunk_size(),
            chunker.overlap(),
            search.top_k(),
            config.hyde_enabled
        );

        let processor = DocumentProcessor::new(chunker, UploadDir::new(&config.upload_dir));

        Ok(Self {
            processor,
            embeddings,
            search,
            generator,
            vector_db,
            indexed: LruCache::new(capacity),
            active: None,
            history: ChatHistory::new(),
        })
    }

    /// Drops every collection left in the store by a previous run.
    pub async fn reset_store(&self) -> Result<usize, RagError> {
        let collections = self.vector_db.list_collections().await?;
        for name in &collections {
            self.vector_db.delete_collection(name).await?;
        }
        if !collections.is_empty() {
            log::info!("Removed {} stale collections", collections.len());
        }
        Ok(collections.len())
    }

    pub fn active_document(&self) -> Option<&IndexedDocument> {
        self.active.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.history.messages()
    }

    pub fn uploads(&self) -> &UploadDir {
        self.processor.uploads()
    }

    pub async fn index_document(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<IndexReport, RagError> {
        let collection = collection_name(file_name, &bytes);

        if let Some(document) = self.cached(&collection).await? {
            log::info!("Using previously processed {}", document.file_name);
            self.activate(document.clone());
            return Ok(IndexReport { document, reused: true });
        }

        let processed = self.processor.process(file_name, bytes).await?;
        let document = self.index_processed(processed, &collection).await?;
        Ok(IndexReport { document, reused: false })
    }

    /// Embeds and stores already-chunked text under `collection`, making it
    /// the active document.
    pub async fn index_processed(
        &mut self,
        processed: ProcessedDocument,
        collection: &str,
    ) -> Result<IndexedDocument, RagError> {
        if processed.chunks.is_empty() {
            return Err(ExtractionError::NoText.into());
        }

        let vectors = self.embeddings.embed_chunks(&processed.chunks).await?;
        let dimension = vectors.first().map(|v| v.len()).unwrap_or_default();

        // Start from an empty collection so a failed earlier attempt leaves nothing behind
        self.vector_db.delete_collection(collection).await?;
        self.vector_db.create_collection(collection, dimension).await?;

        let records: Vec<ChunkRecord> = processed.chunks
            .iter()
            .enumerate()
            .map(|(seq, text)| ChunkRecord {
                seq,
                text: text.clone(),
                source: processed.file_name.clone(),
            })
            .collect();

        let chunk_count = records.len();
        if let Err(e) = self.vector_db.store_vectors(collection, records, vectors).await {
            self.drop_collection(collection).await;
            return Err(e.into());
        }

        let stored = self.vector_db.count(collection).await?;
        if stored != chunk_count {
            self.drop_collection(collection).await;
            return Err(RagError::IndexMismatch { chunks: chunk_count, stored });
        }

        let document = IndexedDocument {
            file_name: processed.file_name,
            collection: collection.to_string(),
            pages: processed.pages,
            text_chars: processed.text_chars,
            chunks: chunk_count,
            indexed_at: Utc::now(),
        };

        if let Some((evicted, _)) = self.indexed.push(document.collection.clone(), document.clone()) {
            if evicted != document.collection {
                self.drop_collection(&evicted).await;
            }
        }

        self.activate(document.clone());
        log::info!("Indexed {} into {} ({} chunks)", document.file_name, document.collection, chunk_count);
        Ok(document)
    }

    /// Answers against the active document. Failures are also recorded in
    /// the chat history as an assistant message.
    pub async fn ask(&mut self, question: &str) -> Result<Answer, RagError> {
        let collection = self.active
            .as_ref()
            .map(|d| d.collection.clone())
            .ok_or(RagError::NoDocument)?;

        self.history.push(Role::User, question);

        match self.answer(&collection, question).await {
            Ok(answer) => {
                self.history.push(Role::Assistant, answer.text.clone());
                Ok(answer)
            }
            Err(e) => {
                log::error!("Query failed: {}", e);
                self.history.push(Role::Assistant, format!("Error processing query: {}", e));
                Err(e)
            }
        }
    }

    async fn answer(&self, collection: &str, question: &str) -> Result<Answer, RagError> {
        let retrieval = self.search.search(collection, question).await?;
        Ok(self.generator.generate(question, retrieval).await?)
    }

    /// Forgets the active document and history, drops every collection of
    /// this session and deletes temporary uploads.
    pub async fn clear(&mut self) -> Result<ClearReport, RagError> {
        let collections: Vec<String> = self.indexed.iter().map(|(name, _)| name.clone()).collect();
        for name in &collections {
            self.vector_db.delete_collection(name).await?;
        }
        self.indexed.clear();
        self.active = None;
        self.history.clear();

        let removed_files = self.processor.uploads().clear().await?;
        log::info!(
            "Session cleared ({} collections, {} temporary files)",
            collections.len(),
            removed_files
        );

        Ok(ClearReport {
            removed_files,
            dropped_collections: collections.len(),
        })
    }

    /// A cached document only counts if its vectors are still in the store.
    async fn cached(&mut self, collection: &str) -> Result<Option<IndexedDocument>, RagError> {
        let Some(document) = self.indexed.get(collection).cloned() else {
            return Ok(None);
        };

        if self.vector_db.count(collection).await? == document.chunks {
            Ok(Some(document))
        } else {
            self.indexed.pop(collection);
            Ok(None)
        }
    }

    fn activate(&mut self, document: IndexedDocument) {
        let switching = self.active
            .as_ref()
            .map_or(true, |current| current.collection != document.collection);
        if switching {
            self.history.clear();
        }
        self.active = Some(document);
    }

    async fn drop_collection(&self, collection: &str) {
        if let Err(e) = self.vector_db.delete_collection(collection).await {
            log::warn!("Failed to drop collection {}: {}", collection, e);
        }
    }
}
