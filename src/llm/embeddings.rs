use std::sync::Arc;
use thiserror::Error;

use crate::providers::traits::{EmbedTask, EmbeddingProvider, ProviderError};

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Embedding service returned {received} vectors for {expected} chunks")]
    CountMismatch { expected: usize, received: usize },
    #[error("Embedding dimensions differ: expected {expected}, got {found}")]
    InconsistentDimension { expected: usize, found: usize },
    #[error("Embedding service returned an empty vector")]
    EmptyVector,
}

/// Wraps an embedding provider and checks that every chunk gets exactly one
/// vector of a single dimension.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn model(&self) -> &str {
        self.provider.embedding_model()
    }

    pub async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.provider
            .embed_batch(chunks, EmbedTask::RetrievalDocument)
            .await?;

        if embeddings.len() != chunks.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: chunks.len(),
                received: embeddings.len(),
            });
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(EmbeddingError::EmptyVector);
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(EmbeddingError::InconsistentDimension {
                expected: dimension,
                found: bad.len(),
            });
        }

        log::info!("Generated {} embeddings ({} dims)", embeddings.len(), dimension);
        Ok(embeddings)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embedding = self.provider.embed(text, EmbedTask::RetrievalQuery).await?;
        if embedding.is_empty() {
            return Err(EmbeddingError::EmptyVector);
        }
        Ok(embedding)
    }
}
