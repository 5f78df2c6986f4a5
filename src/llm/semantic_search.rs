use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::database::vector_db::{ScoredChunk, VectorDB, VectorDBError};
use crate::llm::embeddings::{EmbeddingError, EmbeddingGenerator};
use crate::providers::traits::CompletionProvider;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("Vector store error: {0}")]
    Store(#[from] VectorDBError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub score: f32,
    pub chunk_index: usize,
    pub source: String,
}

impl From<ScoredChunk> for SearchResult {
    fn from(chunk: ScoredChunk) -> Self {
        Self {
            text: chunk.text,
            score: chunk.score,
            chunk_index: chunk.seq,
            source: chunk.source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub results: Vec<SearchResult>,
    /// The hypothetical answer that was embedded instead of the question.
    pub hypothetical: Option<String>,
}

pub fn hyde_prompt(question: &str) -> String {
    format!(
        "Generate a comprehensive hypothetical answer that might exist in the document for:\n\
         Question: {}\n\
         Include key terms and concepts the document would contain:",
        question
    )
}

pub struct SemanticSearch {
    vector_db: VectorDB,
    embeddings: EmbeddingGenerator,
    provider: Arc<dyn CompletionProvider>,
    top_k: usize,
    hyde_enabled: bool,
}

impl SemanticSearch {
    pub fn new(
        vector_db: VectorDB,
        embeddings: EmbeddingGenerator,
        provider: Arc<dyn CompletionProvider>,
        top_k: usize,
        hyde_enabled: bool,
    ) -> Self {
        Self {
            vector_db,
            embeddings,
            provider,
            top_k,
            hyde_enabled,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Asks the model for a hypothetical passage answering the question.
    /// Failures fall back to the raw question.
    pub async fn expand_query(&self, question: &str) -> Option<String> {
        match self.provider.complete(&hyde_prompt(question)).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                log::warn!("HyDE expansion came back empty, searching with the question");
                None
            }
            Err(e) => {
                log::warn!("HyDE expansion failed, searching with the question: {}", e);
                None
            }
        }
    }

    pub async fn search(&self, collection: &str, question: &str) -> Result<Retrieval, RetrievalError> {
        let hypothetical = if self.hyde_enabled {
            self.expand_query(question).await
        } else {
            None
        };

        let query_text = hypothetical.as_deref().unwrap_or(question);
        let query_embedding = self.embeddings.embed_query(query_text).await?;

        let results: Vec<SearchResult> = self.vector_db
            .search_vectors(collection, &query_embedding, self.top_k)
            .await?
            .into_iter()
            .map(SearchResult::from)
            .collect();

        log::debug!(
            "Retrieved {} chunks from {} (hyde: {})",
            results.len(),
            collection,
            hypothetical.is_some()
        );

        Ok(Retrieval { results, hypothetical })
    }
}
