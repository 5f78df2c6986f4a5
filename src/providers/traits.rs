use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("GEMINI_API_KEY is not set. Add it to your environment or .env file")]
    MissingApiKey,
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Which side of retrieval a text is embedded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    RetrievalDocument,
    RetrievalQuery,
}

impl EmbedTask {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            EmbedTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            EmbedTask::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, ProviderError>;

    /// Providers without a batch endpoint embed one text at a time.
    async fn embed_batch(
        &self,
        texts: &[String],
        task: EmbedTask,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text, task).await?);
        }
        Ok(embeddings)
    }

    fn embedding_model(&self) -> &str;
}
