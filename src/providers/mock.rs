//! In-process stand-in for Gemini used by the pipeline tests.
//!
//! Embeddings are hashed bag-of-words vectors, so identical texts map to
//! identical vectors and texts sharing words land close together.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::providers::traits::{CompletionProvider, EmbedTask, EmbeddingProvider, ProviderError};

pub const MOCK_DIMENSION: usize = 64;

#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    embed_calls: AtomicUsize,
    fail_embeddings: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_embeddings() -> Self {
        Self {
            fail_embeddings: true,
            ..Self::default()
        }
    }

    pub fn push_response(&self, text: &str) {
        self.responses.lock().push_back(Ok(text.to_string()));
    }

    pub fn push_error(&self, message: &str) {
        self.responses.lock().push_back(Err(message.to_string()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; MOCK_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % MOCK_DIMENSION] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.lock().push(prompt.to_string());
        match self.responses.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ProviderError::Api { status: 500, message }),
            None => Ok("Key Insight: mock answer".to_string()),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>, ProviderError> {
        if self.fail_embeddings {
            return Err(ProviderError::Api {
                status: 503,
                message: "embedding service unavailable".to_string(),
            });
        }
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector_for(text))
    }

    fn embedding_model(&self) -> &str {
        "mock-embedding"
    }
}
