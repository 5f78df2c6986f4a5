use async_trait::async_trait;
use crate::config::ProviderConfig;
use crate::providers::traits::{CompletionProvider, EmbedTask, EmbeddingProvider, ProviderError};
use crate::providers::utils::{extract_api_error, extract_candidate_text, parse_embedding_values};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Gemini caps batchEmbedContents at 100 requests.
const MAX_BATCH: usize = 100;

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: Option<String>,
    api_url: String,
    client: Client,
    model: String,
    embedding_model: String,
    temperature: f32,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            client,
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_url, model, method)
    }

    fn embedding_model_path(&self) -> String {
        format!("models/{}", self.embedding_model)
    }

    async fn post(&self, url: &str, body: Value) -> Result<Value, ProviderError> {
        let api_key = self.api_key()?;

        let response = self.client
            .post(url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: extract_api_error(&body),
            });
        }

        Ok(response.json().await?)
    }

    fn embed_request(&self, text: &str, task: EmbedTask) -> Value {
        json!({
            "model": self.embedding_model_path(),
            "content": { "parts": [{ "text": text }] },
            "taskType": task.as_api_str(),
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = self.endpoint(&self.model, "generateContent");
        let response_json = self.post(&url, json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": { "temperature": self.temperature }
        }))
        .await?;

        extract_candidate_text(&response_json)
            .ok_or_else(|| ProviderError::InvalidResponse("no candidate text in response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, ProviderError> {
        let url = self.endpoint(&self.embedding_model, "embedContent");
        let response_json = self.post(&url, self.embed_request(text, task)).await?;
        parse_embedding_values(&response_json["embedding"])
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        task: EmbedTask,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = self.endpoint(&self.embedding_model, "batchEmbedContents");
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let requests: Vec<Value> = batch
                .iter()
                .map(|text| self.embed_request(text, task))
                .collect();

            let response_json = self.post(&url, json!({ "requests": requests })).await?;
            let returned = response_json["embeddings"]
                .as_array()
                .ok_or_else(|| ProviderError::InvalidResponse("missing embeddings array".to_string()))?;

            if returned.len() != batch.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    returned.len()
                )));
            }

            for embedding in returned {
                embeddings.push(parse_embedding_values(embedding)?);
            }
        }

        Ok(embeddings)
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}
