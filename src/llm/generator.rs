use serde::Serialize;
use std::sync::Arc;

use crate::llm::semantic_search::{Retrieval, SearchResult};
use crate::providers::traits::{CompletionProvider, ProviderError};

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const NO_CONTEXT_ANSWER: &str =
    "I don't know. Nothing in the document matched this question.";

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SearchResult>,
    pub hypothetical: Option<String>,
}

pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Answer this question based ONLY on the following context:\n\
         Question: {question}\n\
         Context: {context}\n\
         \n\
         Instructions:\n\
         - Provide a concise and direct answer first.\n\
         - Follow the direct answer with a detailed explanation using relevant information from the context.\n\
         - Mention supporting facts or key concepts to justify the response.\n\
         - Say \"I don't know\" if the context does not provide enough information.\n\
         - Never hallucinate information.\n\
         \n\
         Format:\n\
         - Key Insight: [Concise Answer]\n\
         - Additional Insights: [Detailed Explanation]\n",
        question = question,
        context = context,
    )
}

pub struct AnswerGenerator {
    provider: Arc<dyn CompletionProvider>,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    pub fn model(&self) -> &str {
        self.provider.model_name()
    }

    pub async fn generate(&self, question: &str, retrieval: Retrieval) -> Result<Answer, ProviderError> {
        if retrieval.results.is_empty() {
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                hypothetical: retrieval.hypothetical,
            });
        }

        let context = build_context(&retrieval.results);
        let text = self.provider.complete(&answer_prompt(question, &context)).await?;

        Ok(Answer {
            text,
            sources: retrieval.results,
            hypothetical: retrieval.hypothetical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    fn result(index: usize, text: &str) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            score: 0.9,
            chunk_index: index,
            source: "doc.pdf".to_string(),
        }
    }

    #[test]
    fn test_context_joins_chunks_in_order() {
        let context = build_context(&[result(4, "first"), result(1, "second")]);
        assert_eq!(context, "first\n\n---\n\nsecond");
    }

    #[tokio::test]
    async fn test_prompt_carries_only_retrieved_context() {
        let provider = Arc::new(MockProvider::new());
        provider.push_response("Key Insight: 1648");
        let generator = AnswerGenerator::new(provider.clone());

        let retrieval = Retrieval {
            results: vec![result(3, "The Treaty of Westphalia was signed in 1648")],
            hypothetical: None,
        };
        let answer = generator.generate("When was the treaty signed?", retrieval).await.unwrap();

        assert_eq!(answer.text, "Key Insight: 1648");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].chunk_index, 3);

        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("based ONLY on the following context"));
        assert!(prompt.contains("Context: The Treaty of Westphalia was signed in 1648"));
        assert!(prompt.contains("Question: When was the treaty signed?"));
        assert!(prompt.contains("I don't know"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_skips_the_model() {
        let provider = Arc::new(MockProvider::new());
        let generator = AnswerGenerator::new(provider.clone());

        let answer = generator
            .generate("Anything?", Retrieval { results: vec![], hypothetical: None })
            .await
            .unwrap();
        assert_eq!(answer.text, NO_CONTEXT_ANSWER);
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_model_error_is_returned() {
        let provider = Arc::new(MockProvider::new());
        provider.push_error("model overloaded");
        let generator = AnswerGenerator::new(provider);

        let retrieval = Retrieval { results: vec![result(0, "text")], hypothetical: None };
        let result = generator.generate("q", retrieval).await;
        assert!(matches!(result, Err(ProviderError::Api { .. })));
    }
}
