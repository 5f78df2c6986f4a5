pub mod gemini;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub mod mock;

pub use gemini::GeminiProvider;
pub use traits::{CompletionProvider, EmbedTask, EmbeddingProvider, ProviderError};
