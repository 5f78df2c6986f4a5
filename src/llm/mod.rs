pub mod chat;
pub mod embeddings;
pub mod generator;
pub mod semantic_search;

pub use chat::{ChatHistory, ChatMessage, Role};
pub use embeddings::{EmbeddingError, EmbeddingGenerator};
pub use generator::{Answer, AnswerGenerator};
pub use semantic_search::{Retrieval, RetrievalError, SearchResult, SemanticSearch};
