pub mod api;
pub mod config;
pub mod database;
pub mod document;
pub mod llm;
pub mod providers;

// Re-export commonly used items
pub use config::{AppConfig, ProviderConfig};
pub use database::VectorDB;
pub use document::RagSystem;
pub use providers::GeminiProvider;
