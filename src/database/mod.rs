pub mod similarity;
pub mod vector_db;

pub use vector_db::{ChunkRecord, ScoredChunk, VectorDB, VectorDBError};
