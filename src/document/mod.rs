pub mod chunker;
pub mod extractor;
pub mod processor;
pub mod rag;
pub mod uploads;

pub use chunker::TextChunker;
pub use extractor::{ExtractionError, PageText};
pub use processor::{DocumentProcessor, ProcessedDocument};
pub use rag::{ClearReport, IndexReport, IndexedDocument, RagError, RagSystem};
pub use uploads::UploadDir;
