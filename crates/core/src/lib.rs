pub mod admin;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod prompt;
pub mod retry;
pub mod storage;
pub mod store;
pub mod stores;
pub mod traits;

pub use admin::{AdminOutcome, AdminService, NUKE_CONFIRMATION};
pub use chunking::{ChunkingConfig, RecursiveChunker, DEFAULT_SEPARATORS};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingTask, GeminiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{
    AdminError, IngestError, QueryError, SearchError, StorageError, UpstreamError,
};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use gemini::GeminiConfig;
pub use generation::{GeminiGenerator, Generator, DEFAULT_GENERATION_MODEL};
pub use ingest::{
    digest_bytes, discover_pdf_files, sanitize_filename, FolderIngestReport, IngestionPipeline,
    SkippedPdf,
};
pub use models::{
    ChatRequest, ChatResponse, ChunkMetadata, DocumentFingerprint, DocumentUpload, IngestStage,
    IngestionOptions, IngestionReport, MetadataFilter, QueryMatch, SkippedChunk, SourceSummary,
    VectorRecord, DEFAULT_CHAPTER, UNKNOWN_SOURCE,
};
pub use normalize::{clean_output, normalize_optional, normalize_text};
pub use orchestrator::{QueryOptions, QueryPipeline, NOT_FOUND_ANSWER};
pub use prompt::{Difficulty, PromptBuilder, StudyMode};
pub use retry::{call_with_retry, RetryPolicy};
pub use storage::{LocalStorage, ObjectStorage, SupabaseStorage};
pub use store::{upsert_in_batches, BatchReport};
pub use stores::{InMemoryVectorStore, PineconeStore, QdrantStore};
pub use traits::VectorIndex;
