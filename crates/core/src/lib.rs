pub mod chunking;
pub mod cleaning;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod events;
pub mod extractor;
pub mod index;
pub mod inspect;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod synthesis;

pub use chunking::{chunk_documents, expected_chunk_count, BoundaryPolicy, ChunkingConfig};
pub use cleaning::{
    document_stats, reduction_percent, DocumentStats, NormalizerOptions, TextNormalizer,
};
pub use config::{
    CorpusSettings, EmbeddingSettings, LlmSettings, Settings, DEFAULT_DOCUMENTS_DIR,
};
pub use embeddings::{
    Embedder, EmbeddingProvider, LocalEmbedder, LocalEmbeddingConfig, RemoteEmbedder,
    RemoteEmbeddingConfig,
};
pub use error::{
    ConfigError, EmbeddingError, IndexError, LoadError, PipelineError, QueryError, SynthesisError,
};
pub use events::{BuildEvent, BuildObserver, EventLog, TracingObserver};
pub use extractor::{ExtractedPdf, LopdfExtractor, PageText, PdfExtractor};
pub use index::{IndexManifest, VectorIndex};
pub use inspect::{inspect_corpus, CorpusInspection, DocumentPreview, Problem, Recommendation};
pub use loader::{load_documents, LoadOptions, LoadReport, SkippedFile};
pub use models::{
    Chunk, Citation, Document, DocumentMetadata, FileType, IndexEntry, RetrievalResult,
    ScoredChunk, DEFAULT_EXCERPT_CHARS,
};
pub use orchestrator::{BuildOptions, IndexBuilder, IndexOrigin, IndexState, ReadyIndex};
pub use retriever::{Answer, QueryEngine, ResponseMode};
pub use synthesis::{AnswerSynthesizer, ChatCompletionSynthesizer, LlmConfig};
