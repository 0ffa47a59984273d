use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown embedding provider '{value}' (expected one of: remote, local)")]
    UnknownProvider { value: String },

    #[error("missing required setting {key} for {context}")]
    MissingKey { key: &'static str, context: String },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid chunking config: chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    InvalidChunking { size: usize, overlap: usize },

    #[error(
        "persisted index was built with '{stored}' but the configured embedding model is '{configured}'; \
         clear the storage directory or set REBUILD_ON_MODEL_MISMATCH=true"
    )]
    ModelMismatch { stored: String, configured: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input path does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("no readable documents found in {}", path.display())]
    NoDocuments { path: PathBuf },

    #[error("io error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pdf parse error in {}: {details}", path.display())]
    PdfParse { path: PathBuf, details: String },

    #[error("unsupported file type: {}", path.display())]
    Unsupported { path: PathBuf },

    #[error("path has no file name: {}", path.display())]
    MissingFileName { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error calling {provider} embeddings: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid response from {provider} embeddings: {details}")]
    BackendResponse {
        provider: &'static str,
        details: String,
    },

    #[error("unreadable response body from {provider} embeddings: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} returned {returned} vectors for {requested} inputs")]
    CountMismatch {
        provider: &'static str,
        requested: usize,
        returned: usize,
    },

    #[error("{provider} returned vectors of mixed dimensions ({expected} and {found})")]
    DimensionMismatch {
        provider: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Failures building, persisting or reloading a vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable index data in {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("persisted index at {} has no embedding model identity", path.display())]
    MissingModelIdentity { path: PathBuf },

    #[error("persisted index model '{stored}' does not match expected '{expected}'")]
    ModelMismatch { stored: String, expected: String },

    #[error("unsupported index format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("{} exists but holds no persisted index (no manifest.json); remove it or point STORAGE_DIR elsewhere", path.display())]
    NotAnIndex { path: PathBuf },

    #[error("storage location {} overlaps the documents folder {}", storage.display(), documents.display())]
    StorageOverlapsDocuments { storage: PathBuf, documents: PathBuf },

    #[error("corrupt index: {0}")]
    Inconsistent(String),

    #[error("vector dimension {found} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("http error calling the language model: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model returned {status}: {details}")]
    BackendResponse { status: u16, details: String },

    #[error("language model returned no answer text")]
    EmptyAnswer,

    #[error("no answer synthesizer is configured")]
    NotConfigured,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuery,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Errors surfaced by the index builder. Build failures are always fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("invalid cleaning pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
