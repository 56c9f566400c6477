use thiserror::Error;

/// Failures talking to a hosted model API (embedding or generation).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} is rate limiting requests: {details}")]
    RateLimited {
        service: &'static str,
        details: String,
    },

    #[error("{service} is busy after {attempts} attempts, please try again later")]
    Busy {
        service: &'static str,
        attempts: u32,
    },

    #[error("{service} request failed with {status}: {details}")]
    Failed {
        service: &'static str,
        status: u16,
        details: String,
    },

    #[error("invalid response from {service}: {details}")]
    InvalidResponse {
        service: &'static str,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl UpstreamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, UpstreamError::Busy { .. })
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{provider} storage returned {status}: {details}")]
    Backend {
        provider: &'static str,
        status: u16,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid object key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("vector store error: {0}")]
    Index(#[from] SearchError),

    #[error("extraction task failed: {0}")]
    Task(String),
}

impl IngestError {
    pub fn is_busy(&self) -> bool {
        matches!(self, IngestError::Upstream(error) if error.is_busy())
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("vector store error: {0}")]
    Index(#[from] SearchError),
}

impl QueryError {
    pub fn is_busy(&self) -> bool {
        matches!(self, QueryError::Upstream(error) if error.is_busy())
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid admin secret")]
    Forbidden,

    #[error("{0}")]
    InvalidInput(String),

    #[error("vector store error: {0}")]
    Index(#[from] SearchError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
