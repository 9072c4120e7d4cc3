use thiserror::Error;

pub type Result<T> = std::result::Result<T, TidepoolError>;

/// Crate-wide error taxonomy. Component code maps external failures into
/// these variants; the HTTP layer turns them into the `{kind, message}`
/// envelope without leaking SQL text or provider payloads.
#[derive(Error, Debug)]
pub enum TidepoolError {
    #[error("Malformed observation row: {0}")]
    MalformedRow(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Language model error: {0}")]
    LanguageModel(String),

    #[error("Generated statement rejected: {0}")]
    UnsafeQuery(String),

    #[error("Query exceeded the {0} ms execution bound")]
    QueryTimeout(u64),

    #[error("Vector index has not been built for collection '{0}'")]
    IndexNotBuilt(String),

    #[error("Invalid query: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TidepoolError {
    /// Stable machine-readable kind for the error envelope.
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRow(_) => "malformed_row",
            Self::EmbeddingProvider(_) => "embedding_provider_error",
            Self::LanguageModel(_) => "language_model_error",
            Self::UnsafeQuery(_) => "unsafe_query",
            Self::QueryTimeout(_) => "query_timeout",
            Self::IndexNotBuilt(_) => "index_not_built",
            Self::Validation(_) => "invalid_request",
            Self::Config(_) => "configuration_error",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
            Self::Other(_) => "internal_error",
        }
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod retriever;
pub mod server;
pub mod translator;
