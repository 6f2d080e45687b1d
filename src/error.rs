//! Error types for the audit report.

use thiserror::Error;

/// The main error type for audit operations.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("GitHub API error: {message}")]
    GitHub { message: String },

    #[error("Unexpected payload from {url}: {message}")]
    UnexpectedPayload { url: String, message: String },

    #[error("GraphQL error: {message}")]
    GraphQl { message: String },

    #[error(
        "Alert count mismatch for {repo}: {distinct} distinct alert ids but {counted} counted"
    )]
    AlertCountMismatch {
        repo: String,
        distinct: usize,
        counted: u64,
    },
}

/// A specialized Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
