use thiserror::Error;
use uuid::Uuid;

/// Application-wide error types for spiders.
#[derive(Error, Debug)]
pub enum AppError {
    /// Point lookup found no row.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A task references a source that does not exist.
    #[error("Source not found: {0}")]
    SourceNotFound(Uuid),

    /// HTTP request failed (building the client, sending, or reading the body).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The server answered with a non-2xx status.
    #[error("request error: status[{status}] url[{url}]")]
    HttpStatus { status: u16, url: String },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error (dial, proxy handshake).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A JSON rule had no input: empty body and no chained value.
    #[error("content is empty")]
    EmptyContent,

    /// A single extraction rule failed. Recovered inside the engine.
    #[error("Extraction failed for field '{field}': {message}")]
    ExtractionError { field: String, message: String },

    /// A URL could not be parsed or rebuilt.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Job queue operation failed.
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Publishing a completion event failed.
    #[error("Publish error: {0}")]
    PublishError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if the fetch never produced an HTTP response.
    ///
    /// These are the failures that mark a task as failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_) | AppError::Timeout(_) | AppError::NetworkError(_)
        )
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}
