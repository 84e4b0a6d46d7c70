use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParcelError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("hash mismatch: expected {expected}, actual {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ParcelError {
    /// Whether the error should surface to clients as an internal failure
    /// rather than a caller mistake.
    pub fn is_internal(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::InvalidRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, ParcelError>;
