use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication rejected: {0}")]
    Unauthorized(String),

    #[error("Request failed with status {status}: {reason}")]
    RequestError { status: u16, reason: String },

    #[error("Malformed response: {0}")]
    DecodeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BackendError {
    /// Unreachable or unauthenticated backends are fatal to the attempted operation.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            BackendError::ConnectionError(_) | BackendError::Unauthorized(_)
        )
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
