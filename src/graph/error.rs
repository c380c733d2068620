use thiserror::Error;

use crate::external::BackendError;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("{operation} `{target}`: backend unreachable: {source}")]
    Connectivity {
        operation: &'static str,
        target: String,
        #[source]
        source: BackendError,
    },

    #[error("{operation} `{target}`: {message}")]
    Validation {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("{operation} `{target}`: backend error: {source}")]
    Backend {
        operation: &'static str,
        target: String,
        #[source]
        source: BackendError,
    },

    #[error("{operation} `{target}`: stored document is malformed: {message}")]
    Corrupt {
        operation: &'static str,
        target: String,
        message: String,
    },
}

impl GraphError {
    /// Wrap a backend failure, keeping connectivity problems distinguishable
    pub fn backend(operation: &'static str, target: impl Into<String>, source: BackendError) -> Self {
        let target = target.into();
        if source.is_connectivity() {
            GraphError::Connectivity {
                operation,
                target,
                source,
            }
        } else {
            GraphError::Backend {
                operation,
                target,
                source,
            }
        }
    }

    pub fn validation(
        operation: &'static str,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GraphError::Validation {
            operation,
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn corrupt(
        operation: &'static str,
        target: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        GraphError::Corrupt {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, GraphError::Connectivity { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GraphError::Validation { .. })
    }

    pub fn operation(&self) -> &'static str {
        match self {
            GraphError::Connectivity { operation, .. }
            | GraphError::Validation { operation, .. }
            | GraphError::Backend { operation, .. }
            | GraphError::Corrupt { operation, .. } => *operation,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            GraphError::Connectivity { target, .. }
            | GraphError::Validation { target, .. }
            | GraphError::Backend { target, .. }
            | GraphError::Corrupt { target, .. } => target.as_str(),
        }
    }
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
