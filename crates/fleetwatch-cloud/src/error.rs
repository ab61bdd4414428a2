//! Cloud API error type.

use thiserror::Error;

/// Result type alias for cloud API calls.
pub type CloudResult<T> = Result<T, CloudError>;

/// Error code reported when a node or alarm does not exist.
pub const NOT_FOUND: &str = "NotFound";

/// A typed failure reported by a cloud API, transient or permanent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CloudError {
    pub code: String,
    pub message: String,
}

impl CloudError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND, message)
    }

    /// Whether the referenced resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND
    }
}
