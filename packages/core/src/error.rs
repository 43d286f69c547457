//! Error taxonomy shared by every storage operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// A required parameter was missing or invalid. Caller bug, never retried.
    #[error("invalid argument `{name}`: {message}")]
    Argument {
        name: &'static str,
        message: &'static str,
    },

    /// A blocking operation observed its cancellation token.
    #[error("operation was canceled")]
    Canceled,

    /// The document store failed or could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub fn argument(name: &'static str, message: &'static str) -> Self {
        Self::Argument { name, message }
    }

    /// Name of the offending parameter for argument errors.
    pub fn argument_name(&self) -> Option<&'static str> {
        match self {
            Self::Argument { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
