use hire_db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal store error: {0}")]
    Internal(#[source] StoreError),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(what) => Self::Conflict(what),
            StoreError::Unavailable(what) => Self::Unavailable(what),
            other => Self::Internal(other),
        }
    }
}
