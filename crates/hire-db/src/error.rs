use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("no matching row".into()),
            rusqlite::Error::FromSqlConversionFailure(..) => Self::Corrupt(err.to_string()),
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::ConstraintViolation => Self::Conflict(err.to_string()),
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen => {
                    Self::Unavailable(err.to_string())
                }
                _ => Self::Sqlite(err),
            },
            _ => Self::Sqlite(err),
        }
    }
}

impl StoreError {
    /// Attach the id of the missing entity to a generic not-found.
    pub fn context(self, what: &str, id: &str) -> Self {
        match self {
            Self::NotFound(_) => Self::NotFound(format!("{} {}", what, id)),
            other => other,
        }
    }
}
