use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl From<PersistenceError> for butler_core::ButlerError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound(m) => butler_core::ButlerError::NotFound(m),
            PersistenceError::Conflict(m) => butler_core::ButlerError::Conflict(m),
            PersistenceError::Database(e) => butler_core::ButlerError::Database(e),
            PersistenceError::Serialization(e) => butler_core::ButlerError::Serialization(e),
        }
    }
}
