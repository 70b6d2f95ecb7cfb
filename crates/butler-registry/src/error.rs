use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown app id: {0}")]
    UnknownApp(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Persistence(#[from] butler_persistence::PersistenceError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<RegistryError> for butler_core::ButlerError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownApp(m) => butler_core::ButlerError::NotFound(m),
            RegistryError::InvalidConfig(m) => butler_core::ButlerError::Validation(m),
            RegistryError::Upstream(m) => butler_core::ButlerError::Upstream(m),
            RegistryError::Persistence(e) => e.into(),
            RegistryError::Http(e) => butler_core::ButlerError::Upstream(e.to_string()),
        }
    }
}
