use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("invalid rule definition: {0}")]
    InvalidRule(String),

    #[error("action dispatch failed: {0}")]
    ActionFailed(String),

    #[error(transparent)]
    Persistence(#[from] butler_persistence::PersistenceError),

    #[error(transparent)]
    Registry(#[from] butler_registry::RegistryError),
}

pub type Result<T> = std::result::Result<T, AutomationError>;

impl From<AutomationError> for butler_core::ButlerError {
    fn from(e: AutomationError) -> Self {
        match e {
            AutomationError::InvalidRule(m) => butler_core::ButlerError::Validation(m),
            AutomationError::ActionFailed(m) => butler_core::ButlerError::Transient(m),
            AutomationError::Persistence(e) => e.into(),
            AutomationError::Registry(e) => e.into(),
        }
    }
}
