use thiserror::Error;

/// Errors from the settings collaborator.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}
