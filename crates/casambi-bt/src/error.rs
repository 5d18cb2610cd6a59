//! Error types for the integration

use casambi_core::NetworkError;
use thiserror::Error;

/// Errors that can occur in the integration layer
#[derive(Error, Debug)]
pub enum IntegrationError {
    /// Network error from casambi-core
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config entry not found: {0}")]
    EntryNotFound(String),

    /// Setting up an entry failed
    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Outcome of a failed entry setup, telling the host what to do next
#[derive(Error, Debug)]
pub enum SetupError {
    /// Temporary failure; the host retries setup later
    #[error("Setup not ready: {0}")]
    NotReady(#[source] NetworkError),

    /// The password was rejected; the host starts re-authentication
    #[error("Authentication failed: {0}")]
    AuthFailed(#[source] NetworkError),

    /// Permanent failure; no entities are created
    #[error("Setup failed: {0}")]
    Failed(#[source] NetworkError),
}

impl From<NetworkError> for SetupError {
    fn from(err: NetworkError) -> Self {
        if err.is_retryable() {
            SetupError::NotReady(err)
        } else if err.is_auth_failure() {
            SetupError::AuthFailed(err)
        } else {
            SetupError::Failed(err)
        }
    }
}
