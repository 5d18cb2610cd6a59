//! Error types for network supervision

use crate::listeners::ListenerId;
use casambi_protocol::ProtocolError;
use thiserror::Error;

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The Bluetooth stack could not be used; retry later
    #[error("Failed to use bluetooth: {0}")]
    TransportUnavailable(#[source] ProtocolError),

    /// The address is currently not reachable; retry later
    #[error("Network with address {address} wasn't found")]
    NetworkNotFound { address: String },

    /// The credential was rejected; needs user action
    #[error("Failed to authenticate to network {address}")]
    AuthenticationFailed { address: String },

    #[error("Unexpected error creating network {address}: {source}")]
    Unexpected {
        address: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unit not found: {0}")]
    UnitNotFound(u16),

    #[error("Listener {id} is not registered for unit {unit_id}")]
    ListenerNotRegistered { unit_id: u16, id: ListenerId },
}

impl NetworkError {
    /// Classify a failed session connect
    #[must_use] pub fn from_connect(address: &str, err: ProtocolError) -> Self {
        match err {
            ProtocolError::Bluetooth(_) | ProtocolError::Timeout => {
                NetworkError::TransportUnavailable(err)
            }
            ProtocolError::NetworkNotFound => NetworkError::NetworkNotFound {
                address: address.to_string(),
            },
            ProtocolError::Authentication => NetworkError::AuthenticationFailed {
                address: address.to_string(),
            },
            other => NetworkError::Unexpected {
                address: address.to_string(),
                source: other,
            },
        }
    }

    /// Whether the host should retry setup later on its own
    #[must_use] pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetworkError::TransportUnavailable(_) | NetworkError::NetworkNotFound { .. }
        )
    }

    #[must_use] pub fn is_auth_failure(&self) -> bool {
        matches!(self, NetworkError::AuthenticationFailed { .. })
    }
}
