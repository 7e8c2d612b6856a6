use crate::descriptor::{ClusterId, ConnectorId};

/// Errors raised by the connector, its socket endpoints and its collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectorError {
    #[error("Connector {connector_id} not found in cluster {cluster_id}")]
    DescriptorNotFound {
        cluster_id: ClusterId,
        connector_id: ConnectorId,
    },

    #[error("Descriptor store error: {0}")]
    Store(String),

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed on {endpoint}: {error}")]
    SendFailed { endpoint: String, error: String },

    #[error("Sender worker for '{0}' is closed")]
    WorkerClosed(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Malformed control message: {0}")]
    MalformedMessage(String),

    #[error("Control transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ConnectorError {
    /// Failures that leave the connector running with an empty worker slot
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed(_)
                | ConnectorError::InvalidAddress { .. }
                | ConnectorError::Timeout(_)
                | ConnectorError::SendFailed { .. }
                | ConnectorError::WorkerClosed(_)
                | ConnectorError::Io(_)
        )
    }

    /// Failures that must stop the process before it reaches an active state
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            ConnectorError::DescriptorNotFound { .. } | ConnectorError::Store(_)
        )
    }

    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        ConnectorError::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed(msg.into())
    }

    pub fn send_failed(endpoint: impl Into<String>, error: impl Into<String>) -> Self {
        ConnectorError::SendFailed {
            endpoint: endpoint.into(),
            error: error.into(),
        }
    }

    pub fn timeout(millis: u64) -> Self {
        ConnectorError::Timeout(millis)
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::MalformedMessage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
