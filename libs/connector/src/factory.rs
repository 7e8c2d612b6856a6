//! Socket factory - builds a ready-to-use endpoint for an address and socket kind

use crate::descriptor::SocketKind;
use crate::error::{ConnectorError, Result};
use crate::transport::{PubSocket, PushSocket, SocketEndpoint, DEFAULT_SEND_TIMEOUT};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

#[async_trait]
pub trait SocketFactory: Send + Sync + Debug {
    /// Construct an endpoint; may block on connection setup
    async fn create(&self, address: &str, kind: SocketKind) -> Result<Box<dyn SocketEndpoint>>;
}

/// Builds real TCP and Unix socket endpoints
#[derive(Debug, Clone)]
pub struct TransportSocketFactory {
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl TransportSocketFactory {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound on writing one frame to a push peer
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

impl Default for TransportSocketFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocketFactory for TransportSocketFactory {
    async fn create(&self, address: &str, kind: SocketKind) -> Result<Box<dyn SocketEndpoint>> {
        let timeout_ms = self.connect_timeout.as_millis() as u64;

        let endpoint: Box<dyn SocketEndpoint> = match kind {
            SocketKind::Push => Box::new(
                tokio::time::timeout(self.connect_timeout, PushSocket::connect(address))
                    .await
                    .map_err(|_| ConnectorError::timeout(timeout_ms))??
                    .with_send_timeout(self.send_timeout),
            ),
            SocketKind::Pub => Box::new(
                tokio::time::timeout(self.connect_timeout, PubSocket::bind(address))
                    .await
                    .map_err(|_| ConnectorError::timeout(timeout_ms))??,
            ),
        };

        tracing::debug!("Created {} socket for {}", kind, address);
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_creates_push_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("tcp://{}", listener.local_addr().unwrap());

        let factory = TransportSocketFactory::new();
        let endpoint = factory.create(&address, SocketKind::Push).await.unwrap();
        assert_eq!(endpoint.endpoint(), address);
    }

    #[test]
    fn test_timeouts() {
        let factory = TransportSocketFactory::new();
        assert_eq!(factory.connect_timeout(), Duration::from_secs(5));
        assert_eq!(factory.send_timeout(), DEFAULT_SEND_TIMEOUT);

        let factory = factory
            .with_timeout(Duration::from_millis(250))
            .with_send_timeout(Duration::from_millis(750));
        assert_eq!(factory.connect_timeout(), Duration::from_millis(250));
        assert_eq!(factory.send_timeout(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_rejects_invalid_address() {
        let factory = TransportSocketFactory::new().with_timeout(Duration::from_millis(200));
        let err = factory
            .create("http://example.com", SocketKind::Push)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidAddress { .. }));
    }
}
