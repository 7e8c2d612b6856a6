//! Producer-side facade for outgoing connectors
//!
//! Producers never touch the connector's socket. They publish a send control
//! message addressed by connector name and the owning connector process puts
//! the payload on the wire.

use crate::control::{ControlMessage, SendRequest};
use crate::error::{ConnectorError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;

/// Delivers control messages to connector processes
#[async_trait]
pub trait ControlPublisher: Send + Sync + Debug {
    async fn publish(&self, message: ControlMessage) -> Result<()>;
}

/// Writes control messages as JSON lines to a connector's control socket
#[derive(Debug)]
pub struct UnixControlPublisher {
    path: PathBuf,
    stream: Mutex<Option<UnixStream>>,
}

impl UnixControlPublisher {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            stream: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ControlPublisher for UnixControlPublisher {
    async fn publish(&self, message: ControlMessage) -> Result<()> {
        let mut line = message.to_json()?;
        line.push('\n');

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            let stream = UnixStream::connect(&self.path).await.map_err(|e| {
                ConnectorError::Transport(format!(
                    "Cannot reach control socket {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            *guard = Some(stream);
        }

        let Some(stream) = guard.as_mut() else {
            return Err(ConnectorError::Transport("control stream unavailable".to_string()));
        };
        if let Err(e) = stream.write_all(line.as_bytes()).await {
            // Reconnect on the next publish
            *guard = None;
            return Err(ConnectorError::Transport(format!(
                "Control socket {} write failed: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }
}

/// Lets producers send to an outgoing connector by name
#[derive(Debug, Clone)]
pub struct SendFacade<P> {
    publisher: P,
}

impl<P: ControlPublisher> SendFacade<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    /// Publish `payload` for the connector called `out_name`; no local validation
    pub async fn send(
        &self,
        payload: impl Into<String>,
        out_name: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<()> {
        self.publisher
            .publish(ControlMessage::Send(SendRequest {
                name: out_name.into(),
                body: payload.into(),
                args,
                kwargs,
            }))
            .await
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}
