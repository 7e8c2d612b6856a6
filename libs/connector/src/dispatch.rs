//! Control-message intake for a connector process
//!
//! [`ControlListener`] accepts any number of local producers on a Unix socket
//! and funnels their newline-delimited JSON messages into one ordered queue.
//! [`run_dispatch_loop`] drains that queue into the manager one message at a
//! time, which is what keeps per-connector processing in arrival order.

use crate::control::ControlMessage;
use crate::error::{ConnectorError, Result};
use crate::manager::{ConnectorManager, HandleOutcome};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Why the dispatch loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// The connector was deleted or closed
    Terminated,
    /// Every producer is gone and the queue is empty
    SourceClosed,
}

/// Listens for control messages on a Unix socket
#[derive(Debug)]
pub struct ControlListener {
    path: PathBuf,
    acceptor: JoinHandle<()>,
}

impl ControlListener {
    /// Bind the socket and return the queue messages are delivered on
    pub fn bind(
        path: impl AsRef<Path>,
        queue_depth: usize,
    ) -> Result<(Self, mpsc::Receiver<ControlMessage>)> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| {
            ConnectorError::Transport(format!("Cannot bind {}: {}", path.display(), e))
        })?;
        let (tx, rx) = mpsc::channel(queue_depth.max(1));

        // Readers live in the acceptor's JoinSet, so aborting the acceptor drops every sender
        let acceptor = tokio::spawn(async move {
            let mut readers = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            readers.spawn(read_control_stream(stream, tx.clone()));
                        }
                        Err(e) => warn!("Failed to accept control connection: {}", e),
                    },
                    Some(_) = readers.join_next(), if !readers.is_empty() => {}
                }
            }
        });

        info!("Control listener bound to {}", path.display());
        Ok((Self { path, acceptor }, rx))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting and drop open producer connections
    ///
    /// The queue closes once the messages already forwarded are received, so a
    /// running dispatch loop drains them and returns `SourceClosed`.
    pub fn shutdown(&self) {
        if !self.acceptor.is_finished() {
            info!("Control listener on {} shutting down", self.path.display());
        }
        self.acceptor.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn read_control_stream(stream: UnixStream, tx: mpsc::Sender<ControlMessage>) {
    let mut lines = BufReader::new(stream).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match ControlMessage::from_json(line.as_bytes()) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            debug!("Dispatch loop gone, dropping control connection");
                            return;
                        }
                    }
                    Err(e) => warn!("Skipping control message: {}", e),
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!("Control connection read failed: {}", e);
                return;
            }
        }
    }
}

/// Feed queued control messages to the manager in arrival order
pub async fn run_dispatch_loop(
    manager: &ConnectorManager,
    messages: &mut mpsc::Receiver<ControlMessage>,
) -> DispatchExit {
    while let Some(message) = messages.recv().await {
        if manager.dispatch(message).await == HandleOutcome::Terminated {
            return DispatchExit::Terminated;
        }
    }
    DispatchExit::SourceClosed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ClusterId, ConnectorDescriptor, ConnectorId, SocketKind};
    use crate::filter::StandardBaseProtocol;
    use crate::test_utils::RecordingSocketFactory;
    use crate::worker::WorkerConfig;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_loop_stops_on_delete() {
        let factory = RecordingSocketFactory::new();
        let manager = ConnectorManager::with_descriptor(
            ClusterId(1),
            ConnectorDescriptor::new(ConnectorId(1), "orders", "tcp://127.0.0.1:1", SocketKind::Push),
            Arc::new(factory.clone()),
            Arc::new(StandardBaseProtocol),
            WorkerConfig::default(),
        )
        .await;

        let (tx, mut rx) = mpsc::channel(8);
        tx.send(ControlMessage::send("orders", "a")).await.unwrap();
        tx.send(ControlMessage::send("billing", "ignored")).await.unwrap();
        tx.send(ControlMessage::delete("orders")).await.unwrap();
        tx.send(ControlMessage::send("orders", "after delete")).await.unwrap();

        assert_eq!(run_dispatch_loop(&manager, &mut rx).await, DispatchExit::Terminated);
        assert_eq!(factory.last().unwrap().log.frames(), vec![b"a".to_vec()]);
    }

    #[tokio::test]
    async fn test_loop_ends_when_source_closes() {
        let manager = ConnectorManager::with_descriptor(
            ClusterId(1),
            ConnectorDescriptor::new(ConnectorId(1), "orders", "tcp://127.0.0.1:1", SocketKind::Push)
                .with_active(false),
            Arc::new(RecordingSocketFactory::new()),
            Arc::new(StandardBaseProtocol),
            WorkerConfig::default(),
        )
        .await;

        let (tx, mut rx) = mpsc::channel(8);
        tx.send(ControlMessage::send("orders", "a")).await.unwrap();
        drop(tx);

        assert_eq!(run_dispatch_loop(&manager, &mut rx).await, DispatchExit::SourceClosed);
    }

    #[tokio::test]
    async fn test_listener_decodes_lines_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let (listener, mut rx) = ControlListener::bind(&path, 16).unwrap();

        let mut producer = UnixStream::connect(listener.path()).await.unwrap();
        producer
            .write_all(b"not json\n\n{\"action\":\"OUTGOING_ZMQ_DELETE\",\"name\":\"orders\"}\n")
            .await
            .unwrap();
        producer.shutdown().await.unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message, ControlMessage::delete("orders"));

        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue_with_producers_connected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let (listener, mut rx) = ControlListener::bind(&path, 16).unwrap();

        let manager = ConnectorManager::with_descriptor(
            ClusterId(1),
            ConnectorDescriptor::new(ConnectorId(1), "orders", "tcp://127.0.0.1:1", SocketKind::Push),
            Arc::new(RecordingSocketFactory::new()),
            Arc::new(StandardBaseProtocol),
            WorkerConfig::default(),
        )
        .await;

        // The producer stays connected across the shutdown
        let mut producer = UnixStream::connect(listener.path()).await.unwrap();
        producer
            .write_all(b"{\"action\":\"OUTGOING_ZMQ_SEND\",\"name\":\"orders\",\"body\":\"x\"}\n")
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first, ControlMessage::send("orders", "x"));

        listener.shutdown();
        assert!(!path.exists());

        let exit = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            run_dispatch_loop(&manager, &mut rx),
        )
        .await
        .unwrap();
        assert_eq!(exit, DispatchExit::SourceClosed);
        drop(producer);
    }
}
