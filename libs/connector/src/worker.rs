//! Sender worker - owns one outbound socket on a dedicated background task
//!
//! The socket never leaves the worker task. Payloads reach it through a
//! bounded channel, so a slow peer pushes back on whoever calls `send`.
//! Delivery failures are counted and logged inside the task; they never
//! travel back to the caller.

use crate::error::{ConnectorError, Result};
use crate::transport::SocketEndpoint;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Tuning for sender workers
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on building the socket a worker owns
    pub connect_timeout: Duration,

    /// Payloads that may wait for the socket before `send` blocks
    pub queue_depth: usize,

    /// How long `close` waits for queued payloads to drain
    pub close_timeout: Duration,

    /// Emit a trace event for every successful send
    pub trace_sends: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            queue_depth: 1024,
            close_timeout: Duration::from_secs(2),
            trace_sends: false,
        }
    }
}

#[derive(Debug)]
enum WorkerCommand {
    Send(Bytes),
    Close(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct WorkerStats {
    frames_sent: AtomicU64,
    frames_failed: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Point-in-time copy of a worker's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub frames_sent: u64,
    pub frames_failed: u64,
    pub bytes_sent: u64,
}

/// Cheap handle for queueing payloads on a worker
#[derive(Debug, Clone)]
pub struct SenderHandle {
    name: String,
    commands: mpsc::Sender<WorkerCommand>,
}

impl SenderHandle {
    /// Queue a payload; fails fast once the worker is closed
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.commands
            .send(WorkerCommand::Send(payload))
            .await
            .map_err(|_| ConnectorError::WorkerClosed(self.name.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// The only owner of a live outbound socket
#[derive(Debug)]
pub struct SenderWorker {
    name: String,
    endpoint: String,
    commands: mpsc::Sender<WorkerCommand>,
    task: JoinHandle<()>,
    stats: Arc<WorkerStats>,
    close_timeout: Duration,
}

impl SenderWorker {
    /// Take ownership of the socket and start the send loop
    pub fn start(
        name: impl Into<String>,
        socket: Box<dyn SocketEndpoint>,
        config: &WorkerConfig,
    ) -> Self {
        let name = name.into();
        let endpoint = socket.endpoint().to_string();
        let (commands, receiver) = mpsc::channel(config.queue_depth.max(1));
        let stats = Arc::new(WorkerStats::default());

        let task = tokio::spawn(run_send_loop(
            name.clone(),
            socket,
            receiver,
            stats.clone(),
            config.trace_sends,
        ));

        debug!("Sender worker '{}' started for {}", name, endpoint);

        Self {
            name,
            endpoint,
            commands,
            task,
            stats,
            close_timeout: config.close_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn handle(&self) -> SenderHandle {
        SenderHandle {
            name: self.name.clone(),
            commands: self.commands.clone(),
        }
    }

    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.handle().send(payload).await
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            frames_failed: self.stats.frames_failed.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Drain queued payloads, release the socket and stop the task
    pub async fn close(self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let SenderWorker {
            name,
            endpoint,
            commands,
            mut task,
            close_timeout,
            ..
        } = self;

        // Queueing the close can itself wait behind a stuck send, so the bound covers both steps
        let handshake = async {
            if commands.send(WorkerCommand::Close(ack_tx)).await.is_err() {
                debug!("Sender worker '{}' already stopped", name);
                return;
            }
            let _ = ack_rx.await;
        };

        if tokio::time::timeout(close_timeout, handshake).await.is_err() {
            warn!(
                "Sender worker '{}' did not drain within {:?}, aborting",
                name, close_timeout
            );
            task.abort();
        }
        drop(commands);

        if let Err(e) = (&mut task).await {
            if !e.is_cancelled() {
                warn!("Sender worker '{}' task failed: {}", name, e);
            }
        }

        debug!("Sender worker '{}' for {} closed", name, endpoint);
        Ok(())
    }
}

async fn run_send_loop(
    name: String,
    mut socket: Box<dyn SocketEndpoint>,
    mut commands: mpsc::Receiver<WorkerCommand>,
    stats: Arc<WorkerStats>,
    trace_sends: bool,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Send(payload) => {
                let size = payload.len();
                match socket.send(payload).await {
                    Ok(()) => {
                        stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                        stats.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
                        if trace_sends {
                            trace!(
                                "Sent {} bytes name {} endpoint {}",
                                size,
                                name,
                                socket.endpoint()
                            );
                        }
                    }
                    Err(e) => {
                        stats.frames_failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Sender worker '{}' failed to send: {}", name, e);
                    }
                }
            }
            WorkerCommand::Close(ack) => {
                commands.close();
                if let Err(e) = socket.close().await {
                    warn!("Sender worker '{}' failed to close socket: {}", name, e);
                }
                let _ = ack.send(());
                return;
            }
        }
    }

    // Every handle is gone without an explicit close
    if let Err(e) = socket.close().await {
        warn!("Sender worker '{}' failed to close socket: {}", name, e);
    }
}
