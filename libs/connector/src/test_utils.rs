use crate::descriptor::SocketKind;
use crate::error::{ConnectorError, Result};
use crate::factory::SocketFactory;
use crate::transport::SocketEndpoint;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct SocketLogInner {
    frames: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
    stall_sends: AtomicBool,
}

/// Shared view of what a [`RecordingSocket`] saw
#[derive(Debug, Clone, Default)]
pub struct SocketLog {
    inner: Arc<SocketLogInner>,
}

impl SocketLog {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.inner.frames.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.frames.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Make every following send fail until switched off
    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every following send hang, like a peer that stopped reading
    pub fn stall_sends(&self, stall: bool) {
        self.inner.stall_sends.store(stall, Ordering::SeqCst);
    }
}

/// In-memory socket that records frames instead of writing them
#[derive(Debug)]
pub struct RecordingSocket {
    address: String,
    log: SocketLog,
}

impl RecordingSocket {
    pub fn new(address: impl Into<String>, log: SocketLog) -> Self {
        Self {
            address: address.into(),
            log,
        }
    }
}

#[async_trait]
impl SocketEndpoint for RecordingSocket {
    fn endpoint(&self) -> &str {
        &self.address
    }

    async fn send(&mut self, frame: Bytes) -> Result<()> {
        if self.log.is_closed() {
            return Err(ConnectorError::WorkerClosed(self.address.clone()));
        }
        if self.log.inner.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.log.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectorError::send_failed(&self.address, "simulated failure"));
        }
        self.log.inner.frames.lock().push(frame.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One socket built by a [`RecordingSocketFactory`]
#[derive(Debug, Clone)]
pub struct CreatedSocket {
    pub address: String,
    pub kind: SocketKind,
    pub log: SocketLog,
}

/// Socket factory that records every construction and hands out recording sockets
#[derive(Debug, Clone, Default)]
pub struct RecordingSocketFactory {
    created: Arc<Mutex<Vec<CreatedSocket>>>,
    failing: Arc<AtomicBool>,
    create_delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingSocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create` fail until switched off
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `create` take `delay` before returning
    pub fn set_create_delay(&self, delay: Option<Duration>) {
        *self.create_delay.lock() = delay;
    }

    pub fn created(&self) -> Vec<CreatedSocket> {
        self.created.lock().clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.created
            .lock()
            .iter()
            .map(|socket| socket.address.clone())
            .collect()
    }

    pub fn last(&self) -> Option<CreatedSocket> {
        self.created.lock().last().cloned()
    }

    /// Sockets constructed and not yet closed
    pub fn open_sockets(&self) -> usize {
        self.created
            .lock()
            .iter()
            .filter(|socket| !socket.log.is_closed())
            .count()
    }
}

#[async_trait]
impl SocketFactory for RecordingSocketFactory {
    async fn create(&self, address: &str, kind: SocketKind) -> Result<Box<dyn SocketEndpoint>> {
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection_failed(format!(
                "simulated failure for {}",
                address
            )));
        }

        let log = SocketLog::default();
        self.created.lock().push(CreatedSocket {
            address: address.to_string(),
            kind,
            log: log.clone(),
        });
        Ok(Box::new(RecordingSocket::new(address, log)))
    }
}
