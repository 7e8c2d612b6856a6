//! Connector lifecycle manager
//!
//! Owns the descriptor of one outgoing destination together with its sender
//! worker and serializes every control message through a single async mutex.
//!
//! ```text
//! start ──lookup ok──► Active(no-worker) ◄──recreate: inactive / failed──┐
//!                          │                                             │
//!                          └──recreate: active + socket ok──► Active(with-worker)
//!
//! Active(*) ──delete / CLOSE──► Stopped   (terminal)
//! ```
//!
//! The recreate sequence (stop the old worker, then start a new one if the
//! descriptor is active) is the only place a worker is created or destroyed,
//! and it always runs with the lock held, so at most one worker is ever live.

use crate::control::{ControlMessage, SendRequest};
use crate::descriptor::{ClusterId, ConnectorDescriptor, ConnectorId};
use crate::error::{ConnectorError, Result};
use crate::factory::SocketFactory;
use crate::filter::{self, BaseDirective, BaseProtocol};
use crate::store::DescriptorLookup;
use crate::worker::{SenderWorker, WorkerConfig, WorkerStatsSnapshot};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

/// Observable lifecycle of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active { has_worker: bool },
    Stopped,
}

/// Result of handing one control message to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Handled, keep processing
    Continue,
    /// Not for this connector, or the connector is already stopped
    Ignored,
    /// The connector stopped and its process should exit
    Terminated,
}

#[derive(Debug)]
struct ConnectorState {
    descriptor: ConnectorDescriptor,
    sender: Option<SenderWorker>,
}

#[derive(Debug)]
pub struct ConnectorManager {
    cluster_id: ClusterId,
    /// `None` once the connector has been deleted
    state: Mutex<Option<ConnectorState>>,
    factory: Arc<dyn SocketFactory>,
    base: Arc<dyn BaseProtocol>,
    worker_config: WorkerConfig,
}

impl ConnectorManager {
    /// Load the descriptor and run the recreate sequence once
    ///
    /// A failed lookup is returned as-is; the manager never becomes active
    /// without a descriptor.
    pub async fn start(
        lookup: &dyn DescriptorLookup,
        cluster_id: ClusterId,
        connector_id: ConnectorId,
        factory: Arc<dyn SocketFactory>,
        base: Arc<dyn BaseProtocol>,
        worker_config: WorkerConfig,
    ) -> Result<Self> {
        let descriptor = lookup.lookup(cluster_id, connector_id)?;
        info!(
            "Starting outgoing connector [{}] in cluster {}",
            descriptor, cluster_id
        );

        Ok(Self::with_descriptor(cluster_id, descriptor, factory, base, worker_config).await)
    }

    /// Start from an already resolved descriptor
    pub async fn with_descriptor(
        cluster_id: ClusterId,
        descriptor: ConnectorDescriptor,
        factory: Arc<dyn SocketFactory>,
        base: Arc<dyn BaseProtocol>,
        worker_config: WorkerConfig,
    ) -> Self {
        let manager = Self {
            cluster_id,
            state: Mutex::new(None),
            factory,
            base,
            worker_config,
        };

        {
            let mut guard = manager.state.lock().await;
            let state = guard.insert(ConnectorState {
                descriptor,
                sender: None,
            });
            manager.recreate_sender(state).await;
        }

        manager
    }

    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }

    pub async fn state(&self) -> LifecycleState {
        match self.state.lock().await.as_ref() {
            Some(state) => LifecycleState::Active {
                has_worker: state.sender.is_some(),
            },
            None => LifecycleState::Stopped,
        }
    }

    pub async fn is_stopped(&self) -> bool {
        self.state().await == LifecycleState::Stopped
    }

    /// Current descriptor, `None` once stopped
    pub async fn descriptor(&self) -> Option<ConnectorDescriptor> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|state| state.descriptor.clone())
    }

    /// Address the live worker is bound to
    pub async fn worker_endpoint(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .as_ref()
            .and_then(|state| state.sender.as_ref())
            .map(|sender| sender.endpoint().to_string())
    }

    pub async fn worker_stats(&self) -> Option<WorkerStatsSnapshot> {
        self.state
            .lock()
            .await
            .as_ref()
            .and_then(|state| state.sender.as_ref())
            .map(SenderWorker::stats)
    }

    /// Whether this connector is the intended recipient of `message`
    pub async fn accepts(&self, message: &ControlMessage) -> bool {
        match self.state.lock().await.as_ref() {
            Some(state) => filter::accepts(message, &state.descriptor, self.base.as_ref()),
            None => false,
        }
    }

    /// Filter, then handle
    pub async fn dispatch(&self, message: ControlMessage) -> HandleOutcome {
        if !self.accepts(&message).await {
            return HandleOutcome::Ignored;
        }
        self.handle(message).await
    }

    /// Route an accepted message to the handler for its action
    pub async fn handle(&self, message: ControlMessage) -> HandleOutcome {
        debug!("Handling {}", message.action_name());

        match message {
            ControlMessage::Send(request) => self.on_send(request).await,
            ControlMessage::Edit(descriptor) => self.on_edit(descriptor).await,
            ControlMessage::Delete(_) => self.stop("deleted").await,
            ControlMessage::Generic(_) => self.on_base_message(&message).await,
        }
    }

    /// Stop the worker and discard the descriptor; idempotent
    pub async fn shutdown(&self) -> HandleOutcome {
        self.stop("shut down").await
    }

    async fn on_send(&self, request: SendRequest) -> HandleOutcome {
        let handle = {
            let guard = self.state.lock().await;
            let Some(state) = guard.as_ref() else {
                return HandleOutcome::Ignored;
            };

            if !state.descriptor.is_active {
                info!(
                    "Not sending, the connection is not active [{}]",
                    state.descriptor
                );
                return HandleOutcome::Continue;
            }

            match &state.sender {
                Some(sender) => sender.handle(),
                None => {
                    trace!("No sender for [{}]", state.descriptor);
                    return HandleOutcome::Continue;
                }
            }
        };

        if let Err(e) = handle.send(Bytes::from(request.body.into_bytes())).await {
            warn!("Payload for '{}' not delivered: {}", request.name, e);
        }
        HandleOutcome::Continue
    }

    async fn on_edit(&self, descriptor: ConnectorDescriptor) -> HandleOutcome {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            return HandleOutcome::Ignored;
        };

        // The old worker rides along into the new record until recreate stops it
        let sender = state.sender.take();
        info!("Editing connector [{}] -> [{}]", state.descriptor, descriptor);
        *state = ConnectorState { descriptor, sender };

        self.recreate_sender(state).await;
        HandleOutcome::Continue
    }

    async fn on_base_message(&self, message: &ControlMessage) -> HandleOutcome {
        if self.is_stopped().await {
            return HandleOutcome::Ignored;
        }

        match self.base.handle(message) {
            BaseDirective::Shutdown => self.stop(message.action_name()).await,
            BaseDirective::Ignore => HandleOutcome::Continue,
        }
    }

    async fn stop(&self, reason: &str) -> HandleOutcome {
        let mut guard = self.state.lock().await;
        let Some(mut state) = guard.take() else {
            debug!("Connector already stopped, nothing to do ({})", reason);
            return HandleOutcome::Ignored;
        };

        self.stop_sender(&mut state).await;
        info!("Connector [{}] {}", state.descriptor, reason);
        HandleOutcome::Terminated
    }

    /// Close the live worker, if any. Caller holds the state lock.
    async fn stop_sender(&self, state: &mut ConnectorState) {
        if let Some(sender) = state.sender.take() {
            if let Err(e) = sender.close().await {
                warn!("Error while closing sender for [{}]: {}", state.descriptor, e);
            }
        }
    }

    /// Stop the old worker, then start a new one when active. Caller holds the state lock.
    async fn recreate_sender(&self, state: &mut ConnectorState) {
        self.stop_sender(state).await;

        if !state.descriptor.is_active {
            debug!("Connector [{}] is not active, no sender", state.descriptor);
            return;
        }

        let descriptor = &state.descriptor;
        let connect_timeout = self.worker_config.connect_timeout;
        let created = tokio::time::timeout(
            connect_timeout,
            self.factory.create(&descriptor.address, descriptor.socket_kind),
        )
        .await
        .unwrap_or_else(|_| Err(ConnectorError::timeout(connect_timeout.as_millis() as u64)));

        match created {
            Ok(socket) => {
                let sender = SenderWorker::start(&descriptor.name, socket, &self.worker_config);
                info!("Sender ready for [{}]", descriptor);
                state.sender = Some(sender);
            }
            Err(e) => {
                error!(
                    "Could not create sender for [{}], waiting for an edit: {}",
                    descriptor, e
                );
            }
        }
    }
}
