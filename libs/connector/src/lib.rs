//! # Outgoing Connector
//!
//! Per-destination process core that owns a single outbound socket and keeps it
//! in step with control messages (send, edit, delete) arriving from the
//! control plane.
//!
//! ## Components
//! - [`SocketFactory`]: builds push/pub socket endpoints from an address
//! - [`SenderWorker`]: owns one endpoint on a background task
//! - [`ConnectorManager`]: descriptor + worker behind one lock, handles control messages
//! - [`filter::accepts`]: decides whether a control message is for this connector
//! - [`ControlListener`] / [`run_dispatch_loop`]: ordered control-message intake
//! - [`SendFacade`]: producer-side entry that publishes send messages by name

pub mod control;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod factory;
pub mod filter;
pub mod manager;
pub mod store;
pub mod test_utils;
pub mod transport;
pub mod worker;

pub use control::{ActionKind, ControlMessage, DeleteRequest, GenericMessage, SendRequest};
pub use descriptor::{ClusterId, ConnectorDescriptor, ConnectorId, SocketKind};
pub use dispatch::{run_dispatch_loop, ControlListener, DispatchExit};
pub use error::{ConnectorError, Result};
pub use facade::{ControlPublisher, SendFacade, UnixControlPublisher};
pub use factory::{SocketFactory, TransportSocketFactory};
pub use filter::{BaseDirective, BaseProtocol, StandardBaseProtocol};
pub use manager::{ConnectorManager, HandleOutcome, LifecycleState};
pub use store::{DescriptorLookup, InMemoryDescriptorStore, TomlDescriptorStore};
pub use transport::{Endpoint, PubSocket, PushSocket, SocketEndpoint, DEFAULT_SEND_TIMEOUT};
pub use worker::{SenderHandle, SenderWorker, WorkerConfig, WorkerStatsSnapshot};
