//! Connector descriptor - the configuration record of one outgoing destination
//!
//! The descriptor is plain data. The live sender worker is kept beside it by
//! the manager so that an edit can replace the record wholesale and carry the
//! worker over explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an outgoing connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ConnectorId(pub u64);

/// Identifier of the cluster a connector belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ClusterId(pub u64);

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of the outbound socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    /// Connects to a single peer and streams every frame to it
    Push,
    /// Binds a listener and broadcasts every frame to connected subscribers
    Pub,
}

impl SocketKind {
    pub fn name(self) -> &'static str {
        match self {
            SocketKind::Push => "push",
            SocketKind::Pub => "pub",
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity and configuration of the managed destination
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectorDescriptor {
    pub id: ConnectorId,

    /// Unique within the cluster, used to route control messages
    pub name: String,

    /// Endpoint handed to the socket factory
    pub address: String,

    pub socket_kind: SocketKind,

    /// An inactive connector accepts control messages but never sends
    pub is_active: bool,
}

impl ConnectorDescriptor {
    pub fn new(
        id: ConnectorId,
        name: impl Into<String>,
        address: impl Into<String>,
        socket_kind: SocketKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            socket_kind,
            is_active: true,
        }
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }
}

impl fmt::Display for ConnectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} name={} address={} kind={} active={}",
            self.id, self.name, self.address, self.socket_kind, self.is_active
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_deserialize() {
        let json = r#"{
            "id": 12,
            "name": "orders.out",
            "address": "tcp://127.0.0.1:5555",
            "socket_kind": "push",
            "is_active": false
        }"#;

        let descriptor: ConnectorDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.id, ConnectorId(12));
        assert_eq!(descriptor.socket_kind, SocketKind::Push);
        assert!(!descriptor.is_active);
    }

    #[test]
    fn test_descriptor_display() {
        let descriptor =
            ConnectorDescriptor::new(ConnectorId(3), "feed", "ipc:///tmp/feed.sock", SocketKind::Pub);
        assert_eq!(
            descriptor.to_string(),
            "id=3 name=feed address=ipc:///tmp/feed.sock kind=pub active=true"
        );
    }
}
