//! Descriptor lookup for connector startup
//!
//! The file-backed store reads connector definitions from TOML:
//!
//! ```toml
//! [[connector]]
//! cluster_id = 1
//! id = 7
//! name = "orders.out"
//! address = "tcp://10.0.0.5:5555"
//! socket_kind = "push"
//! is_active = true
//! ```

use crate::descriptor::{ClusterId, ConnectorDescriptor, ConnectorId, SocketKind};
use crate::error::{ConnectorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Resolves a connector identity to its descriptor
pub trait DescriptorLookup: Send + Sync + Debug {
    fn lookup(&self, cluster_id: ClusterId, connector_id: ConnectorId)
        -> Result<ConnectorDescriptor>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct StoredConnector {
    cluster_id: ClusterId,
    id: ConnectorId,
    name: String,
    address: String,
    socket_kind: SocketKind,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct StoreFile {
    #[serde(default)]
    connector: Vec<StoredConnector>,
}

/// Descriptors held in memory, keyed by cluster and connector id
#[derive(Debug, Clone, Default)]
pub struct InMemoryDescriptorStore {
    descriptors: HashMap<(ClusterId, ConnectorId), ConnectorDescriptor>,
}

impl InMemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cluster_id: ClusterId, descriptor: ConnectorDescriptor) {
        self.descriptors.insert((cluster_id, descriptor.id), descriptor);
    }

    pub fn with_descriptor(mut self, cluster_id: ClusterId, descriptor: ConnectorDescriptor) -> Self {
        self.insert(cluster_id, descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl DescriptorLookup for InMemoryDescriptorStore {
    fn lookup(
        &self,
        cluster_id: ClusterId,
        connector_id: ConnectorId,
    ) -> Result<ConnectorDescriptor> {
        self.descriptors
            .get(&(cluster_id, connector_id))
            .cloned()
            .ok_or(ConnectorError::DescriptorNotFound {
                cluster_id,
                connector_id,
            })
    }
}

/// Descriptors loaded from a TOML file
#[derive(Debug, Clone)]
pub struct TomlDescriptorStore {
    inner: InMemoryDescriptorStore,
    source: Option<PathBuf>,
}

impl TomlDescriptorStore {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::Store(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut store = Self::from_toml_str(&content)?;
        store.source = Some(path.to_owned());

        tracing::debug!(
            "Loaded {} connector descriptors from {}",
            store.inner.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: StoreFile = toml::from_str(content)
            .map_err(|e| ConnectorError::Store(format!("Failed to parse descriptors: {}", e)))?;

        let mut inner = InMemoryDescriptorStore::new();
        for stored in file.connector {
            if inner
                .descriptors
                .contains_key(&(stored.cluster_id, stored.id))
            {
                return Err(ConnectorError::Store(format!(
                    "Duplicate connector {} in cluster {}",
                    stored.id, stored.cluster_id
                )));
            }
            inner.insert(
                stored.cluster_id,
                ConnectorDescriptor {
                    id: stored.id,
                    name: stored.name,
                    address: stored.address,
                    socket_kind: stored.socket_kind,
                    is_active: stored.is_active,
                },
            );
        }

        Ok(Self {
            inner,
            source: None,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl DescriptorLookup for TomlDescriptorStore {
    fn lookup(
        &self,
        cluster_id: ClusterId,
        connector_id: ConnectorId,
    ) -> Result<ConnectorDescriptor> {
        self.inner.lookup(cluster_id, connector_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> &'static str {
        r#"
            [[connector]]
            cluster_id = 1
            id = 7
            name = "orders.out"
            address = "tcp://127.0.0.1:5555"
            socket_kind = "push"

            [[connector]]
            cluster_id = 1
            id = 8
            name = "prices.out"
            address = "ipc:///tmp/prices.sock"
            socket_kind = "pub"
            is_active = false

            [[connector]]
            cluster_id = 2
            id = 7
            name = "orders.out"
            address = "tcp://10.1.0.1:5555"
            socket_kind = "push"
        "#
    }

    #[test]
    fn test_lookup_by_cluster_and_id() {
        let store = TomlDescriptorStore::from_toml_str(sample()).unwrap();
        assert_eq!(store.len(), 3);

        let orders = store.lookup(ClusterId(1), ConnectorId(7)).unwrap();
        assert_eq!(orders.name, "orders.out");
        assert!(orders.is_active);

        let prices = store.lookup(ClusterId(1), ConnectorId(8)).unwrap();
        assert_eq!(prices.socket_kind, SocketKind::Pub);
        assert!(!prices.is_active);

        let other_cluster = store.lookup(ClusterId(2), ConnectorId(7)).unwrap();
        assert_eq!(other_cluster.address, "tcp://10.1.0.1:5555");
    }

    #[test]
    fn test_unknown_identity() {
        let store = TomlDescriptorStore::from_toml_str(sample()).unwrap();
        let err = store.lookup(ClusterId(3), ConnectorId(7)).unwrap_err();
        assert!(err.is_startup_fatal());
        assert!(matches!(err, ConnectorError::DescriptorNotFound { .. }));
    }

    #[test]
    fn test_duplicate_rejected() {
        let duplicated = r#"
            [[connector]]
            cluster_id = 1
            id = 7
            name = "a"
            address = "tcp://127.0.0.1:1"
            socket_kind = "push"

            [[connector]]
            cluster_id = 1
            id = 7
            name = "b"
            address = "tcp://127.0.0.1:2"
            socket_kind = "push"
        "#;
        assert!(matches!(
            TomlDescriptorStore::from_toml_str(duplicated),
            Err(ConnectorError::Store(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample().as_bytes()).unwrap();

        let store = TomlDescriptorStore::from_file(file.path()).unwrap();
        assert_eq!(store.source(), Some(file.path()));
        assert!(store.lookup(ClusterId(1), ConnectorId(8)).is_ok());

        let missing = TomlDescriptorStore::from_file("/nonexistent/outgoing.toml").unwrap_err();
        assert!(missing.is_startup_fatal());
    }
}
