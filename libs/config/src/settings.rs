//! Connector Settings Module
//!
//! Loads the tunables of one connector process. Values come from, in order of
//! increasing precedence:
//! 1. built-in defaults
//! 2. `<repo_location>/connector.toml` (optional)
//! 3. `CONNECTOR_*` environment variables (`CONNECTOR_CLUSTER_ID=2`, ...)

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const SETTINGS_FILE: &str = "connector.toml";
pub const DESCRIPTOR_FILE: &str = "outgoing.toml";
pub const ENV_PREFIX: &str = "CONNECTOR";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConnectorSettings {
    /// Cluster the connector's descriptor is looked up in
    pub cluster_id: u64,

    /// Upper bound on socket construction
    pub connect_timeout_ms: u64,

    /// Upper bound on writing one frame to a push peer
    pub send_timeout_ms: u64,

    /// Upper bound on draining a worker when it is replaced or stopped
    pub close_timeout_ms: u64,

    /// Payloads buffered between the control path and the socket
    pub send_queue_depth: usize,

    /// Control messages buffered between producers and the dispatch loop
    pub control_queue_depth: usize,

    /// Trace every successful send
    pub trace_sends: bool,

    /// Defaults to `<repo_location>/outgoing-<connector_id>.sock`
    pub control_socket: Option<String>,

    /// Defaults to `<repo_location>/outgoing.toml`
    pub descriptor_file: Option<String>,

    pub log_level: String,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            cluster_id: 1,
            connect_timeout_ms: 5_000,
            send_timeout_ms: 5_000,
            close_timeout_ms: 2_000,
            send_queue_depth: 1024,
            control_queue_depth: 1024,
            trace_sends: false,
            control_socket: None,
            descriptor_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl ConnectorSettings {
    /// Load settings for the repository at `repo_location`
    pub fn load(repo_location: &Path) -> Result<Self> {
        let file = repo_location.join(SETTINGS_FILE);
        if file.exists() {
            info!("Loading connector settings: {:?}", file);
        } else {
            debug!("No settings file at {:?}, using defaults", file);
        }

        let builder = Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let settings: Self = builder
            .build()
            .context("Failed to build connector settings")?
            .try_deserialize()
            .context("Failed to deserialize connector settings")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).context("Failed to parse connector settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.send_queue_depth == 0 {
            bail!("send_queue_depth must be greater than 0");
        }
        if self.control_queue_depth == 0 {
            bail!("control_queue_depth must be greater than 0");
        }
        if self.connect_timeout_ms == 0 {
            bail!("connect_timeout_ms must be greater than 0");
        }
        if self.send_timeout_ms == 0 {
            bail!("send_timeout_ms must be greater than 0");
        }
        if self.close_timeout_ms == 0 {
            bail!("close_timeout_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Control socket path, with environment variables expanded
    pub fn control_socket_path(&self, repo_location: &Path, connector_id: u64) -> Result<PathBuf> {
        match &self.control_socket {
            Some(path) => expand(path),
            None => Ok(repo_location.join(format!("outgoing-{}.sock", connector_id))),
        }
    }

    /// Descriptor file path, with environment variables expanded
    pub fn descriptor_path(&self, repo_location: &Path) -> Result<PathBuf> {
        match &self.descriptor_file {
            Some(path) => expand(path),
            None => Ok(repo_location.join(DESCRIPTOR_FILE)),
        }
    }
}

fn expand(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::env(path)
        .with_context(|| format!("Failed to expand path {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let settings = ConnectorSettings::load(dir.path()).unwrap();

        assert_eq!(settings.send_queue_depth, 1024);
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.send_timeout(), Duration::from_secs(5));
        assert!(!settings.trace_sends);
        assert_eq!(
            settings.control_socket_path(dir.path(), 7).unwrap(),
            dir.path().join("outgoing-7.sock")
        );
        assert_eq!(
            settings.descriptor_path(dir.path()).unwrap(),
            dir.path().join("outgoing.toml")
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"
                cluster_id = 4
                connect_timeout_ms = 250
                trace_sends = true
                control_socket = "/tmp/custom-control.sock"
                log_level = "debug"
            "#,
        )
        .unwrap();

        let settings = ConnectorSettings::load(dir.path()).unwrap();
        assert_eq!(settings.cluster_id, 4);
        assert_eq!(settings.connect_timeout(), Duration::from_millis(250));
        assert!(settings.trace_sends);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(
            settings.control_socket_path(dir.path(), 1).unwrap(),
            PathBuf::from("/tmp/custom-control.sock")
        );
        // Untouched fields keep their defaults
        assert_eq!(settings.close_timeout_ms, 2_000);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(ConnectorSettings::from_toml_str("send_queue_depth = 0").is_err());
        assert!(ConnectorSettings::from_toml_str("connect_timeout_ms = 0").is_err());
        assert!(ConnectorSettings::from_toml_str("close_timeout_ms = 0").is_err());
        assert!(ConnectorSettings::from_toml_str("send_timeout_ms = 0").is_err());
        assert!(ConnectorSettings::from_toml_str("control_queue_depth = 0").is_err());
        assert!(ConnectorSettings::from_toml_str("send_queue_depth = 16").is_ok());
    }
}
