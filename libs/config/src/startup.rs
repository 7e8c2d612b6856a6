//! Environment the connector process is spawned with
//!
//! The supervisor passes two values: where the server repository lives and
//! which outgoing connector this process owns. Both are required.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

pub const REPO_LOCATION_VAR: &str = "ZATO_REPO_LOCATION";
pub const CONNECTOR_ID_VAR: &str = "ZATO_CONNECTOR_ZMQ_OUT_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupEnv {
    pub repo_location: PathBuf,
    pub connector_id: u64,
}

impl StartupEnv {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve both values through `lookup`, failing on absence or bad format
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let repo_location = lookup(REPO_LOCATION_VAR)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("{} is not set", REPO_LOCATION_VAR))?;

        let connector_id = lookup(CONNECTOR_ID_VAR)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("{} is not set", CONNECTOR_ID_VAR))?;
        let connector_id = connector_id
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} is not a connector id: {}", CONNECTOR_ID_VAR, connector_id))?;

        Ok(Self {
            repo_location: PathBuf::from(repo_location),
            connector_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_both_values_present() {
        let vars = env(&[(REPO_LOCATION_VAR, "/opt/server1"), (CONNECTOR_ID_VAR, "12")]);
        let startup = StartupEnv::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(startup.repo_location, PathBuf::from("/opt/server1"));
        assert_eq!(startup.connector_id, 12);
    }

    #[test]
    fn test_missing_values_are_fatal() {
        let no_id = env(&[(REPO_LOCATION_VAR, "/opt/server1")]);
        let err = StartupEnv::from_lookup(|k| no_id.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains(CONNECTOR_ID_VAR));

        let no_repo = env(&[(CONNECTOR_ID_VAR, "12")]);
        let err = StartupEnv::from_lookup(|k| no_repo.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains(REPO_LOCATION_VAR));

        let empty = env(&[(REPO_LOCATION_VAR, ""), (CONNECTOR_ID_VAR, "12")]);
        assert!(StartupEnv::from_lookup(|k| empty.get(k).cloned()).is_err());
    }

    #[test]
    fn test_non_numeric_id_rejected() {
        let vars = env(&[(REPO_LOCATION_VAR, "/opt/server1"), (CONNECTOR_ID_VAR, "orders")]);
        assert!(StartupEnv::from_lookup(|k| vars.get(k).cloned()).is_err());
    }
}
