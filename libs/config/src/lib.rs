//! # Connector Configuration
//!
//! Process-level configuration for an outgoing connector:
//!
//! - **Startup environment**: repository location and connector identity,
//!   both supplied by the supervisor that spawns the process
//! - **Connector settings**: timeouts, queue depths and paths, loaded from
//!   `connector.toml` with `CONNECTOR_*` environment overrides
//!
//! ## Usage
//!
//! ```no_run
//! use connector_config::{ConnectorSettings, StartupEnv};
//!
//! let startup = StartupEnv::from_env()?;
//! let settings = ConnectorSettings::load(&startup.repo_location)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod settings;
pub mod startup;

pub use settings::ConnectorSettings;
pub use startup::StartupEnv;
