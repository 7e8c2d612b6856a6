//! Outgoing connector process
//!
//! Spawned once per outgoing connector definition. The supervisor passes the
//! repository location and connector id through the environment:
//!
//!   ZATO_REPO_LOCATION=/opt/server1 ZATO_CONNECTOR_ZMQ_OUT_ID=12 outgoing-connector
//!
//! Control messages arrive as JSON lines on a Unix socket next to the repository.

use anyhow::{Context, Result};
use clap::Parser;
use connector_config::{ConnectorSettings, StartupEnv};
use outgoing_connector::{
    run_dispatch_loop, ClusterId, ConnectorId, ConnectorManager, ControlListener, DispatchExit,
    StandardBaseProtocol, TomlDescriptorStore, TransportSocketFactory, WorkerConfig,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "outgoing-connector")]
#[command(about = "Outgoing socket connector")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error), overrides the settings file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let startup = StartupEnv::from_env()?;
    let settings = ConnectorSettings::load(&startup.repo_location)?;

    let log_level = args.log_level.as_deref().unwrap_or(&settings.log_level);
    init_logging(log_level, args.json_logs);

    info!(
        "Starting outgoing connector {} (repo {})",
        startup.connector_id,
        startup.repo_location.display()
    );

    let descriptor_path = settings.descriptor_path(&startup.repo_location)?;
    let store = TomlDescriptorStore::from_file(&descriptor_path).map_err(|e| {
        error!("Failed to load descriptors from {}: {}", descriptor_path.display(), e);
        e
    })?;

    let worker_config = WorkerConfig {
        connect_timeout: settings.connect_timeout(),
        queue_depth: settings.send_queue_depth,
        close_timeout: settings.close_timeout(),
        trace_sends: settings.trace_sends,
    };

    let manager = ConnectorManager::start(
        &store,
        ClusterId(settings.cluster_id),
        ConnectorId(startup.connector_id),
        Arc::new(
            TransportSocketFactory::new()
                .with_timeout(settings.connect_timeout())
                .with_send_timeout(settings.send_timeout()),
        ),
        Arc::new(StandardBaseProtocol),
        worker_config,
    )
    .await
    .map_err(|e| {
        error!("Connector {} could not start: {}", startup.connector_id, e);
        e
    })?;

    let control_path = settings.control_socket_path(&startup.repo_location, startup.connector_id)?;
    let (listener, mut messages) =
        ControlListener::bind(&control_path, settings.control_queue_depth)
            .with_context(|| format!("Failed to bind control socket {}", control_path.display()))?;

    let dispatch = run_dispatch_loop(&manager, &mut messages);
    tokio::pin!(dispatch);

    let finished = tokio::select! {
        exit = &mut dispatch => Some(exit),
        _ = tokio::signal::ctrl_c() => None,
    };

    let exit = match finished {
        Some(exit) => exit,
        None => {
            info!("Received shutdown signal, draining queued control messages");
            listener.shutdown();
            dispatch.await
        }
    };

    match exit {
        DispatchExit::Terminated => info!("Connector {} terminated", startup.connector_id),
        DispatchExit::SourceClosed => {
            info!("Control source closed, stopping connector {}", startup.connector_id);
            manager.shutdown().await;
        }
    }

    Ok(())
}

fn init_logging(level: &str, json_logs: bool) {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    if json_logs {
        tracing_subscriber::fmt().json().with_max_level(log_level).init();
    } else {
        tracing_subscriber::fmt().with_max_level(log_level).init();
    }
}
