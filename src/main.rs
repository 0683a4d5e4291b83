//! # hubcast
//!
//! Relay binary: loads settings, installs logging and metrics, and serves the
//! notification endpoint until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hubcast_core::{
    AdmissionPolicy, HubEvent, InMemoryTaskCatalog, Principal, StaticTokenAuthenticator,
};
use hubcast_logging::LoggingConfig;
use hubcast_server::{HubcastServer, LoggingRegistrar, ServerConfig, ServerDeps};
use hubcast_settings::{AuthSettings, HubcastSettings};
use tokio::sync::broadcast;

/// Hub event source capacity. Slower consumers see `Lagged` and skip ahead.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Real-time hub notification relay.
#[derive(Parser, Debug)]
#[command(name = "hubcast", about = "Real-time hub notification relay")]
struct Cli {
    /// Settings file (default `~/.hubcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,
}

fn server_config(settings: &HubcastSettings, cli: &Cli) -> ServerConfig {
    let s = &settings.server;
    ServerConfig {
        host: cli.host.clone().unwrap_or_else(|| s.host.clone()),
        port: cli.port.unwrap_or(s.port),
        path: s.path.clone(),
        advertised_scheme: s.advertised_scheme.clone(),
        max_send_queue: s.max_send_queue,
        max_dropped_messages: s.max_dropped_messages,
        heartbeat_interval_secs: s.heartbeat_interval_secs,
        heartbeat_timeout_secs: s.heartbeat_timeout_secs,
        auth_timeout_ms: s.auth_timeout_ms,
        shutdown_timeout_secs: s.shutdown_timeout_secs,
        admission: AdmissionPolicy::any_of(settings.auth.admit_roles.iter().cloned()),
    }
}

fn authenticator(auth: &AuthSettings) -> StaticTokenAuthenticator {
    auth.tokens
        .iter()
        .fold(StaticTokenAuthenticator::new(), |acc, grant| {
            acc.with_token(
                grant.token.clone(),
                Principal::new(grant.subject.clone(), grant.roles.iter().cloned()),
            )
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(hubcast_settings::settings_path);
    let settings = hubcast_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let logging = LoggingConfig::from_names(
        &settings.logging.level,
        &settings.logging.module_levels,
        settings.logging.json,
    )
    .context("Invalid logging settings")?;
    hubcast_logging::init_logging(&logging).context("Failed to initialize logging")?;

    let metrics = hubcast_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let auth = authenticator(&settings.auth);
    if auth.is_empty() {
        tracing::warn!("no tokens configured; every connection will be rejected");
    }

    let config = server_config(&settings, &cli);
    let server = HubcastServer::new(
        config,
        ServerDeps {
            authenticator: Arc::new(auth),
            tasks: Arc::new(InMemoryTaskCatalog::new()),
            registrar: Arc::new(LoggingRegistrar),
            metrics: Some(metrics),
        },
    );

    let (events, rx) = broadcast::channel::<HubEvent>(EVENT_CHANNEL_CAPACITY);
    let handle = server.start(rx).await.context("Failed to start relay")?;
    tracing::info!(addr = %handle.local_addr(), "hubcast ready");
    tracing::warn!(
        "no hub event source attached; clients can connect but no events will be relayed"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    handle.shutdown().await;
    drop(events);
    Ok(())
}
