//! rolegate server binary
//!
//! Authorization gate and role management in front of an OpenFGA-compatible
//! policy engine.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! rolegate --config rolegate.yaml
//!
//! # With environment variables only
//! ROLEGATE_FGA__API_URL=http://openfga:8080 rolegate
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use rolegate_api::http::{create_router, create_router_with_observability, AppState, Backends};
use rolegate_api::observability::{init_logging, init_metrics, LoggingConfig};
use rolegate_server::ServerConfig;
use rolegate_storage::{
    KcpWorkspaceClient, MemoryIdentityDirectory, OpenFgaHttpEngine, TracingRoleChangeNotifier,
    YamlRoleCatalog,
};

/// rolegate - authorization gate and role management
#[derive(Parser, Debug)]
#[command(name = "rolegate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from(&config.logging));

    info!(version = env!("CARGO_PKG_VERSION"), "Starting rolegate");

    let timeout = config.server.request_timeout();
    let engine = Arc::new(OpenFgaHttpEngine::new(
        config.fga.api_url.clone(),
        config.fga.api_token.clone(),
        timeout,
    )?);
    let workspace = Arc::new(KcpWorkspaceClient::new(
        config.workspace.api_url.clone(),
        config.workspace.token.clone(),
        timeout,
    )?);
    let catalog = Arc::new(YamlRoleCatalog::load(&config.roles.catalog_path)?);
    info!(path = %config.roles.catalog_path, "Role catalog loaded");

    let identity = match &config.identity.seed_path {
        Some(path) => {
            let directory = MemoryIdentityDirectory::from_file(path)?;
            info!(users = directory.len(), "Identity directory seeded");
            directory
        }
        None => {
            warn!("No identity seed configured, every invited email is treated as unknown");
            MemoryIdentityDirectory::new()
        }
    };

    let backends = Backends {
        engine,
        workspace,
        catalog: catalog.clone(),
        identity: Arc::new(identity),
        notifier: Arc::new(TracingRoleChangeNotifier),
    };
    let state = AppState::new(backends, &config);

    let router = if config.metrics.enabled {
        let metrics_state = init_metrics()?;
        info!(path = %config.metrics.path, "Metrics enabled");
        create_router_with_observability(state, metrics_state, &config.metrics.path)
    } else {
        create_router(state)
    };

    #[cfg(unix)]
    tokio::spawn(reload_catalog_on_hangup(catalog));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Reloads the role catalog on SIGHUP. A failed reload keeps the old catalog.
#[cfg(unix)]
async fn reload_catalog_on_hangup(catalog: Arc<YamlRoleCatalog>) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler, catalog reload disabled");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        match catalog.reload() {
            Ok(()) => info!("Role catalog reloaded"),
            Err(e) => error!(error = %e, "Role catalog reload failed"),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = Args::try_parse_from(["rolegate"]).unwrap();
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["rolegate", "--config", "rolegate.yaml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("rolegate.yaml"));

        let args = Args::try_parse_from(["rolegate", "-c", "test.yaml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("test.yaml"));
    }
}
