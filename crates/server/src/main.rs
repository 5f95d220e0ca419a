mod bootstrap;
mod gateway;
mod health;

use std::time::Duration;

use anyhow::Result;
use architect_core::config::{AppConfig, ConnectionBackend, LoadOptions};
use architect_relay::AddressingContext;
use tracing::{info, warn};

fn init_logging(config: &AppConfig) {
    use architect_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let backend = app.config.relay.connection_backend;
    let gateway = gateway::router(
        gateway::GatewayState {
            dispatcher: app.dispatcher.clone(),
            connections: app.connections.clone(),
            addressing: AddressingContext {
                domain_name: None,
                stage: Some(app.config.relay.stage.clone()),
            },
        },
        backend,
    );
    if backend == ConnectionBackend::Http {
        info!(
            event_name = "system.gateway.websocket_disabled",
            correlation_id = "bootstrap",
            "managed gateway backend: /ws not served, accepting events on /events only"
        );
    }
    let health = health::router(health::HealthState {
        connections: app.connections.clone(),
        connection_backend: app.config.relay.connection_backend,
        agent_endpoint: app.config.invocation.resolved_endpoint(),
    });

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "architect relay listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, gateway.merge(health))
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "architect relay stopping"
    );
    let _ = shutdown_tx.send(());

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "open connections did not drain in time"
        ),
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
