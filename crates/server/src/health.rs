use std::sync::Arc;

use architect_core::config::ConnectionBackend;
use architect_relay::LocalConnectionRegistry;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub connections: Arc<LocalConnectionRegistry>,
    pub connection_backend: ConnectionBackend,
    pub agent_endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub connections: HealthCheck,
    pub agents: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub service: &'static str,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).route("/ping", get(ping)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let connections = match state.connection_backend {
        ConnectionBackend::Local => HealthCheck {
            status: "ready",
            detail: format!("{} open local connections", state.connections.len().await),
        },
        ConnectionBackend::Http => HealthCheck {
            status: "ready",
            detail: "delivering through managed gateway".to_string(),
        },
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck { status: "ready", detail: "relay runtime initialized".to_string() },
        connections,
        agents: HealthCheck { status: "ready", detail: state.agent_endpoint.clone() },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { status: "healthy", service: "relay" })
}
