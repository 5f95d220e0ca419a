//! Client-facing gateway: a WebSocket endpoint that turns socket lifecycle into
//! `$connect`/`$default`/`$disconnect` events, and a JSON endpoint that accepts
//! events from a managed gateway.

use std::sync::Arc;

use architect_core::config::ConnectionBackend;
use architect_core::{ConnectionId, RelayStatus, StatusResponse};
use architect_relay::events::{CONNECT_ROUTE, DEFAULT_ROUTE, DISCONNECT_ROUTE};
use architect_relay::{
    AddressingContext, GatewayEvent, LocalConnectionRegistry, RelayDispatcher, RelayEvent,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: RelayDispatcher,
    pub connections: Arc<LocalConnectionRegistry>,
    pub addressing: AddressingContext,
}

/// `/ws` is served only when this process delivers to its own sockets; with the
/// managed gateway backend replies never reach a locally held socket.
pub fn router(state: GatewayState, backend: ConnectionBackend) -> Router {
    let router = Router::new().route("/events", post(event_handler));
    let router = match backend {
        ConnectionBackend::Local => router.route("/ws", get(ws_handler)),
        ConnectionBackend::Http => router,
    };
    router.with_state(state)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let connection_id = ConnectionId(Uuid::new_v4().to_string());
    let mut outbound = state.connections.register(connection_id.clone()).await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let status = state.dispatcher.handle(state.event(CONNECT_ROUTE, &connection_id, None)).await;
    if !status.is_success() {
        warn!(
            event_name = "gateway.ws.connect_refused",
            connection_id = %connection_id,
            status_code = status.code(),
            "connection refused"
        );
        state.connections.unregister(&connection_id).await;
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }
    info!(event_name = "gateway.ws.opened", connection_id = %connection_id, "websocket opened");

    let send_task = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                debug!("websocket send failed, client disconnected");
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let body = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                warn!(
                    event_name = "gateway.ws.read_failed",
                    connection_id = %connection_id,
                    error = %error,
                    "websocket read failed"
                );
                break;
            }
        };

        state.dispatcher.handle(state.event(DEFAULT_ROUTE, &connection_id, Some(body))).await;
    }

    state.connections.unregister(&connection_id).await;
    state.dispatcher.handle(state.event(DISCONNECT_ROUTE, &connection_id, None)).await;
    send_task.abort();
    info!(event_name = "gateway.ws.closed", connection_id = %connection_id, "websocket closed");
}

/// Accepts a gateway event, or a processing job carrying the `async_processing` marker.
pub async fn event_handler(
    State(state): State<GatewayState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<StatusResponse>) {
    let status = match RelayEvent::from_json(payload) {
        Ok(event) => state.dispatcher.handle(event).await,
        Err(error) => {
            warn!(
                event_name = "gateway.events.rejected",
                error = %error,
                "event payload has an unexpected shape"
            );
            RelayStatus::BadRequest
        }
    };

    let code = StatusCode::from_u16(status.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(StatusResponse::from(status)))
}

impl GatewayState {
    fn event(
        &self,
        route_key: &str,
        connection_id: &ConnectionId,
        body: Option<String>,
    ) -> RelayEvent {
        RelayEvent::Gateway(GatewayEvent::new(
            route_key,
            connection_id.clone(),
            &self.addressing,
            body,
        ))
    }
}
