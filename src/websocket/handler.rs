//! WebSocket Handler
//!
//! Upgrades HTTP requests to subscriber sessions.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};
use std::sync::Arc;

use super::connection::serve_socket;
use super::hub::HubError;
use crate::api::{ApiResult, AppState};

/// WebSocket upgrade handler
///
/// Refuses the upgrade with 503 while the hub is at capacity. Any origin
/// is accepted.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let hub = state.hub.clone();
    let limit = hub.config().max_connections;

    if hub.count().await? >= limit {
        tracing::warn!(limit, "Refusing WebSocket upgrade, hub full");
        return Err(HubError::TooManyConnections(limit).into());
    }

    Ok(ws.on_upgrade(move |socket| serve_socket(socket, hub)))
}
