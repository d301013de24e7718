//! WebSocket upgrade endpoint.
//!
//! Every check runs before the upgrade, so a rejected client never becomes a
//! registered connection.

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::auth::{identity, membership};
use crate::error::ApiError;
use crate::hub::connection::WsSink;
use crate::AppState;

use super::lifecycle::run_connection;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
    pub token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<UpgradeQuery>,
    headers: HeaderMap,
) -> Response {
    let user_id = match identity::identify_upgrade(
        &state.config,
        &headers,
        query.token.as_deref(),
        query.user_id.as_deref(),
    ) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(reason = %e, "upgrade rejected: unauthenticated");
            return ApiError::unauthorized(e.to_string()).into_response();
        }
    };

    let room = match membership::require_participant(&state, &user_id, query.conversation_id.as_deref()).await {
        Ok(room) => room,
        Err(e) => {
            tracing::warn!(%user_id, status = %e.status, reason = %e.message, "upgrade rejected");
            return e.into_response();
        }
    };

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move {
        let (tx, rx) = socket.split();
        run_connection(hub, room, user_id, Arc::new(WsSink::new(tx)), rx).await;
    })
}
