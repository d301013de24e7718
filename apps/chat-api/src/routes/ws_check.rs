//! Pre-flight check for the WebSocket endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::membership;
use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ws_check", get(ws_check))
}

#[derive(Debug, Deserialize)]
pub struct WsCheckParams {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WsCheckResponse {
    pub ok: bool,
    pub conversation_id: String,
    pub user_id: String,
}

/// Runs the same checks as the upgrade without upgrading.
#[utoipa::path(
    get,
    path = "/api/ws_check",
    tag = "Gateway",
    security(("bearer" = [])),
    params(
        ("conversation_id" = String, Query, description = "Conversation to join"),
    ),
    responses(
        (status = 200, description = "User may join", body = WsCheckResponse),
        (status = 400, description = "Missing conversation_id", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
    ),
)]
pub async fn ws_check(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<WsCheckParams>,
) -> Result<Json<WsCheckResponse>, ApiError> {
    let room =
        membership::require_participant(&state, &user_id, params.conversation_id.as_deref())
            .await?;
    Ok(Json(WsCheckResponse {
        ok: true,
        conversation_id: room,
        user_id,
    }))
}
