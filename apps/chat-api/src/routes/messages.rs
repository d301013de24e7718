//! Message history and posting.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::membership;
use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::hub::channel::Category;
use crate::hub::events::RecordEvent;
use crate::models::message::Message;
use crate::AppState;

/// Longest accepted message body, in characters.
pub const MAX_BODY_CHARS: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/messages", get(list_messages).post(send_message))
}

// ---------------------------------------------------------------------------
// GET /api/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    pub conversation_id: Option<String>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("conversation_id" = String, Query, description = "Conversation to read"),
        ("limit" = Option<i64>, Query, description = "Number of messages (1-100, default 50)"),
    ),
    responses(
        (status = 200, description = "Recent messages, oldest first", body = [Message]),
        (status = 400, description = "Missing conversation_id", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
    ),
)]
pub async fn list_messages(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let room =
        membership::require_participant(&state, &user_id, params.conversation_id.as_deref())
            .await?;
    let limit = params.limit.unwrap_or(50).clamp(1, 100);

    let messages = state.store.recent_messages(&room, limit).await?;
    Ok(Json(messages))
}

// ---------------------------------------------------------------------------
// POST /api/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub conversation_id: Option<String>,
    pub body: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "Messages",
    security(("bearer" = [])),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message saved and published", body = Message),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
    ),
)]
pub async fn send_message(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let body = req.body.as_deref().map(str::trim).unwrap_or_default();
    if body.is_empty() {
        return Err(ApiError::invalid_field("body", "Message body is required"));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(ApiError::invalid_field(
            "body",
            format!("Message body must be {MAX_BODY_CHARS} characters or fewer"),
        ));
    }

    let room =
        membership::require_participant(&state, &user_id, req.conversation_id.as_deref()).await?;

    let saved = state.store.save_message(&room, &user_id, body).await?;

    // Already persisted; delivery failure must not fail the request.
    if let Err(e) = state
        .hub
        .publish(&room, Category::Messages, &RecordEvent::message(&saved))
        .await
    {
        tracing::warn!(%room, message_id = %saved.id, error = %e, "failed to publish message");
    }

    Ok((StatusCode::CREATED, Json(saved)))
}
