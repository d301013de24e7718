//! Conversation listing and creation.

use std::collections::HashSet;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::hub::channel::Category;
use crate::hub::events::{Envelope, EventType};
use crate::models::conversation::Conversation;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/conversations",
        get(list_conversations).post(create_conversation),
    )
}

#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "Conversations",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Conversations the user participates in", body = [Conversation]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_conversations(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state.store.conversations_for_user(&user_id, 50).await?;
    Ok(Json(conversations))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "Conversations",
    security(("bearer" = [])),
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = Conversation),
        (status = 400, description = "Invalid participants", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 409, description = "Direct conversation already exists", body = ApiErrorBody),
    ),
)]
pub async fn create_conversation(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let others: HashSet<&str> = req
        .participants
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && *p != user_id)
        .collect();
    if !req.is_group && others.len() > 1 {
        return Err(ApiError::bad_request(
            "A direct conversation has exactly one other participant; set is_group for a group chat",
        ));
    }

    let title = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let participants: Vec<String> = req.participants.iter().map(|p| p.trim().to_string()).collect();
    let conversation = state
        .store
        .create_conversation(title, req.is_group, &user_id, &participants)
        .await?;

    // Announce off the request path so broker retries never delay the response.
    let hub = state.hub.clone();
    let announced = conversation.clone();
    tokio::spawn(async move {
        let record = match serde_json::to_value(&announced) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(?e, "failed to serialize conversation");
                return;
            }
        };
        let event = Envelope::new(EventType::CONVERSATION_CREATED, &announced.id, &user_id)
            .with_field("conversation", record);
        if let Err(e) = hub.publish(&announced.id, Category::Events, &event).await {
            tracing::warn!(conversation_id = %announced.id, error = %e, "failed to publish conversation_created");
        }
    });

    Ok((StatusCode::CREATED, Json(conversation)))
}
