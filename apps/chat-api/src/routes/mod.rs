pub mod conversations;
pub mod health;
pub mod messages;
pub mod users;
pub mod ws_check;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(ws_check::router())
        .merge(messages::router())
        .merge(conversations::router())
        .merge(users::router())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        ws_check::ws_check,
        messages::list_messages,
        messages::send_message,
        conversations::list_conversations,
        conversations::create_conversation,
        users::search_users,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            crate::models::message::Message,
            crate::models::conversation::Conversation,
            crate::models::user::UserSummary,
            health::HealthResponse,
            ws_check::WsCheckResponse,
            messages::SendMessageRequest,
            conversations::CreateConversationRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Gateway", description = "Real-time connection checks"),
        (name = "Messages", description = "Messaging"),
        (name = "Conversations", description = "Conversation management"),
        (name = "Users", description = "User directory"),
    )
)]
pub struct ApiDoc;
