//! Display-name search for the participant picker.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::user::UserSummary;
use crate::AppState;

/// Most users returned by one search.
const MAX_RESULTS: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/users", get(search_users))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    security(("bearer" = [])),
    params(
        ("q" = Option<String>, Query, description = "Part of a display name; blank returns no users"),
    ),
    responses(
        (status = 200, description = "Matching users, by display name", body = [UserSummary]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn search_users(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    tracing::debug!(%user_id, query, "user search");
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let users = state.store.search_users(query, MAX_RESULTS).await?;
    Ok(Json(users))
}
