//! Access token extraction for HTTP routes.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use crate::auth::identity;
use crate::error::ApiError;
use crate::AppState;

/// Authenticated user resolved from the request's access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        let user_id =
            identity::identify_request(&state.config, &parts.headers, query.token.as_deref())
                .map_err(|e| ApiError::unauthorized(e.to_string()))?;

        Ok(AuthUser { user_id })
    }
}
