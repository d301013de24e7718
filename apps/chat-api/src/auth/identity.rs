//! Identity verification at the request boundary.
//!
//! Tokens are issued by the external auth service; this module only checks
//! them. With `JWT_SECRET` set, an HS256 access token is required and its
//! `sub` claim is the user id. Without it, the upgrade endpoint trusts the
//! `user_id` query parameter, guarded by `WS_SECRET` when configured.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Name of the cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("missing or invalid token")]
    InvalidToken,
    #[error("user_id required")]
    MissingUserId,
    #[error("invalid upgrade secret")]
    BadSecret,
    #[error("token authentication is not configured")]
    NotConfigured,
}

/// Verify an HS256 access token and return its subject.
pub fn verify_token(secret: &str, token: &str) -> Option<String> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());
    match jsonwebtoken::decode::<Claims>(token, &key, &validation) {
        Ok(data) if !data.claims.sub.is_empty() => Some(data.claims.sub),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(?e, "access token rejected");
            None
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v)
}

/// Resolve the user from the first valid access token found in the
/// `Authorization` header, the access token cookie, or `query_token`.
pub fn identify_request(
    config: &Config,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<String, IdentityError> {
    let secret = config
        .jwt_secret
        .as_deref()
        .ok_or(IdentityError::NotConfigured)?;

    [bearer(headers), cookie(headers, ACCESS_TOKEN_COOKIE), query_token]
        .into_iter()
        .flatten()
        .find_map(|token| verify_token(secret, token))
        .ok_or(IdentityError::InvalidToken)
}

/// Resolve the user opening a socket.
///
/// Uses [`identify_request`] when token authentication is configured,
/// otherwise the `user_id` query parameter plus the optional shared secret.
pub fn identify_upgrade(
    config: &Config,
    headers: &HeaderMap,
    query_token: Option<&str>,
    query_user_id: Option<&str>,
) -> Result<String, IdentityError> {
    if config.jwt_secret.is_some() {
        return identify_request(config, headers, query_token);
    }

    if let Some(secret) = config.ws_secret.as_deref() {
        let presented = bearer(headers).or(query_token);
        if presented != Some(secret) {
            return Err(IdentityError::BadSecret);
        }
    }

    query_user_id
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(IdentityError::MissingUserId)
}
