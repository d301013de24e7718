use crate::error::ApiError;
use crate::AppState;

/// Check that `user_id` participates in `conversation_id` and return the
/// conversation id as the room to join.
pub async fn require_participant(
    state: &AppState,
    user_id: &str,
    conversation_id: Option<&str>,
) -> Result<String, ApiError> {
    let room = conversation_id
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("conversation_id required"))?;

    let allowed = state.store.is_participant(room, user_id).await.map_err(|e| {
        tracing::error!(%room, %user_id, error = %e, "membership check failed");
        ApiError::internal("An internal error occurred")
    })?;
    if !allowed {
        return Err(ApiError::forbidden("Not a participant of this conversation"));
    }
    Ok(room.to_string())
}
