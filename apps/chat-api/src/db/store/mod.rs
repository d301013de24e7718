//! Conversation storage used by the HTTP routes and the upgrade check.
//!
//! Backed by PostgreSQL in production and an in-memory map in tests.

mod memory;
mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use diesel_async::pooled_connection::deadpool::PoolError;

use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::models::user::UserSummary;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool, StoreError>;

    async fn save_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<Message, StoreError>;

    /// The latest `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError>;

    /// Conversations `user_id` participates in, newest first.
    async fn conversations_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Create a conversation with `creator` and `participants` as members.
    ///
    /// A direct (non-group) conversation needs exactly one other participant
    /// and must not already exist between the same two users.
    async fn create_conversation(
        &self,
        title: Option<&str>,
        is_group: bool,
        creator: &str,
        participants: &[String],
    ) -> Result<Conversation, StoreError>;

    /// Users whose display name contains `query`, case-insensitively, ordered
    /// by display name.
    async fn search_users(&self, query: &str, limit: i64) -> Result<Vec<UserSummary>, StoreError>;
}

/// Participants other than the creator, deduplicated, in request order.
fn other_participants<'a>(creator: &str, participants: &'a [String]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    participants
        .iter()
        .map(|p| p.as_str())
        .filter(|p| !p.is_empty() && *p != creator && seen.insert(*p))
        .collect()
}

fn invalid_direct() -> StoreError {
    StoreError::Invalid("a direct conversation needs exactly one other participant".to_string())
}

fn direct_exists() -> StoreError {
    StoreError::Conflict("direct conversation between these users already exists".to_string())
}
