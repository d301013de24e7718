//! PostgreSQL store on the diesel-async pool.

use async_trait::async_trait;
use chat_common::PrefixedId;
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel::sql_types::Text;
use diesel_async::{AsyncConnection, RunQueryDsl};
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::{conversation_participants, conversations, messages, users};
use crate::models::conversation::{Conversation, NewConversation, NewParticipant};
use crate::models::message::{Message, MessageRow, NewMessage};
use crate::models::user::UserSummary;

use super::{direct_exists, invalid_direct, other_participants, ConversationStore, StoreError};

pub struct PgStore {
    db: DbPool,
}

impl PgStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

/// Ids of the conversations `user_id` belongs to.
fn memberships(user_id: &str) -> conversation_participants::BoxedQuery<'_, Pg, Text> {
    conversation_participants::table
        .filter(conversation_participants::user_id.eq(user_id))
        .select(conversation_participants::conversation_id)
        .into_boxed()
}

/// Direct (non-group) conversations among `candidates`.
fn direct_among(candidates: &[String]) -> conversations::BoxedQuery<'_, Pg, Text> {
    conversations::table
        .filter(conversations::is_group.eq(false))
        .filter(conversations::id.eq_any(candidates))
        .select(conversations::id)
        .into_boxed()
}

/// `%query%` with LIKE wildcards in `query` matched literally.
fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.db.get().await?;
        let exists = diesel::select(diesel::dsl::exists(
            conversation_participants::table
                .filter(conversation_participants::conversation_id.eq(conversation_id))
                .filter(conversation_participants::user_id.eq(user_id)),
        ))
        .get_result::<bool>(&mut conn)
        .await?;
        Ok(exists)
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<Message, StoreError> {
        let mut conn = self.db.get().await?;
        let id = Message::generate();

        let row: MessageRow = diesel::insert_into(messages::table)
            .values(NewMessage {
                id: &id,
                conversation_id,
                author_id,
                body,
                created_at: Utc::now(),
            })
            .returning(MessageRow::as_returning())
            .get_result(&mut conn)
            .await?;

        // Author profile is decoration; a missing user row is fine.
        let (name, avatar) = users::table
            .find(author_id)
            .select((users::display_name, users::avatar_url))
            .first::<(Option<String>, Option<String>)>(&mut conn)
            .await
            .optional()?
            .unwrap_or_default();

        Ok(Message::from_row(row, name, avatar))
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.db.get().await?;
        let rows: Vec<(MessageRow, Option<String>, Option<String>)> = messages::table
            .left_join(users::table)
            .filter(messages::conversation_id.eq(conversation_id))
            .order((messages::created_at.desc(), messages::id.desc()))
            .limit(limit)
            .select((
                MessageRow::as_select(),
                users::display_name.nullable(),
                users::avatar_url.nullable(),
            ))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .rev()
            .map(|(row, name, avatar)| Message::from_row(row, name, avatar))
            .collect())
    }

    async fn conversations_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Conversation>, StoreError> {
        let mut conn = self.db.get().await?;
        let convs = conversations::table
            .inner_join(conversation_participants::table)
            .filter(conversation_participants::user_id.eq(user_id))
            .order(conversations::created_at.desc())
            .limit(limit)
            .select(Conversation::as_select())
            .load(&mut conn)
            .await?;
        Ok(convs)
    }

    async fn create_conversation(
        &self,
        title: Option<&str>,
        is_group: bool,
        creator: &str,
        participants: &[String],
    ) -> Result<Conversation, StoreError> {
        let others = other_participants(creator, participants);
        if !is_group && others.len() != 1 {
            return Err(invalid_direct());
        }

        let id = Conversation::generate();
        let now = Utc::now();
        let mut conn = self.db.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                if !is_group {
                    let creator_convs: Vec<String> = memberships(creator).load(conn).await?;
                    let shared: Vec<String> = memberships(others[0])
                        .filter(conversation_participants::conversation_id.eq_any(&creator_convs))
                        .load(conn)
                        .await?;
                    if !shared.is_empty() {
                        let existing: Option<String> =
                            direct_among(&shared).first(conn).await.optional()?;
                        if existing.is_some() {
                            return Err(direct_exists());
                        }
                    }
                }

                let conversation: Conversation = diesel::insert_into(conversations::table)
                    .values(NewConversation {
                        id: &id,
                        title,
                        is_group,
                        created_by: creator,
                        created_at: now,
                    })
                    .returning(Conversation::as_returning())
                    .get_result(conn)
                    .await?;

                let members: Vec<NewParticipant> = std::iter::once(creator)
                    .chain(others.iter().copied())
                    .map(|user_id| NewParticipant {
                        conversation_id: &id,
                        user_id,
                        joined_at: now,
                    })
                    .collect();
                diesel::insert_into(conversation_participants::table)
                    .values(&members)
                    .execute(conn)
                    .await?;

                Ok(conversation)
            }
            .scope_boxed()
        })
        .await
    }

    async fn search_users(&self, query: &str, limit: i64) -> Result<Vec<UserSummary>, StoreError> {
        let mut conn = self.db.get().await?;
        let found = users::table
            .filter(users::display_name.ilike(contains_pattern(query)))
            .order((users::display_name.asc(), users::id.asc()))
            .limit(limit)
            .select(UserSummary::as_select())
            .load(&mut conn)
            .await?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_lookup_is_two_flat_queries() {
        let sql = diesel::debug_query::<Pg, _>(&memberships("usr_1")).to_string();
        assert!(sql.contains(r#"FROM "conversation_participants""#), "{sql}");
        assert!(sql.contains(r#""conversation_participants"."user_id" = $1"#), "{sql}");
        assert!(!sql.contains("JOIN"), "{sql}");

        let creator_convs = vec!["conv_a".to_string(), "conv_b".to_string()];
        let narrowed = memberships("usr_2")
            .filter(conversation_participants::conversation_id.eq_any(&creator_convs));
        let sql = diesel::debug_query::<Pg, _>(&narrowed).to_string();
        assert!(sql.contains(r#""conversation_participants"."conversation_id""#), "{sql}");
        assert!(sql.contains("usr_2"), "{sql}");

        let shared = vec!["conv_a".to_string()];
        let sql = diesel::debug_query::<Pg, _>(&direct_among(&shared)).to_string();
        assert!(sql.contains(r#"FROM "conversations""#), "{sql}");
        assert!(sql.contains(r#""conversations"."is_group" = $1"#), "{sql}");
        assert!(!sql.contains("conversation_participants"), "{sql}");
    }

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("ada"), "%ada%");
        assert_eq!(contains_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }
}
