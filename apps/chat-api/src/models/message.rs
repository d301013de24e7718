use chat_common::id::{prefix, PrefixedId};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::messages;

/// A stored message row.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = messages)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub author_id: &'a str,
    pub body: &'a str,
    pub created_at: DateTime<Utc>,
}

/// A message as returned to clients, with the author's profile attached.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_avatar: Option<String>,
}

impl PrefixedId for Message {
    const PREFIX: &'static str = prefix::MESSAGE;
}

impl Message {
    pub fn from_row(row: MessageRow, author_name: Option<String>, author_avatar: Option<String>) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            author_id: row.author_id,
            body: row.body,
            created_at: row.created_at,
            author_name,
            author_avatar,
        }
    }
}
