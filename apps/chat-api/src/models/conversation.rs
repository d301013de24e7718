use chat_common::id::{prefix, PrefixedId};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::{conversation_participants, conversations};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_group: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl PrefixedId for Conversation {
    const PREFIX: &'static str = prefix::CONVERSATION;
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation<'a> {
    pub id: &'a str,
    pub title: Option<&'a str>,
    pub is_group: bool,
    pub created_by: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversation_participants)]
pub struct NewParticipant<'a> {
    pub conversation_id: &'a str,
    pub user_id: &'a str,
    pub joined_at: DateTime<Utc>,
}
