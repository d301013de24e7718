//! In-memory store for tests and DB-less runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chat_common::PrefixedId;
use chrono::Utc;
use parking_lot::Mutex;

use crate::models::conversation::Conversation;
use crate::models::message::{Message, MessageRow};
use crate::models::user::UserSummary;

use super::{direct_exists, invalid_direct, other_participants, ConversationStore, StoreError};

#[derive(Default)]
struct MemoryData {
    profiles: HashMap<String, (Option<String>, Option<String>)>,
    conversations: Vec<Conversation>,
    participants: HashSet<(String, String)>,
    messages: Vec<MessageRow>,
}

impl MemoryData {
    fn message(&self, row: &MessageRow) -> Message {
        let (name, avatar) = self.profiles.get(&row.author_id).cloned().unwrap_or_default();
        Message::from_row(row.clone(), name, avatar)
    }

    fn is_participant(&self, conversation_id: &str, user_id: &str) -> bool {
        self.participants
            .contains(&(conversation_id.to_string(), user_id.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn add_participant(&self, conversation_id: &str, user_id: &str) {
        self.data
            .lock()
            .participants
            .insert((conversation_id.to_string(), user_id.to_string()));
    }

    pub fn set_profile(&self, user_id: &str, display_name: Option<&str>, avatar_url: Option<&str>) {
        self.data.lock().profiles.insert(
            user_id.to_string(),
            (display_name.map(str::to_string), avatar_url.map(str::to_string)),
        );
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.data.lock().is_participant(conversation_id, user_id))
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<Message, StoreError> {
        self.check_available()?;
        let row = MessageRow {
            id: Message::generate(),
            conversation_id: conversation_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        let mut data = self.data.lock();
        let message = data.message(&row);
        data.messages.push(row);
        Ok(message)
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        self.check_available()?;
        let data = self.data.lock();
        let matching: Vec<&MessageRow> = data
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        let skip = matching.len().saturating_sub(limit.max(0) as usize);
        Ok(matching[skip..].iter().map(|row| data.message(row)).collect())
    }

    async fn conversations_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.check_available()?;
        let data = self.data.lock();
        Ok(data
            .conversations
            .iter()
            .rev()
            .filter(|c| data.is_participant(&c.id, user_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_conversation(
        &self,
        title: Option<&str>,
        is_group: bool,
        creator: &str,
        participants: &[String],
    ) -> Result<Conversation, StoreError> {
        self.check_available()?;
        let others = other_participants(creator, participants);
        if !is_group && others.len() != 1 {
            return Err(invalid_direct());
        }

        let mut data = self.data.lock();
        if !is_group {
            let exists = data.conversations.iter().any(|c| {
                !c.is_group
                    && data.is_participant(&c.id, creator)
                    && data.is_participant(&c.id, others[0])
            });
            if exists {
                return Err(direct_exists());
            }
        }

        let conversation = Conversation {
            id: Conversation::generate(),
            title: title.map(str::to_string),
            is_group,
            created_by: creator.to_string(),
            created_at: Utc::now(),
        };
        for user_id in std::iter::once(creator).chain(others) {
            data.participants
                .insert((conversation.id.clone(), user_id.to_string()));
        }
        data.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn search_users(&self, query: &str, limit: i64) -> Result<Vec<UserSummary>, StoreError> {
        self.check_available()?;
        let needle = query.to_lowercase();
        let data = self.data.lock();
        let mut found: Vec<UserSummary> = data
            .profiles
            .iter()
            .filter_map(|(id, (name, avatar))| {
                let name = name.as_ref()?;
                name.to_lowercase().contains(&needle).then(|| UserSummary {
                    id: id.clone(),
                    display_name: Some(name.clone()),
                    avatar_url: avatar.clone(),
                })
            })
            .collect();
        found.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }
}

