//! Broker channel naming: `<category>:conversation:<room-id>`.

use std::fmt;

/// Event categories, each with its own channel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Persisted chat messages.
    Messages,
    /// Typing, read receipts, conversation lifecycle.
    Events,
    /// Presence deltas.
    Presence,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Messages, Category::Events, Category::Presence];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Messages => "messages",
            Category::Events => "events",
            Category::Presence => "presence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Channel for this category and room.
    pub fn channel(self, room: &str) -> String {
        format!("{}:conversation:{}", self.as_str(), room)
    }

    /// Glob pattern matching every room's channel in this category.
    pub fn pattern(self) -> String {
        format!("{}:conversation:*", self.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a channel name into its category and room id.
///
/// Returns `None` for unknown categories, a missing `conversation` segment, or
/// an empty room id.
pub fn parse_channel(name: &str) -> Option<(Category, &str)> {
    let (category, rest) = name.split_once(':')?;
    let room = rest.strip_prefix("conversation:")?;
    if room.is_empty() {
        return None;
    }
    Some((Category::parse(category)?, room))
}
