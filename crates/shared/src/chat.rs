//! Conversation types shared by the thread store and the backend adapters.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::now_millis;

/// Title given to threads created without one
pub const DEFAULT_THREAD_TITLE: &str = "New Chat";

/// Titles derived from the first user message keep this many characters
pub const TITLE_MAX_CHARS: usize = 30;

/// How long a share link is advertised as valid
pub const SHARE_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// `{prefix}-{32 hex}`
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message, owned by its thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Markdown text, may contain fenced code blocks
    pub content: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id("msg"),
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub last_updated: i64,
    #[serde(default)]
    pub is_bookmarked: bool,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

impl ChatThread {
    /// Empty thread; `None` or a blank title falls back to the default
    pub fn new(title: Option<&str>) -> Self {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_THREAD_TITLE);
        Self {
            id: new_id("thread"),
            title: title.to_string(),
            messages: Vec::new(),
            last_updated: now_millis(),
            is_bookmarked: false,
            is_shared: false,
            share_url: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = now_millis();
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    pub fn message_index(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    /// Append a message. The first user message names a thread that still
    /// carries the default title; the title is never recomputed afterwards.
    pub fn push_message(&mut self, message: Message) {
        if message.role == Role::User
            && !self.has_user_message()
            && self.title == DEFAULT_THREAD_TITLE
        {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        self.touch();
    }

    pub fn apply_update(&mut self, update: ThreadUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(messages) = update.messages {
            self.messages = messages;
        }
        if let Some(bookmarked) = update.is_bookmarked {
            self.is_bookmarked = bookmarked;
        }
        if let Some(shared) = update.is_shared {
            self.is_shared = shared;
        }
        if let Some(url) = update.share_url {
            self.share_url = Some(url);
        }
        self.touch();
    }
}

/// Title from message text: first 30 characters, plus "..." when cut
pub fn derive_title(content: &str) -> String {
    if content.chars().count() > TITLE_MAX_CHARS {
        let head: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

/// Partial update for a thread; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadUpdate {
    pub title: Option<String>,
    pub messages: Option<Vec<Message>>,
    pub is_bookmarked: Option<bool>,
    pub is_shared: Option<bool>,
    pub share_url: Option<String>,
}

/// Public share link for a thread. Expiry is advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadShare {
    pub thread_id: String,
    pub share_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub url: String,
}

impl ThreadShare {
    /// Build a share record with a fresh 7-character share id
    pub fn generate(thread_id: &str, base_url: &str) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        let share_id = format!("share-{}", &token[..7]);
        let created_at = now_millis();
        Self {
            thread_id: thread_id.to_string(),
            url: format!("{}/{}", base_url.trim_end_matches('/'), share_id),
            share_id,
            created_at,
            expires_at: created_at + SHARE_TTL_MS,
        }
    }
}
