use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Title given to every conversation until its first user message arrives
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum number of characters kept when deriving a title from a prompt
pub const TITLE_MAX_CHARS: usize = 30;

/// Role in conversation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Individual message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One persisted chat thread.
///
/// The id is the key of the stored document rather than a field of the
/// serialized value, so the JSON body only carries the title, the messages
/// and a modification timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Empty conversation carrying the placeholder title
    pub fn new() -> Self {
        Self {
            title: default_title(),
            messages: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Generate a fresh conversation id
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// Retitle from `message` if nothing has been appended yet.
    ///
    /// Must run before the message itself is pushed; afterwards the
    /// conversation is non-empty and further calls are no-ops.
    pub fn rename_if_first_message(&mut self, message: &str) -> bool {
        if !self.messages.is_empty() {
            return false;
        }
        self.title = derive_title(message);
        self.updated_at = Utc::now();
        true
    }

    /// Append a message (messages are never removed individually)
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Title for a conversation whose first prompt is `message`
pub fn derive_title(message: &str) -> String {
    let mut chars = message.chars();
    let prefix: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompt_becomes_title_verbatim() {
        assert_eq!(derive_title("Hello there"), "Hello there");
    }

    #[test]
    fn exactly_thirty_chars_is_not_truncated() {
        let prompt = "a".repeat(30);
        assert_eq!(derive_title(&prompt), prompt);
    }

    #[test]
    fn long_prompt_is_truncated_with_ellipsis() {
        let prompt = "abcdefghij".repeat(4);
        assert_eq!(prompt.chars().count(), 40);
        assert_eq!(derive_title(&prompt), format!("{}...", &prompt[..30]));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let prompt = "é".repeat(31);
        let title = derive_title(&prompt);
        assert_eq!(title, format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn rename_only_applies_to_empty_conversation() {
        let mut conversation = Conversation::new();
        assert!(conversation.has_default_title());

        assert!(conversation.rename_if_first_message("First question"));
        conversation.push(Message::user("First question"));
        assert_eq!(conversation.title, "First question");

        assert!(!conversation.rename_if_first_message("Second question"));
        assert_eq!(conversation.title, "First question");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let conversation: Conversation = serde_json::from_str(r#"{"messages": []}"#).unwrap();
        assert_eq!(conversation.title, DEFAULT_TITLE);
        assert!(conversation.is_empty());
    }
}
