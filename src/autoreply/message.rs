//! Message types shared by the pipeline, the store and the operator surface.

use serde::{Deserialize, Serialize};

/// Who authored a stored conversation turn.
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

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }

    /// Label used when a turn is rendered into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One persisted conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub peer_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

impl StoredMessage {
    /// `"<RoleLabel>: <content>"`.
    pub fn format(&self) -> String {
        format!("{}: {}", self.role.label(), self.content)
    }
}

/// An inbound message delivered through a business connection.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_id: i64,
    pub sender_first_name: String,
    pub chat_id: i64,
    /// Empty when the message did not arrive through a business connection.
    pub connection_id: String,
    pub text: String,
    pub message_id: i64,
    pub is_edited: bool,
}

impl InboundMessage {
    pub fn preview(&self) -> String {
        self.text.chars().take(50).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_through_column_text() {
        assert_eq!(Role::parse(Role::User.as_str()), Role::User);
        assert_eq!(Role::parse(Role::Assistant.as_str()), Role::Assistant);
        // Anything unexpected reads back as a user turn
        assert_eq!(Role::parse("model"), Role::User);
    }

    #[test]
    fn test_format_uses_role_label() {
        let msg = StoredMessage {
            id: 1,
            peer_id: 100,
            role: Role::Assistant,
            content: "on my way".to_string(),
            created_at: "2026-01-01 10:00:00".to_string(),
        };
        assert_eq!(msg.format(), "Assistant: on my way");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let msg = InboundMessage {
            sender_id: 1,
            sender_first_name: "Ali".to_string(),
            chat_id: 1,
            connection_id: String::new(),
            text: "ё".repeat(80),
            message_id: 1,
            is_edited: false,
        };
        assert_eq!(msg.preview().chars().count(), 50);
    }
}
