//! Minimal chat message types for gateway calls.
//!
//! Message roles: System (usually first in the list), User, Assistant.
//! Guardrails rewrite User content only; System content is ours.

/// A single message in a model conversation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ChatMessage {
    /// System prompt; typically placed first in the message list.
    System(String),
    /// User input (the only role subject to PII/injection scrubbing).
    User(String),
    /// Model reply.
    Assistant(String),
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    /// The message text regardless of role.
    pub fn content(&self) -> &str {
        match self {
            ChatMessage::System(s) | ChatMessage::User(s) | ChatMessage::Assistant(s) => s,
        }
    }
}
