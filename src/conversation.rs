use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of the transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Ordered, append-only transcript owned by a single session. Seeded once
/// with the system prompt (and optionally a canned greeting); grows with one
/// user and one assistant message per successful turn; discarded when the
/// session ends.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the transcript. Idempotent: calling again on an initialized
    /// conversation is a no-op.
    pub fn initialize(&mut self, system_prompt: &str, greeting: Option<&str>) {
        if self.is_initialized() {
            return;
        }
        self.messages.push(Message {
            role: Role::System,
            content: system_prompt.to_string(),
        });
        if let Some(greeting) = greeting {
            self.messages.push(Message {
                role: Role::Assistant,
                content: greeting.to_string(),
            });
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn append_user(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            bail!("cannot append an empty user message");
        }
        self.messages.push(Message {
            role: Role::User,
            content: text.to_string(),
        });
        Ok(())
    }

    pub fn append_assistant(&mut self, text: &str) {
        self.messages.push(Message {
            role: Role::Assistant,
            content: text.to_string(),
        });
    }

    /// The full ordered sequence, system message included, for replay to the
    /// completion endpoint.
    pub fn as_replay_list(&self) -> &[Message] {
        &self.messages
    }

    /// The transcript as shown to the user: everything except the leading
    /// system message.
    pub fn ui_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    /// Content of the most recent user message, if any.
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
