//! Conversation State
//!
//! Ordered message history for one repository chat. At most one assistant
//! message is open (streaming) at a time, and it is always the last message.
//! Events are applied to that open message only; once it is closed it never
//! changes again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::MessageId;
use crate::models::{ChatMessage, CodeReference, MessageRole};
use crate::streaming::ProtocolEvent;

/// A message in the conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Code references (assistant messages only)
    pub code_references: Vec<CodeReference>,
    /// When the message was created
    pub created_at: DateTime<Utc>,
    /// Whether the message is still being streamed
    pub streaming: bool,
    /// Whether the turn ended in an error
    pub failed: bool,
}

impl ConversationMessage {
    /// Create a complete message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            code_references: Vec::new(),
            created_at: Utc::now(),
            streaming: false,
            failed: false,
        }
    }

    /// Create an empty streaming assistant message
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::new(MessageRole::Assistant, String::new())
        }
    }

    /// Wire form sent as conversation history
    #[must_use]
    pub fn to_wire(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            code_references: self.code_references.clone(),
        }
    }
}

/// Effect of one event on the open turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppliedEvent {
    /// Content grew by a delta
    Appended {
        /// Content length after the append, in bytes
        content_len: usize,
    },
    /// References were replaced wholesale
    ReferencesReplaced {
        /// Number of references now attached
        count: usize,
    },
}

/// Message history of one conversation
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
    /// ID of the open assistant message
    streaming_id: Option<MessageId>,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user message
    pub fn add_user_message(&mut self, content: impl Into<String>) -> MessageId {
        let msg = ConversationMessage::new(MessageRole::User, content);
        let id = msg.id.clone();
        self.messages.push(msg);
        id
    }

    /// Add a complete assistant message (non-streaming answers)
    pub fn add_assistant_message(
        &mut self,
        content: impl Into<String>,
        code_references: Vec<CodeReference>,
    ) -> MessageId {
        let mut msg = ConversationMessage::new(MessageRole::Assistant, content);
        msg.code_references = code_references;
        let id = msg.id.clone();
        self.messages.push(msg);
        id
    }

    /// Open an empty assistant message for streaming
    ///
    /// An already open message is closed first.
    pub fn start_assistant_response(&mut self) -> MessageId {
        if self.streaming_id.is_some() {
            tracing::warn!("Opening a new turn while another is streaming; closing the old one");
            self.complete_streaming();
        }

        let msg = ConversationMessage::streaming();
        let id = msg.id.clone();
        self.streaming_id = Some(id.clone());
        self.messages.push(msg);
        id
    }

    fn streaming_message_mut(&mut self) -> Option<&mut ConversationMessage> {
        let id = self.streaming_id.as_ref()?;
        self.messages.iter_mut().rev().find(|m| &m.id == id)
    }

    /// Append to the open message
    pub fn append_streaming(&mut self, text: &str) -> Option<&ConversationMessage> {
        let msg = self.streaming_message_mut()?;
        msg.content.push_str(text);
        Some(msg)
    }

    /// Replace the open message's references
    pub fn replace_references(
        &mut self,
        references: Vec<CodeReference>,
    ) -> Option<&ConversationMessage> {
        let msg = self.streaming_message_mut()?;
        msg.code_references = references;
        Some(msg)
    }

    /// Apply one decoded event to the open message
    ///
    /// Returns `None` (and changes nothing) when no message is open.
    pub fn apply_event(&mut self, event: ProtocolEvent) -> Option<AppliedEvent> {
        match event {
            ProtocolEvent::Content(delta) => self
                .append_streaming(&delta)
                .map(|msg| AppliedEvent::Appended {
                    content_len: msg.content.len(),
                }),
            ProtocolEvent::References(references) => {
                self.replace_references(references)
                    .map(|msg| AppliedEvent::ReferencesReplaced {
                        count: msg.code_references.len(),
                    })
            }
        }
    }

    /// Close the open message, keeping its content
    pub fn complete_streaming(&mut self) -> Option<&ConversationMessage> {
        let id = self.streaming_id.take()?;
        let msg = self.messages.iter_mut().rev().find(|m| m.id == id)?;
        msg.streaming = false;
        Some(msg)
    }

    /// Close the open message as failed, replacing it with `error_message`
    ///
    /// Content and references received so far are both dropped.
    pub fn fail_streaming(&mut self, error_message: &str) -> Option<&ConversationMessage> {
        let id = self.streaming_id.take()?;
        let msg = self.messages.iter_mut().rev().find(|m| m.id == id)?;

        if !msg.content.is_empty() || !msg.code_references.is_empty() {
            tracing::warn!(
                message_id = %msg.id,
                discarded_len = msg.content.len(),
                discarded_references = msg.code_references.len(),
                "Replacing partial answer with error message"
            );
        }
        msg.content = error_message.to_string();
        msg.code_references.clear();
        msg.streaming = false;
        msg.failed = true;
        Some(msg)
    }

    /// ID of the open message
    #[must_use]
    pub fn streaming_message_id(&self) -> Option<&MessageId> {
        self.streaming_id.as_ref()
    }

    /// Whether a message is open
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming_id.is_some()
    }

    /// Get message by ID
    #[must_use]
    pub fn get_message(&self, id: &MessageId) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether there are no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Closed messages in wire form, oldest first
    #[must_use]
    pub fn wire_history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !m.streaming)
            .map(ConversationMessage::to_wire)
            .collect()
    }
}
