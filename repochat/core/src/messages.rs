//! Client Messages
//!
//! Updates sent from the core to whatever renders it. A view layer never reads
//! protocol state directly: it listens on the notification channel given to
//! [`crate::ClientContext::with_notifier`] and redraws from these messages.

use serde::{Deserialize, Serialize};

use crate::context::CurrentView;
use crate::models::{RepoStatus, RepositoryRecord};

/// Client-side identifier of a conversation message
///
/// Never sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages from the core to a view layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientMessage {
    // ============================================
    // Conversation
    // ============================================
    /// A user message was recorded and an empty assistant turn opened
    TurnOpened {
        /// The user's message
        user_message_id: MessageId,
        /// The assistant turn being filled
        message_id: MessageId,
    },

    /// A content delta was appended to the open turn
    ContentAppended {
        /// Turn that grew
        message_id: MessageId,
        /// The delta itself
        delta: String,
        /// Total content length after the append, in bytes
        content_len: usize,
    },

    /// The open turn's references were replaced
    ReferencesReplaced {
        /// Turn that changed
        message_id: MessageId,
        /// Number of references now attached
        count: usize,
    },

    /// The open turn finished normally
    TurnClosed {
        /// Turn that finished
        message_id: MessageId,
    },

    /// The open turn failed and now holds the error message
    TurnFailed {
        /// Turn that failed
        message_id: MessageId,
        /// What went wrong
        error: String,
    },

    // ============================================
    // Repository lifecycle
    // ============================================
    /// A fresh record was fetched for a watched repository
    RepositoryUpdated {
        /// The full record as returned by the backend
        record: RepositoryRecord,
    },

    /// Polling for a repository stopped at a terminal status
    PollingStopped {
        /// Repository that stopped
        repo_id: String,
        /// The terminal status
        status: RepoStatus,
    },

    // ============================================
    // Repository list
    // ============================================
    /// The repository list was replaced
    RepositoryListUpdated {
        /// Number of repositories now listed
        count: usize,
    },

    /// A repository was deleted
    RepositoryDeleted {
        /// The deleted repository
        repo_id: String,
    },

    /// The current view changed
    ViewChanged {
        /// The new view
        view: CurrentView,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("msg_"));
    }
}
