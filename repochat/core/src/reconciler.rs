//! Conversation Reconciler
//!
//! Drives one chat turn at a time: records the user's message, opens an empty
//! assistant message, and applies decoded stream events to it in arrival
//! order until the stream ends.
//!
//! # Turn lifecycle
//!
//! ```text
//! send(text)
//!   ├─ refuse: empty text, repository not completed, turn already open
//!   ├─ history snapshot (prior messages only)
//!   ├─ append user message + open assistant message   → TurnOpened
//!   ├─ for each event: content → append, references → replace
//!   └─ end of stream → close                           → TurnClosed
//!      transport error → replace message with error   → TurnFailed
//! ```
//!
//! Dropping a `send` future mid-stream (e.g. on Ctrl-C) closes the open
//! message with whatever content it has and frees the conversation for the
//! next turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::context::ClientContext;
use crate::conversation::{AppliedEvent, Conversation, ConversationMessage};
use crate::error::{ChatError, ClientResult};
use crate::messages::{ClientMessage, MessageId};
use crate::models::{ChatRequest, RepoStatus, RepositoryRecord};
use crate::streaming::ProtocolEvent;

/// How a turn ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    /// The stream ended normally
    Completed,
    /// The request or stream failed; the message holds the configured error text
    Failed(String),
}

/// Summary of one finished turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The assistant message this turn filled
    pub message_id: MessageId,
    /// How it ended
    pub status: TurnStatus,
    /// Events applied to the message
    pub events_applied: u64,
    /// Records skipped because they could not be decoded
    pub malformed_frames: u64,
}

impl TurnOutcome {
    /// Whether the turn ended normally
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

/// Counters accumulated while a turn streams
#[derive(Default)]
struct TurnProgress {
    events_applied: u64,
    malformed_frames: u64,
}

/// Clears the in-flight flag on every exit path, including cancellation
struct TurnGuard {
    in_flight: Arc<AtomicBool>,
    conversation: Arc<Mutex<Conversation>>,
    message_id: Option<MessageId>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if let Some(ref id) = self.message_id {
            let mut conversation = self.conversation.lock();
            if conversation.streaming_message_id() == Some(id) {
                tracing::debug!(message_id = %id, "Turn cancelled; keeping partial answer");
                conversation.complete_streaming();
            }
        }
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Applies chat responses for one repository to its conversation
///
/// Clones share the same conversation and in-flight flag.
#[derive(Clone)]
pub struct ConversationReconciler {
    ctx: ClientContext,
    repo_id: String,
    conversation: Arc<Mutex<Conversation>>,
    in_flight: Arc<AtomicBool>,
    /// Latest known record of the repository (usually from its poller)
    status: watch::Receiver<Option<RepositoryRecord>>,
}

impl ConversationReconciler {
    /// Create a reconciler gated on a live repository status
    pub fn new(
        ctx: ClientContext,
        repo_id: impl Into<String>,
        status: watch::Receiver<Option<RepositoryRecord>>,
    ) -> Self {
        Self {
            ctx,
            repo_id: repo_id.into(),
            conversation: Arc::new(Mutex::new(Conversation::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
            status,
        }
    }

    /// Create a reconciler from a record fetched once
    #[must_use]
    pub fn with_record(ctx: ClientContext, record: RepositoryRecord) -> Self {
        let repo_id = record.repo_id.clone();
        let (_tx, rx) = watch::channel(Some(record));
        Self::new(ctx, repo_id, rx)
    }

    /// Repository this conversation is about
    #[must_use]
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Snapshot of the message history
    #[must_use]
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.conversation.lock().messages().to_vec()
    }

    /// Whether a turn is open
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Send a message and stream the answer into the conversation
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError`] when the send is refused. Refused sends leave the
    /// conversation untouched. Backend failures are not errors here: they end
    /// the turn with [`TurnStatus::Failed`].
    pub async fn send(&self, text: &str) -> Result<TurnOutcome, ChatError> {
        let (mut guard, request, message_id) = self.begin_turn(text).await?;
        let mut progress = TurnProgress::default();

        let result = self.stream_turn(&request, &message_id, &mut progress).await;
        let outcome = self.finish_turn(message_id, result, progress).await;

        guard.message_id = None;
        drop(guard);
        Ok(outcome)
    }

    /// Send a message and wait for the complete answer (non-streaming)
    ///
    /// # Errors
    ///
    /// Same refusals as [`ConversationReconciler::send`].
    pub async fn query(&self, text: &str) -> Result<TurnOutcome, ChatError> {
        let (mut guard, request, message_id) = self.begin_turn(text).await?;
        let mut progress = TurnProgress::default();

        let result = match self.ctx.backend().chat_query(&request).await {
            Ok(response) => {
                let events = [
                    ProtocolEvent::References(response.code_references),
                    ProtocolEvent::Content(response.message),
                ];
                for event in events {
                    self.apply(&message_id, event, &mut progress).await;
                }
                Ok(())
            }
            Err(e) => Err(e),
        };
        let outcome = self.finish_turn(message_id, result, progress).await;

        guard.message_id = None;
        drop(guard);
        Ok(outcome)
    }

    /// Check the guards and open the turn
    async fn begin_turn(
        &self,
        text: &str,
    ) -> Result<(TurnGuard, ChatRequest, MessageId), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let status = self.status.borrow().as_ref().map(|record| record.status);
        if status != Some(RepoStatus::Completed) {
            return Err(ChatError::RepositoryNotReady { status });
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(repo_id = %self.repo_id, "Refusing send while a turn is open");
            return Err(ChatError::TurnInFlight);
        }

        let mut guard = TurnGuard {
            in_flight: Arc::clone(&self.in_flight),
            conversation: Arc::clone(&self.conversation),
            message_id: None,
        };

        let (request, user_message_id, message_id) = {
            let mut conversation = self.conversation.lock();
            // Snapshot before appending: history never contains the new message
            let conversation_history = conversation.wire_history();
            let user_message_id = conversation.add_user_message(text);
            let message_id = conversation.start_assistant_response();
            (
                ChatRequest {
                    repo_id: self.repo_id.clone(),
                    message: text.to_string(),
                    conversation_history,
                },
                user_message_id,
                message_id,
            )
        };
        guard.message_id = Some(message_id.clone());

        tracing::info!(
            repo_id = %self.repo_id,
            message_id = %message_id,
            history_len = request.conversation_history.len(),
            "Opened chat turn"
        );
        self.ctx
            .notify(ClientMessage::TurnOpened {
                user_message_id,
                message_id: message_id.clone(),
            })
            .await;

        Ok((guard, request, message_id))
    }

    async fn stream_turn(
        &self,
        request: &ChatRequest,
        message_id: &MessageId,
        progress: &mut TurnProgress,
    ) -> ClientResult<()> {
        let mut events = self.ctx.backend().open_event_stream(request).await?;

        while let Some(item) = events.next().await {
            progress.malformed_frames = events.stats().malformed_frames;
            match item {
                Ok(event) => self.apply(message_id, event, progress).await,
                Err(e) => return Err(e),
            }
        }

        progress.malformed_frames = events.stats().malformed_frames;
        if !events.stats().saw_done {
            tracing::debug!(message_id = %message_id, "Stream ended without [DONE]");
        }
        Ok(())
    }

    /// Apply one event to the open message and tell the view layer
    async fn apply(
        &self,
        message_id: &MessageId,
        event: ProtocolEvent,
        progress: &mut TurnProgress,
    ) {
        let delta = match event {
            ProtocolEvent::Content(ref delta) => Some(delta.clone()),
            ProtocolEvent::References(_) => None,
        };

        let applied = self.conversation.lock().apply_event(event);

        let message = match (applied, delta) {
            (Some(AppliedEvent::Appended { content_len }), Some(delta)) => {
                ClientMessage::ContentAppended {
                    message_id: message_id.clone(),
                    delta,
                    content_len,
                }
            }
            (Some(AppliedEvent::ReferencesReplaced { count }), _) => {
                ClientMessage::ReferencesReplaced {
                    message_id: message_id.clone(),
                    count,
                }
            }
            _ => {
                tracing::debug!(message_id = %message_id, "Event arrived with no open turn");
                return;
            }
        };

        progress.events_applied += 1;
        self.ctx.notify(message).await;
    }

    async fn finish_turn(
        &self,
        message_id: MessageId,
        result: ClientResult<()>,
        progress: TurnProgress,
    ) -> TurnOutcome {
        let status = match result {
            Ok(()) => {
                self.conversation.lock().complete_streaming();
                tracing::info!(
                    message_id = %message_id,
                    events = progress.events_applied,
                    malformed = progress.malformed_frames,
                    "Chat turn completed"
                );
                self.ctx
                    .notify(ClientMessage::TurnClosed {
                        message_id: message_id.clone(),
                    })
                    .await;
                TurnStatus::Completed
            }
            Err(e) => {
                let error = e.to_string();
                self.conversation
                    .lock()
                    .fail_streaming(&self.ctx.config().error_message);
                tracing::warn!(
                    message_id = %message_id,
                    error = %error,
                    events = progress.events_applied,
                    "Chat turn failed"
                );
                self.ctx
                    .notify(ClientMessage::TurnFailed {
                        message_id: message_id.clone(),
                        error: error.clone(),
                    })
                    .await;
                TurnStatus::Failed(error)
            }
        };

        TurnOutcome {
            message_id,
            status,
            events_applied: progress.events_applied,
            malformed_frames: progress.malformed_frames,
        }
    }
}

impl std::fmt::Debug for ConversationReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationReconciler")
            .field("repo_id", &self.repo_id)
            .field("messages", &self.conversation.lock().len())
            .field("in_flight", &self.is_sending())
            .finish_non_exhaustive()
    }
}
