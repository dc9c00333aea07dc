//! Repochat Core - Headless Client for Chatting with Indexed Repositories
//!
//! This crate holds the client-side protocol handling for repochat, completely
//! independent of any presentation layer. A CLI, a TUI, or a test harness can
//! drive it the same way.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         View layer (CLI)                          │
//! │        renders ClientMessage updates, owns no protocol state      │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ ClientMessage (down)
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                         REPOCHAT CORE                             │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌─────────────────┐ │
//! │  │   Reconciler     │  │     Poller       │  │   List Sync     │ │
//! │  │ (conversation)   │  │ (one repository) │  │ (all repos)     │ │
//! │  └────────┬─────────┘  └────────┬─────────┘  └────────┬────────┘ │
//! │           │ EventStream         │                     │          │
//! │  ┌────────┴─────────┐           │                     │          │
//! │  │  FrameDecoder    │           │                     │          │
//! │  └────────┬─────────┘           │                     │          │
//! │           └─────────────────────┴─────────────────────┘          │
//! │                          RepoBackend (HTTP)                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ClientContext`]: Explicit context (config, backend, current view) passed to every component
//! - [`FrameDecoder`] / [`EventStream`]: `data:` framed event stream decoding
//! - [`ConversationReconciler`]: Applies decoded events to the open assistant turn
//! - [`RepositoryPoller`]: Mirrors one ingestion job until it reaches a terminal status
//! - [`RepositoryListSync`]: Keeps the repository list fresh and sorted by recency
//!
//! # Quick Start
//!
//! ```ignore
//! use repochat_core::{ClientConfig, ClientContext, ConversationReconciler, RepositoryPoller};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = ClientContext::from_config(ClientConfig::default())?;
//!
//!     let mut poller = RepositoryPoller::new(ctx.clone(), "repo-id").start();
//!     poller.finished().await;
//!
//!     let chat = ConversationReconciler::new(ctx, "repo-id", poller.subscribe());
//!     let outcome = chat.send("Where is the HTTP server started?").await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod ingest;
pub mod list_sync;
pub mod messages;
pub mod models;
pub mod poller;
pub mod reconciler;
pub mod streaming;

pub use backend::{ByteStream, HttpBackend, MockBackend, RepoBackend, StreamScript};
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
pub use context::{ClientContext, CurrentView};
pub use conversation::{AppliedEvent, Conversation, ConversationMessage};
pub use error::{ChatError, ClientError, ClientResult};
pub use list_sync::{ListSyncHandle, RepositoryList, RepositoryListSync};
pub use messages::{ClientMessage, MessageId};
pub use models::{
    ChatMessage, ChatRequest, ChatResponse, CodeReference, IngestRequest, IngestResponse,
    MessageRole, RepoStatus, RepositoryListResponse, RepositoryRecord,
};
pub use poller::{PollDecision, PollState, PollerHandle, RepositoryPoller};
pub use reconciler::{ConversationReconciler, TurnOutcome, TurnStatus};
pub use streaming::{DecoderStats, EventStream, Frame, FrameDecoder, ProtocolEvent};
