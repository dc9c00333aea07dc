//! Repository Backend Trait
//!
//! One method per backend endpoint. Implementations handle transport details;
//! callers only see typed models and [`ClientError`].

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::ClientResult;
use crate::models::{
    ChatRequest, ChatResponse, IngestRequest, IngestResponse, RepositoryRecord,
};
use crate::streaming::EventStream;

/// Raw chat response body, delivered in network-sized chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = ClientResult<Bytes>> + Send>>;

/// Repository backend trait
///
/// Implement this to point the client at a different backend.
#[async_trait]
pub trait RepoBackend: Send + Sync {
    /// Backend name for logs (e.g., "HTTP", "Mock")
    fn name(&self) -> &str;

    /// Start an ingestion job
    async fn ingest(&self, request: &IngestRequest) -> ClientResult<IngestResponse>;

    /// Fetch the current record of one job (idempotent, safe to poll)
    async fn repository_status(&self, repo_id: &str) -> ClientResult<RepositoryRecord>;

    /// Fetch every known repository
    async fn list_repositories(&self) -> ClientResult<Vec<RepositoryRecord>>;

    /// Delete a repository; deleting one that is already gone succeeds
    async fn delete_repository(&self, repo_id: &str) -> ClientResult<()>;

    /// Open a streaming chat response and return its raw body
    ///
    /// Errors here mean the request failed before any body byte arrived.
    async fn chat_stream(&self, request: &ChatRequest) -> ClientResult<ByteStream>;

    /// Non-streaming chat fallback
    async fn chat_query(&self, request: &ChatRequest) -> ClientResult<ChatResponse>;

    /// Open a streaming chat response as decoded protocol events
    async fn open_event_stream(&self, request: &ChatRequest) -> ClientResult<EventStream> {
        let body = self.chat_stream(request).await?;
        Ok(EventStream::new(body))
    }
}
