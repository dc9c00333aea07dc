//! Mock Backend
//!
//! Scripted, in-memory backend for tests. Status replies, list contents, and
//! chat response bodies are queued up front; every call is recorded so tests
//! can assert on what the client actually asked for.
//!
//! # Usage
//!
//! ```ignore
//! use repochat_core::backend::{MockBackend, StreamScript};
//!
//! let backend = MockBackend::new();
//! backend.push_status(record.clone().with_status(RepoStatus::Processing));
//! backend.push_status(record.with_status(RepoStatus::Completed));
//! backend.push_stream(StreamScript::events(&[ProtocolEvent::Content("hi".into())]));
//!
//! // After the test
//! assert_eq!(backend.status_calls("repo-1"), 2);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::traits::{ByteStream, RepoBackend};
use crate::error::{ClientError, ClientResult};
use crate::models::{
    ChatRequest, ChatResponse, IngestRequest, IngestResponse, RepoStatus, RepositoryRecord,
};
use crate::streaming::{ProtocolEvent, DONE_SENTINEL};

// ============================================================================
// Stream scripts
// ============================================================================

/// How one scripted chat response behaves
#[derive(Debug)]
pub enum StreamScript {
    /// Deliver these chunks, then end the body
    Chunks(Vec<Bytes>),
    /// Deliver these chunks, then fail with a transport error
    ChunksThenError(Vec<Bytes>, String),
    /// Fail the request before any body arrives
    RequestError(String),
    /// Deliver these chunks, then never make progress again
    Pending(Vec<Bytes>),
    /// Deliver whatever the test sends, ending when the sender is dropped
    Channel(mpsc::UnboundedReceiver<ClientResult<Bytes>>),
}

impl StreamScript {
    /// One chunk per event, followed by the `[DONE]` record
    ///
    /// An event that fails to encode turns the whole script into a request
    /// error, so the test sees a failed turn instead of a short body.
    #[must_use]
    pub fn events(events: &[ProtocolEvent]) -> Self {
        match events.iter().map(encode_frame).collect::<serde_json::Result<Vec<Bytes>>>() {
            Ok(mut chunks) => {
                chunks.push(Bytes::from(format!("data: {DONE_SENTINEL}\n\n")));
                Self::Chunks(chunks)
            }
            Err(e) => Self::RequestError(format!("Failed to encode scripted event: {e}")),
        }
    }

    /// Body made of raw text chunks
    #[must_use]
    pub fn raw(chunks: &[&str]) -> Self {
        Self::Chunks(chunks.iter().map(|c| Bytes::from(c.to_string())).collect())
    }

    /// A live body plus the handle that feeds it
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<ClientResult<Bytes>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::Channel(rx))
    }

    fn into_body(self) -> ClientResult<ByteStream> {
        let body: ByteStream = match self {
            Self::Chunks(chunks) => {
                Box::pin(stream::iter(chunks.into_iter().map(Ok::<Bytes, ClientError>)))
            }
            Self::ChunksThenError(chunks, message) => Box::pin(
                stream::iter(chunks.into_iter().map(Ok::<Bytes, ClientError>))
                    .chain(stream::once(async move { Err(ClientError::Stream(message)) })),
            ),
            Self::RequestError(message) => {
                return Err(ClientError::Status {
                    status: 500,
                    body: message,
                })
            }
            Self::Pending(chunks) => {
                Box::pin(
                    stream::iter(chunks.into_iter().map(Ok::<Bytes, ClientError>))
                        .chain(stream::pending()),
                )
            }
            Self::Channel(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
        };
        Ok(body)
    }
}

/// Frame one event as a `data:` record
pub fn encode_frame(event: &ProtocolEvent) -> serde_json::Result<Bytes> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

// ============================================================================
// Mock backend
// ============================================================================

/// Queued status reply
#[derive(Clone, Debug)]
enum StatusReply {
    Record(RepositoryRecord),
    Error(String),
}

#[derive(Debug, Default)]
struct MockState {
    /// Per-repository status replies; the last one repeats once the queue drains
    statuses: HashMap<String, VecDeque<StatusReply>>,
    status_calls: HashMap<String, usize>,
    repositories: Vec<RepositoryRecord>,
    list_calls: usize,
    list_failures: usize,
    delete_failures: usize,
    deleted: Vec<String>,
    ingest_requests: Vec<IngestRequest>,
    streams: VecDeque<StreamScript>,
    queries: VecDeque<Result<ChatResponse, String>>,
    chat_requests: Vec<ChatRequest>,
}

/// Scripted backend for tests
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create an empty mock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Queue a status reply for `record.repo_id`
    pub fn push_status(&self, record: RepositoryRecord) {
        self.state
            .lock()
            .statuses
            .entry(record.repo_id.clone())
            .or_default()
            .push_back(StatusReply::Record(record));
    }

    /// Drop any queued replies and answer with `record` from now on
    pub fn set_status(&self, record: RepositoryRecord) {
        let mut state = self.state.lock();
        let queue = state.statuses.entry(record.repo_id.clone()).or_default();
        queue.clear();
        queue.push_back(StatusReply::Record(record));
    }

    /// Queue a failing status reply
    pub fn push_status_error(&self, repo_id: &str, message: impl Into<String>) {
        self.state
            .lock()
            .statuses
            .entry(repo_id.to_string())
            .or_default()
            .push_back(StatusReply::Error(message.into()));
    }

    /// Replace the repository list
    pub fn set_repositories(&self, repositories: Vec<RepositoryRecord>) {
        self.state.lock().repositories = repositories;
    }

    /// Make the next `count` list calls fail
    pub fn fail_next_list(&self, count: usize) {
        self.state.lock().list_failures = count;
    }

    /// Make the next `count` delete calls fail
    pub fn fail_next_delete(&self, count: usize) {
        self.state.lock().delete_failures = count;
    }

    /// Queue the body of the next streaming chat call
    pub fn push_stream(&self, script: StreamScript) {
        self.state.lock().streams.push_back(script);
    }

    /// Queue the result of the next non-streaming chat call
    pub fn push_query(&self, result: Result<ChatResponse, String>) {
        self.state.lock().queries.push_back(result);
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Number of status fetches for one repository
    #[must_use]
    pub fn status_calls(&self, repo_id: &str) -> usize {
        self.state
            .lock()
            .status_calls
            .get(repo_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of list fetches
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Repository IDs deleted so far, in call order
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// Ingest requests received so far
    #[must_use]
    pub fn ingest_requests(&self) -> Vec<IngestRequest> {
        self.state.lock().ingest_requests.clone()
    }

    /// Chat requests (streaming and non-streaming) received so far
    #[must_use]
    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.state.lock().chat_requests.clone()
    }
}

fn backend_error(message: String) -> ClientError {
    ClientError::Status {
        status: 500,
        body: message,
    }
}

#[async_trait]
impl RepoBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn ingest(&self, request: &IngestRequest) -> ClientResult<IngestResponse> {
        let mut state = self.state.lock();
        state.ingest_requests.push(request.clone());

        let repo_id = uuid::Uuid::new_v4().to_string();
        state
            .repositories
            .push(RepositoryRecord::queued(repo_id.clone(), request.repo_url.clone()));

        Ok(IngestResponse {
            repo_id,
            status: RepoStatus::Queued,
            message: None,
        })
    }

    async fn repository_status(&self, repo_id: &str) -> ClientResult<RepositoryRecord> {
        let mut state = self.state.lock();
        *state.status_calls.entry(repo_id.to_string()).or_default() += 1;

        let reply = match state.statuses.get_mut(repo_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            Some(StatusReply::Record(record)) => Ok(record),
            Some(StatusReply::Error(message)) => Err(backend_error(message)),
            None => state
                .repositories
                .iter()
                .find(|r| r.repo_id == repo_id)
                .cloned()
                .ok_or(ClientError::Status {
                    status: 404,
                    body: "Repository not found".to_string(),
                }),
        }
    }

    async fn list_repositories(&self) -> ClientResult<Vec<RepositoryRecord>> {
        let mut state = self.state.lock();
        state.list_calls += 1;

        if state.list_failures > 0 {
            state.list_failures -= 1;
            return Err(backend_error("list unavailable".to_string()));
        }
        Ok(state.repositories.clone())
    }

    async fn delete_repository(&self, repo_id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();

        if state.delete_failures > 0 {
            state.delete_failures -= 1;
            return Err(backend_error("delete failed".to_string()));
        }

        state.repositories.retain(|r| r.repo_id != repo_id);
        state.statuses.remove(repo_id);
        state.deleted.push(repo_id.to_string());
        Ok(())
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ClientResult<ByteStream> {
        let script = {
            let mut state = self.state.lock();
            state.chat_requests.push(request.clone());
            state.streams.pop_front()
        };

        match script {
            Some(script) => script.into_body(),
            None => Err(backend_error("no scripted stream".to_string())),
        }
    }

    async fn chat_query(&self, request: &ChatRequest) -> ClientResult<ChatResponse> {
        let mut state = self.state.lock();
        state.chat_requests.push(request.clone());

        match state.queries.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(backend_error(message)),
            None => Err(backend_error("no scripted query".to_string())),
        }
    }
}
