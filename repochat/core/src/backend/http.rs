//! HTTP Backend Implementation
//!
//! Talks to the repository backend's REST API:
//! - `POST /api/repos/ingest` - Start an ingestion job
//! - `GET /api/repos/status/{id}` - Current record of one job
//! - `GET /api/repos/list` - Every known repository
//! - `DELETE /api/repos/{id}` - Remove a repository
//! - `POST /api/chat/stream` - Streaming answer (`data:` framed)
//! - `POST /api/chat/query` - Complete answer in one body

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{ByteStream, RepoBackend};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    ChatRequest, ChatResponse, IngestRequest, IngestResponse, RepositoryListResponse,
    RepositoryRecord,
};

/// Repository backend over HTTP
#[derive(Clone, Debug)]
pub struct HttpBackend {
    /// Base URL without trailing slash (e.g., `http://localhost:8000`)
    base_url: String,
    /// Per-request timeout for non-streaming calls
    request_timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend with default timeouts
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let defaults = ClientConfig::default();
        Self::build(base_url.into(), defaults.request_timeout, defaults.connect_timeout)
    }

    /// Create from a loaded [`ClientConfig`]
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        Self::build(
            config.base_url.clone(),
            config.request_timeout,
            config.connect_timeout,
        )
    }

    fn build(
        base_url: String,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> ClientResult<Self> {
        // No client-wide timeout: it would also cut off long streaming answers
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
            http_client,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    /// Send and turn any non-2xx status into [`ClientError::Status`]
    async fn send(&self, request: reqwest::RequestBuilder) -> ClientResult<reqwest::Response> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        Ok(response)
    }

    /// Send with the request timeout and decode a JSON body
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<T> {
        let response = self.send(request.timeout(self.request_timeout)).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Repository IDs are interpolated into paths, so they must be one segment
fn check_repo_id(repo_id: &str) -> ClientResult<()> {
    if repo_id.trim().is_empty() {
        return Err(ClientError::InvalidRequest("repository ID is empty".to_string()));
    }
    if repo_id.contains('/') {
        return Err(ClientError::InvalidRequest(format!(
            "repository ID contains '/': {repo_id}"
        )));
    }
    Ok(())
}

#[async_trait]
impl RepoBackend for HttpBackend {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn ingest(&self, request: &IngestRequest) -> ClientResult<IngestResponse> {
        tracing::debug!(repo_url = %request.repo_url, "POST ingest");
        self.send_json(self.http_client.post(self.url("/repos/ingest")).json(request))
            .await
    }

    async fn repository_status(&self, repo_id: &str) -> ClientResult<RepositoryRecord> {
        check_repo_id(repo_id)?;
        self.send_json(
            self.http_client
                .get(self.url(&format!("/repos/status/{repo_id}"))),
        )
        .await
    }

    async fn list_repositories(&self) -> ClientResult<Vec<RepositoryRecord>> {
        let list: RepositoryListResponse = self
            .send_json(self.http_client.get(self.url("/repos/list")))
            .await?;
        Ok(list.repositories)
    }

    async fn delete_repository(&self, repo_id: &str) -> ClientResult<()> {
        check_repo_id(repo_id)?;

        let request = self
            .http_client
            .delete(self.url(&format!("/repos/{repo_id}")))
            .timeout(self.request_timeout);

        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(repo_id, "Repository already gone; treating delete as done");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn chat_stream(&self, request: &ChatRequest) -> ClientResult<ByteStream> {
        check_repo_id(&request.repo_id)?;

        let response = self
            .send(
                self.http_client
                    .post(self.url("/chat/stream"))
                    .header(reqwest::header::ACCEPT, "text/event-stream")
                    .json(request),
            )
            .await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::Stream(e.to_string())));

        Ok(Box::pin(body))
    }

    async fn chat_query(&self, request: &ChatRequest) -> ClientResult<ChatResponse> {
        check_repo_id(&request.repo_id)?;
        self.send_json(self.http_client.post(self.url("/chat/query")).json(request))
            .await
    }
}
