//! Repository Ingestion
//!
//! Submits a repository URL for indexing and switches the view to it.

use crate::context::{ClientContext, CurrentView};
use crate::error::{ClientError, ClientResult};
use crate::models::{IngestRequest, IngestResponse};

/// Check that `repo_url` looks like something the backend can clone
///
/// # Errors
///
/// Returns [`ClientError::InvalidRequest`] for an empty URL, a non-http(s)
/// scheme, or a URL without a host.
pub fn validate_repo_url(repo_url: &str) -> ClientResult<()> {
    let url = repo_url.trim();
    if url.is_empty() {
        return Err(ClientError::InvalidRequest(
            "repository URL is empty".to_string(),
        ));
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            ClientError::InvalidRequest(format!("repository URL must be http(s): {url}"))
        })?;

    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() || url.chars().any(char::is_whitespace) {
        return Err(ClientError::InvalidRequest(format!(
            "repository URL is malformed: {url}"
        )));
    }

    Ok(())
}

/// Submit a repository for ingestion
///
/// On success the current view switches to the new repository. Invalid URLs
/// are rejected without a network call.
///
/// # Errors
///
/// Returns [`ClientError::InvalidRequest`] for a bad URL, or the backend error.
pub async fn submit(
    ctx: &ClientContext,
    repo_url: &str,
    branch: Option<&str>,
) -> ClientResult<IngestResponse> {
    validate_repo_url(repo_url)?;

    let request = IngestRequest {
        repo_url: repo_url.trim().to_string(),
        branch: branch
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(ToString::to_string),
    };

    let response = ctx.backend().ingest(&request).await?;
    tracing::info!(
        repo_id = %response.repo_id,
        repo_url = %request.repo_url,
        status = %response.status,
        "Repository submitted for ingestion"
    );

    ctx.set_view(CurrentView::Repository(response.repo_id.clone()))
        .await;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::MockBackend;
    use crate::config::ClientConfig;
    use crate::models::RepoStatus;

    #[test]
    fn test_validate_repo_url() {
        assert!(validate_repo_url("https://github.com/octo/widgets").is_ok());
        assert!(validate_repo_url("http://git.local/widgets.git").is_ok());

        for bad in ["", "   ", "github.com/octo/widgets", "ftp://x/y", "https://", "https://a b/c"] {
            assert!(
                matches!(validate_repo_url(bad), Err(ClientError::InvalidRequest(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_submit_switches_view() {
        let backend = MockBackend::new();
        let ctx = ClientContext::new(ClientConfig::for_testing(), Arc::new(backend.clone()));

        let response = submit(&ctx, " https://github.com/octo/widgets ", Some("main"))
            .await
            .unwrap();

        assert_eq!(response.status, RepoStatus::Queued);
        assert_eq!(ctx.current_view(), CurrentView::Repository(response.repo_id));
        let sent = backend.ingest_requests();
        assert_eq!(sent[0].repo_url, "https://github.com/octo/widgets");
        assert_eq!(sent[0].branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_request() {
        let backend = MockBackend::new();
        let ctx = ClientContext::new(ClientConfig::for_testing(), Arc::new(backend.clone()));

        assert!(submit(&ctx, "not a url", None).await.is_err());
        assert!(backend.ingest_requests().is_empty());
        assert_eq!(ctx.current_view(), CurrentView::Dashboard);
    }
}
