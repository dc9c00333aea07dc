//! Client Context
//!
//! Everything a component needs (configuration, backend, notification
//! channel, and the current view) in one cheaply cloneable value that is
//! passed explicitly. There is no process-wide client.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::{HttpBackend, RepoBackend};
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::messages::ClientMessage;

/// What the user is currently looking at
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentView {
    /// The landing page with the ingest form
    #[default]
    Dashboard,
    /// One repository's status and chat
    Repository(String),
}

impl CurrentView {
    /// Repository shown by this view, if any
    #[must_use]
    pub fn repo_id(&self) -> Option<&str> {
        match self {
            Self::Dashboard => None,
            Self::Repository(id) => Some(id),
        }
    }
}

/// Shared client context
#[derive(Clone)]
pub struct ClientContext {
    config: Arc<ClientConfig>,
    backend: Arc<dyn RepoBackend>,
    notifier: Option<mpsc::Sender<ClientMessage>>,
    view: Arc<RwLock<CurrentView>>,
}

impl ClientContext {
    /// Create a context around an existing backend
    pub fn new(config: ClientConfig, backend: Arc<dyn RepoBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            notifier: None,
            view: Arc::new(RwLock::new(CurrentView::Dashboard)),
        }
    }

    /// Create a context talking HTTP to `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let backend = HttpBackend::from_config(&config)?;
        tracing::debug!(base_url = %config.base_url, "Created HTTP backend");
        Ok(Self::new(config, Arc::new(backend)))
    }

    /// Send [`ClientMessage`] updates to this channel
    #[must_use]
    pub fn with_notifier(mut self, notifier: mpsc::Sender<ClientMessage>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Resolved configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Backend all requests go through
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn RepoBackend> {
        &self.backend
    }

    /// Deliver an update to the view layer, if one is listening
    pub async fn notify(&self, message: ClientMessage) {
        if let Some(ref tx) = self.notifier {
            if tx.send(message).await.is_err() {
                tracing::debug!("Notification receiver dropped");
            }
        }
    }

    /// Deliver an update without waiting for room in the channel
    ///
    /// Used for updates whose latest value is also published on a `watch`
    /// channel, so a slow view layer drops stale copies instead of stalling
    /// the sender.
    pub fn try_notify(&self, message: ClientMessage) {
        let Some(ref tx) = self.notifier else {
            return;
        };
        match tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::debug!(update = ?dropped, "Notification channel full, update dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Notification receiver dropped");
            }
        }
    }

    /// Current view
    #[must_use]
    pub fn current_view(&self) -> CurrentView {
        self.view.read().clone()
    }

    /// Switch to another view
    pub async fn set_view(&self, view: CurrentView) {
        {
            let mut current = self.view.write();
            if *current == view {
                return;
            }
            *current = view.clone();
        }
        tracing::debug!(?view, "View changed");
        self.notify(ClientMessage::ViewChanged { view }).await;
    }

    /// Leave the view of `repo_id` if it is the one showing
    ///
    /// Returns whether the view changed.
    pub async fn leave_repository(&self, repo_id: &str) -> bool {
        let left = {
            let mut current = self.view.write();
            if current.repo_id() == Some(repo_id) {
                *current = CurrentView::Dashboard;
                true
            } else {
                false
            }
        };

        if left {
            tracing::info!(repo_id, "Viewed repository removed; returning to dashboard");
            self.notify(ClientMessage::ViewChanged {
                view: CurrentView::Dashboard,
            })
            .await;
        }
        left
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("base_url", &self.config.base_url)
            .field("backend", &self.backend.name())
            .field("notifier", &self.notifier.is_some())
            .field("view", &*self.view.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn context() -> ClientContext {
        ClientContext::new(ClientConfig::for_testing(), Arc::new(MockBackend::new()))
    }

    #[tokio::test]
    async fn test_set_view_notifies_on_change() {
        let (tx, mut rx) = mpsc::channel(8);
        let ctx = context().with_notifier(tx);

        ctx.set_view(CurrentView::Repository("r1".to_string())).await;
        ctx.set_view(CurrentView::Repository("r1".to_string())).await;

        assert!(matches!(
            rx.try_recv(),
            Ok(ClientMessage::ViewChanged { view: CurrentView::Repository(_) })
        ));
        // Same view again is not a change
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_try_notify_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let ctx = context().with_notifier(tx);

        ctx.try_notify(ClientMessage::RepositoryListUpdated { count: 1 });
        ctx.try_notify(ClientMessage::RepositoryListUpdated { count: 2 });

        assert!(matches!(
            rx.try_recv(),
            Ok(ClientMessage::RepositoryListUpdated { count: 1 })
        ));
        assert!(rx.try_recv().is_err());

        drop(rx);
        ctx.try_notify(ClientMessage::RepositoryListUpdated { count: 3 });
    }

    #[tokio::test]
    async fn test_leave_repository_only_when_viewed() {
        let ctx = context();
        ctx.set_view(CurrentView::Repository("r1".to_string())).await;

        assert!(!ctx.leave_repository("r2").await);
        assert_eq!(ctx.current_view(), CurrentView::Repository("r1".to_string()));

        assert!(ctx.leave_repository("r1").await);
        assert_eq!(ctx.current_view(), CurrentView::Dashboard);
    }

    #[tokio::test]
    async fn test_notify_without_listener_is_noop() {
        let ctx = context();
        ctx.notify(ClientMessage::RepositoryListUpdated { count: 0 }).await;
    }
}
