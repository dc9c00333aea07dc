//! Repository List Synchronizer
//!
//! Keeps a local copy of every known repository, refreshed wholesale on a
//! fixed interval and sorted newest first. Entries only disappear locally
//! after the backend has confirmed their deletion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::ClientContext;
use crate::error::ClientResult;
use crate::messages::ClientMessage;
use crate::models::RepositoryRecord;

/// Local repository list, newest first
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepositoryList {
    repositories: Vec<RepositoryRecord>,
}

impl RepositoryList {
    /// Empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry with a freshly fetched set
    ///
    /// Sorted by `created_at` descending; a repeated `repo_id` keeps its first
    /// occurrence in backend order.
    pub fn replace_all(&mut self, mut repositories: Vec<RepositoryRecord>) {
        let mut seen = std::collections::HashSet::new();
        repositories.retain(|r| seen.insert(r.repo_id.clone()));
        repositories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.repositories = repositories;
    }

    /// Remove one entry; returns whether it was present
    pub fn remove(&mut self, repo_id: &str) -> bool {
        let before = self.repositories.len();
        self.repositories.retain(|r| r.repo_id != repo_id);
        self.repositories.len() != before
    }

    /// Look up one entry
    #[must_use]
    pub fn get(&self, repo_id: &str) -> Option<&RepositoryRecord> {
        self.repositories.iter().find(|r| r.repo_id == repo_id)
    }

    /// All entries, newest first
    #[must_use]
    pub fn repositories(&self) -> &[RepositoryRecord] {
        &self.repositories
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

/// Keeps a [`RepositoryList`] in sync with the backend
///
/// Clones share the same list.
#[derive(Clone)]
pub struct RepositoryListSync {
    ctx: ClientContext,
    list_tx: Arc<watch::Sender<RepositoryList>>,
}

impl RepositoryListSync {
    /// Create an empty synchronizer
    #[must_use]
    pub fn new(ctx: ClientContext) -> Self {
        let (list_tx, _) = watch::channel(RepositoryList::new());
        Self {
            ctx,
            list_tx: Arc::new(list_tx),
        }
    }

    /// Receive every list replacement
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RepositoryList> {
        self.list_tx.subscribe()
    }

    /// Current list
    #[must_use]
    pub fn snapshot(&self) -> RepositoryList {
        self.list_tx.borrow().clone()
    }

    /// Fetch the full list and replace the local one
    ///
    /// # Errors
    ///
    /// Returns the backend error; the local list is left unchanged.
    pub async fn refresh(&self) -> ClientResult<usize> {
        let repositories = match self.ctx.backend().list_repositories().await {
            Ok(repositories) => repositories,
            Err(e) => {
                tracing::warn!(error = %e, "Repository list fetch failed; keeping current list");
                return Err(e);
            }
        };

        let mut list = RepositoryList::new();
        list.replace_all(repositories);
        let count = list.len();
        self.list_tx.send_replace(list);

        tracing::debug!(count, "Repository list refreshed");
        self.ctx.try_notify(ClientMessage::RepositoryListUpdated { count });
        Ok(count)
    }

    /// Delete a repository on the backend, then locally
    ///
    /// If the deleted repository is the one being viewed, the view returns to
    /// the dashboard.
    ///
    /// # Errors
    ///
    /// Returns the backend error; nothing local changes.
    pub async fn delete(&self, repo_id: &str) -> ClientResult<()> {
        self.ctx.backend().delete_repository(repo_id).await?;

        let mut removed = false;
        self.list_tx.send_if_modified(|list| {
            removed = list.remove(repo_id);
            removed
        });

        tracing::info!(repo_id, removed, "Repository deleted");
        self.ctx
            .notify(ClientMessage::RepositoryDeleted {
                repo_id: repo_id.to_string(),
            })
            .await;
        self.ctx.leave_repository(repo_id).await;
        Ok(())
    }

    /// Spawn the refresh timer; the first refresh happens immediately
    #[must_use]
    pub fn start(&self) -> ListSyncHandle {
        self.start_with_interval(self.ctx.config().list_refresh_interval)
    }

    /// Spawn the refresh timer with an explicit interval
    #[must_use]
    pub fn start_with_interval(&self, period: Duration) -> ListSyncHandle {
        let sync = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // Failures are logged inside and retried next tick
                let _ = sync.refresh().await;
            }
        });

        tracing::info!(
            interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "Started repository list refresh"
        );
        ListSyncHandle { task: Some(task) }
    }
}

impl std::fmt::Debug for RepositoryListSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryListSync")
            .field("repositories", &self.list_tx.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Handle to a running list refresh timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct ListSyncHandle {
    task: Option<JoinHandle<()>>,
}

impl ListSyncHandle {
    /// Whether the timer is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the timer
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!("Cancelling repository list refresh");
            task.abort();
        }
    }
}

impl Drop for ListSyncHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
