//! Repository Lifecycle Poller
//!
//! Mirrors one ingestion job until it reaches a terminal status.
//!
//! # Protocol
//!
//! 1. Fetch the record immediately on start
//! 2. While the last-known status is `queued` or `processing`, refetch every
//!    `poll_interval`
//! 3. On `completed` or `failed`, stop for good
//!
//! A failed fetch keeps the previous record and is retried on the next tick.
//! The transition table lives in [`PollState`], separate from the timer, so it
//! can be tested without a runtime.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::ClientContext;
use crate::error::ClientResult;
use crate::messages::ClientMessage;
use crate::models::{RepoStatus, RepositoryRecord};

/// What the timer should do after a fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollDecision {
    /// Fetch again on the next tick
    Continue,
    /// A terminal status was observed; never fetch again
    Stop,
}

/// Poll state machine for one repository
#[derive(Clone, Debug, Default)]
pub struct PollState {
    /// Last successfully fetched record
    record: Option<RepositoryRecord>,
    /// First terminal status observed; latched
    stopped_at: Option<RepoStatus>,
    /// Failed fetches since the last success
    consecutive_failures: u32,
}

impl PollState {
    /// Fresh state: nothing fetched, polling
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the result of one fetch
    pub fn apply(&mut self, result: &ClientResult<RepositoryRecord>) -> PollDecision {
        match result {
            Ok(record) => self.apply_record(record.clone()),
            Err(_) => self.record_failure(),
        }
    }

    /// Replace the record wholesale
    ///
    /// A terminal status stops polling permanently; later non-terminal records
    /// are stored but do not resume it.
    pub fn apply_record(&mut self, record: RepositoryRecord) -> PollDecision {
        if self.stopped_at.is_none() && record.is_terminal() {
            self.stopped_at = Some(record.status);
        }
        self.record = Some(record);
        self.consecutive_failures = 0;
        self.decision()
    }

    /// Note a failed fetch; the stored record is left as is
    pub fn record_failure(&mut self) -> PollDecision {
        self.consecutive_failures += 1;
        self.decision()
    }

    /// Whether another fetch should be scheduled
    #[must_use]
    pub fn should_poll(&self) -> bool {
        self.stopped_at.is_none()
    }

    /// Last fetched record
    #[must_use]
    pub fn record(&self) -> Option<&RepositoryRecord> {
        self.record.as_ref()
    }

    /// Terminal status that stopped polling
    #[must_use]
    pub fn terminal_status(&self) -> Option<RepoStatus> {
        self.stopped_at
    }

    /// Failed fetches since the last success
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn decision(&self) -> PollDecision {
        if self.should_poll() {
            PollDecision::Continue
        } else {
            PollDecision::Stop
        }
    }
}

/// State shared between the timer task and its handle
struct Shared {
    ctx: ClientContext,
    repo_id: String,
    state: Mutex<PollState>,
    record_tx: watch::Sender<Option<RepositoryRecord>>,
}

impl Shared {
    /// Fetch once, apply, and publish
    async fn fetch(&self) -> ClientResult<RepositoryRecord> {
        let result = self.ctx.backend().repository_status(&self.repo_id).await;

        let newly_stopped = {
            let mut state = self.state.lock();
            let was_polling = state.should_poll();
            state.apply(&result);
            if was_polling && !state.should_poll() {
                state.terminal_status()
            } else {
                None
            }
        };

        match result {
            Ok(ref record) => {
                tracing::debug!(
                    repo_id = %self.repo_id,
                    status = %record.status,
                    progress = record.progress_fraction(),
                    "Fetched repository status"
                );
                self.record_tx.send_replace(Some(record.clone()));
                self.ctx.try_notify(ClientMessage::RepositoryUpdated {
                    record: record.clone(),
                });
            }
            Err(ref e) => {
                tracing::warn!(
                    repo_id = %self.repo_id,
                    error = %e,
                    failures = self.state.lock().consecutive_failures(),
                    "Status fetch failed; keeping last record"
                );
            }
        }

        if let Some(status) = newly_stopped {
            tracing::info!(repo_id = %self.repo_id, %status, "Repository reached terminal status");
            self.ctx.try_notify(ClientMessage::PollingStopped {
                repo_id: self.repo_id.clone(),
                status,
            });
        }

        result
    }
}

/// Builder for a repository poller
#[derive(Debug)]
pub struct RepositoryPoller {
    ctx: ClientContext,
    repo_id: String,
    interval: Duration,
}

impl RepositoryPoller {
    /// Poll `repo_id` at the configured interval
    pub fn new(ctx: ClientContext, repo_id: impl Into<String>) -> Self {
        let interval = ctx.config().poll_interval;
        Self {
            ctx,
            repo_id: repo_id.into(),
            interval,
        }
    }

    /// Override the poll interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the timer task
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(self) -> PollerHandle {
        let (record_tx, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            ctx: self.ctx,
            repo_id: self.repo_id,
            state: Mutex::new(PollState::new()),
            record_tx,
        });

        tracing::info!(
            repo_id = %shared.repo_id,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Starting repository poller"
        );

        let task = tokio::spawn(run(Arc::clone(&shared), self.interval));
        PollerHandle {
            shared,
            task: Some(task),
        }
    }
}

async fn run(shared: Arc<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // First tick completes immediately
        ticker.tick().await;

        if !shared.state.lock().should_poll() {
            break;
        }
        // Errors are logged inside; the next tick retries
        let _ = shared.fetch().await;
        if !shared.state.lock().should_poll() {
            break;
        }
    }

    tracing::debug!(repo_id = %shared.repo_id, "Repository poller finished");
}

/// Handle to a running poller
///
/// Dropping the handle cancels the timer.
pub struct PollerHandle {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Repository being polled
    #[must_use]
    pub fn repo_id(&self) -> &str {
        &self.shared.repo_id
    }

    /// Receive every newly fetched record
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<RepositoryRecord>> {
        self.shared.record_tx.subscribe()
    }

    /// Last fetched record
    #[must_use]
    pub fn current(&self) -> Option<RepositoryRecord> {
        self.shared.state.lock().record().cloned()
    }

    /// Status of the last fetched record
    #[must_use]
    pub fn status(&self) -> Option<RepoStatus> {
        self.shared.state.lock().record().map(|r| r.status)
    }

    /// Whether the timer is still scheduling fetches
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
            && self.shared.state.lock().should_poll()
    }

    /// Fetch once now, outside the timer
    ///
    /// Replaces the record wholesale. Never restarts polling after a terminal
    /// status.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the stored record is left unchanged.
    pub async fn refresh(&self) -> ClientResult<RepositoryRecord> {
        self.shared.fetch().await
    }

    /// Wait until polling stops and return the terminal status, if any
    ///
    /// Returns immediately when the poller was already cancelled.
    pub async fn finished(&mut self) -> Option<RepoStatus> {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(repo_id = %self.shared.repo_id, error = %e, "Poller task failed");
                }
            }
            self.task = None;
        }
        self.shared.state.lock().terminal_status()
    }

    /// Stop the timer
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tracing::debug!(repo_id = %self.shared.repo_id, "Cancelling repository poller");
            }
            task.abort();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("repo_id", &self.shared.repo_id)
            .field("status", &self.status())
            .field("polling", &self.is_polling())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::ClientConfig;
    use crate::error::ClientError;
    use pretty_assertions::assert_eq;

    fn record(status: RepoStatus) -> RepositoryRecord {
        RepositoryRecord::queued("r1", "https://github.com/octo/widgets").with_status(status)
    }

    fn setup() -> (MockBackend, ClientContext) {
        let backend = MockBackend::new();
        let ctx = ClientContext::new(ClientConfig::for_testing(), Arc::new(backend.clone()));
        (backend, ctx)
    }

    // =========================================================================
    // State machine
    // =========================================================================

    #[test]
    fn test_status_sequence_stops_at_terminal() {
        let mut state = PollState::new();
        let decisions: Vec<PollDecision> = [
            RepoStatus::Queued,
            RepoStatus::Queued,
            RepoStatus::Processing,
            RepoStatus::Completed,
        ]
        .into_iter()
        .map(|s| state.apply_record(record(s)))
        .collect();

        assert_eq!(
            decisions,
            vec![
                PollDecision::Continue,
                PollDecision::Continue,
                PollDecision::Continue,
                PollDecision::Stop,
            ]
        );

        // A later non-terminal record is stored but polling stays stopped
        assert_eq!(state.apply_record(record(RepoStatus::Processing)), PollDecision::Stop);
        assert_eq!(state.record().unwrap().status, RepoStatus::Processing);
        assert_eq!(state.terminal_status(), Some(RepoStatus::Completed));
    }

    #[test]
    fn test_failure_keeps_record() {
        let mut state = PollState::new();
        state.apply_record(record(RepoStatus::Processing));

        let failed: ClientResult<RepositoryRecord> = Err(ClientError::Stream("reset".to_string()));
        assert_eq!(state.apply(&failed), PollDecision::Continue);
        assert_eq!(state.apply(&failed), PollDecision::Continue);

        assert_eq!(state.record().unwrap().status, RepoStatus::Processing);
        assert_eq!(state.consecutive_failures(), 2);

        state.apply_record(record(RepoStatus::Processing));
        assert_eq!(state.consecutive_failures(), 0);
    }

    #[test]
    fn test_regression_accepted_at_face_value() {
        let mut state = PollState::new();
        state.apply_record(record(RepoStatus::Processing));
        assert_eq!(state.apply_record(record(RepoStatus::Queued)), PollDecision::Continue);
        assert_eq!(state.record().unwrap().status, RepoStatus::Queued);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut state = PollState::new();
        assert_eq!(state.apply_record(record(RepoStatus::Failed)), PollDecision::Stop);
        assert!(!state.should_poll());
    }

    // =========================================================================
    // Timer task
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed() {
        let (backend, ctx) = setup();
        for status in [
            RepoStatus::Queued,
            RepoStatus::Queued,
            RepoStatus::Processing,
            RepoStatus::Completed,
        ] {
            backend.push_status(record(status));
        }

        let mut handle = RepositoryPoller::new(ctx, "r1").start();
        assert_eq!(handle.finished().await, Some(RepoStatus::Completed));
        assert_eq!(backend.status_calls("r1"), 4);
        assert!(!handle.is_polling());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(backend.status_calls("r1"), 4);

        // Manual fetch replaces the record but never resumes polling
        backend.set_status(record(RepoStatus::Processing));
        let fetched = handle.refresh().await.unwrap();
        assert_eq!(fetched.status, RepoStatus::Processing);
        assert_eq!(handle.status(), Some(RepoStatus::Processing));
        assert!(!handle.is_polling());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(backend.status_calls("r1"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_retried() {
        let (backend, ctx) = setup();
        backend.push_status_error("r1", "busy");
        backend.push_status(record(RepoStatus::Completed));

        let mut handle = RepositoryPoller::new(ctx, "r1").start();
        assert_eq!(handle.finished().await, Some(RepoStatus::Completed));
        assert_eq!(backend.status_calls("r1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_notifier_does_not_stall_polling() {
        let (backend, ctx) = setup();
        let (tx, _updates) = tokio::sync::mpsc::channel(1);
        let ctx = ctx.with_notifier(tx);
        backend.set_status(record(RepoStatus::Processing));

        let mut handle = RepositoryPoller::new(ctx, "r1").start();
        let mut rx = handle.subscribe();
        for _ in 0..5 {
            rx.changed().await.unwrap();
        }
        assert!(backend.status_calls("r1") >= 5);
        assert!(handle.is_polling());

        backend.set_status(record(RepoStatus::Completed));
        assert_eq!(handle.finished().await, Some(RepoStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_each_record() {
        let (backend, ctx) = setup();
        backend.push_status(record(RepoStatus::Processing));
        backend.push_status(record(RepoStatus::Completed));

        let mut handle = RepositoryPoller::new(ctx, "r1").start();
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().status, RepoStatus::Processing);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().status, RepoStatus::Completed);

        handle.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_fetching() {
        let (backend, ctx) = setup();
        backend.set_status(record(RepoStatus::Processing));

        let handle = RepositoryPoller::new(ctx, "r1").start();
        let mut rx = handle.subscribe();
        rx.changed().await.unwrap();
        assert!(handle.is_polling());

        let calls = backend.status_calls("r1");
        handle.cancel();

        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(backend.status_calls("r1"), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (backend, ctx) = setup();
        backend.set_status(record(RepoStatus::Queued));

        let handle = RepositoryPoller::new(ctx, "r1")
            .with_interval(Duration::from_secs(1))
            .start();
        let mut rx = handle.subscribe();
        rx.changed().await.unwrap();
        drop(handle);

        let calls = backend.status_calls("r1");
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(backend.status_calls("r1"), calls);
    }
}
