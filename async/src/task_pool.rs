//! Tracked, cancellable workers with a single shutdown point.
//!
//! Shutdown happens in three steps:
//! 1. cancel the shared token, so every worker sees the stop signal
//! 2. close the tracker, so nothing new can be spawned
//! 3. wait until every tracked task has returned
//!
//! Workers are expected to `select!` on [`TaskPool::cancel_token`] at each
//! suspension point.

use tracing::Instrument;

/// Owns a set of workers that stop together.
pub struct TaskPool {
    cancel_token: tokio_util::sync::CancellationToken,
    task_tracker: tokio_util::task::TaskTracker,
}

impl TaskPool {
    pub fn new() -> Self {
        Self {
            cancel_token: tokio_util::sync::CancellationToken::new(),
            task_tracker: tokio_util::task::TaskTracker::new(),
        }
    }

    /// The token every worker of this pool should observe.
    pub fn cancel_token(&self) -> &tokio_util::sync::CancellationToken {
        &self.cancel_token
    }

    /// A token cancelled with the pool, but which can also be cancelled alone.
    pub fn child_token(&self) -> tokio_util::sync::CancellationToken {
        self.cancel_token.child_token()
    }

    /// Spawns a tracked task.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.task_tracker.spawn(task)
    }

    /// Spawns a tracked task inside a detached span named after the worker.
    ///
    /// The span follows from the caller's span rather than nesting in it, so a
    /// long-lived worker does not keep its creator's span open.
    pub fn spawn_named<F>(&self, name: &'static str, task: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let span = tracing::trace_span!(parent: None, "worker", name);
        span.follows_from(tracing::Span::current());
        self.task_tracker.spawn(task.instrument(span))
    }

    /// Number of tracked tasks that have not yet returned.
    pub fn active(&self) -> usize {
        self.task_tracker.len()
    }

    /// Cancels, closes and waits for every tracked task.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}
