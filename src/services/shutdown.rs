//! Scoped resource release on shutdown.
//!
//! Anything that must be torn down when the process stops (workspaces, live
//! agent executions) registers a release action under a key. `shutdown()`
//! runs every pending action exactly once, in reverse registration order,
//! and keeps going when one of them fails.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;

/// Future returned by a release action.
pub type ReleaseFuture = Pin<Box<dyn Future<Output = DomainResult<()>> + Send>>;

/// A one-shot release action.
pub type ReleaseAction = Box<dyn FnOnce() -> ReleaseFuture + Send>;

/// Summary of one shutdown pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub released: usize,
    pub failed: usize,
}

/// Registry of pending release actions.
#[derive(Default)]
pub struct ShutdownCoordinator {
    actions: Mutex<Vec<(String, ReleaseAction)>>,
    triggered: AtomicBool,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("triggered", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether shutdown has started; new work should not be claimed.
    pub fn is_shutting_down(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Register (or replace) the release action for `key`.
    pub async fn register<F, Fut>(&self, key: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = DomainResult<()>> + Send + 'static,
    {
        let key = key.into();
        let boxed: ReleaseAction = Box::new(move || -> ReleaseFuture { Box::pin(action()) });
        let mut actions = self.actions.lock().await;
        actions.retain(|(k, _)| *k != key);
        debug!(key = %key, "Registered release action");
        actions.push((key, boxed));
    }

    /// Drop the action for `key` after the resource was released normally.
    pub async fn release(&self, key: &str) -> bool {
        let mut actions = self.actions.lock().await;
        let before = actions.len();
        actions.retain(|(k, _)| k != key);
        before != actions.len()
    }

    pub async fn pending(&self) -> usize {
        self.actions.lock().await.len()
    }

    /// Run every pending action once. Later calls are no-ops.
    pub async fn shutdown(&self) -> ShutdownSummary {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already triggered");
            return ShutdownSummary::default();
        }

        let actions = std::mem::take(&mut *self.actions.lock().await);
        info!(pending = actions.len(), "Shutting down, releasing resources");

        let mut summary = ShutdownSummary::default();
        for (key, action) in actions.into_iter().rev() {
            match action().await {
                Ok(()) => summary.released += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Release action failed, continuing");
                    summary.failed += 1;
                }
            }
        }

        info!(
            released = summary.released,
            failed = summary.failed,
            "Shutdown complete"
        );
        summary
    }

    /// Trigger `shutdown()` when the process receives Ctrl-C.
    pub fn listen_for_ctrl_c(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received");
                coordinator.shutdown().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_actions_run_exactly_once() {
        let coordinator = ShutdownCoordinator::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b"] {
            let runs = Arc::clone(&runs);
            coordinator
                .register(key, move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }

        let first = coordinator.shutdown().await;
        let second = coordinator.shutdown().await;
        assert_eq!(first.released, 2);
        assert_eq!(second, ShutdownSummary::default());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_releases() {
        let coordinator = ShutdownCoordinator::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        coordinator
            .register("ok", move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;
        coordinator
            .register("broken", || async {
                Err(DomainError::VersionControl("worktree locked".into()))
            })
            .await;

        let summary = coordinator.shutdown().await;
        assert_eq!(summary, ShutdownSummary { released: 1, failed: 1 });
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_release_and_replace() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.register("ws", || async { Ok(()) }).await;
        coordinator.register("ws", || async { Ok(()) }).await;
        assert_eq!(coordinator.pending().await, 1);

        assert!(coordinator.release("ws").await);
        assert!(!coordinator.release("ws").await);
        assert_eq!(coordinator.shutdown().await.released, 0);
    }
}
