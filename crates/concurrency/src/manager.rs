//! Public surface of the per-repository operation queue.

use plandex_core_types::{CancellationToken, CoreConfig, PlanId};
use std::sync::Arc;

use crate::error::QueueError;
use crate::lock_registry::{LockRegistry, LockSnapshot};
use crate::operation::{LockRequest, OperationContext};
use crate::queue::OperationQueue;

/// Entry point for a repository's concurrency control: submit operations
/// that need one or more branch locks, inspect active locks, and clear
/// stale ones.
///
/// One `RepoQueue` is shared across every plan operating on the same
/// repository; internally it fans out to one dispatcher thread per plan
/// the first time that plan submits an operation.
pub struct RepoQueue {
    queue: OperationQueue,
}

impl RepoQueue {
    /// Build a queue using `config`'s heartbeat interval and retry
    /// parameters.
    pub fn new(config: CoreConfig) -> Self {
        let registry = Arc::new(LockRegistry::new(config.stale_lock_threshold));
        Self {
            queue: OperationQueue::new(registry, config),
        }
    }

    /// Run `f` once `request`'s lock has been acquired for `plan`.
    /// Blocks the calling thread until `f` completes or the operation
    /// fails/is cancelled. The lock is released and the heartbeat
    /// stopped before this returns, regardless of outcome.
    pub fn submit<T, F>(
        &self,
        plan: PlanId,
        request: LockRequest,
        context: OperationContext,
        owner_session: impl Into<String>,
        f: F,
    ) -> Result<T, QueueError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.queue.submit(plan, request, context, owner_session, f)
    }

    /// List active (and, transiently, stale-but-not-yet-reaped) locks,
    /// optionally restricted to one plan.
    pub fn list_locks(&self, plan: Option<PlanId>) -> Vec<LockSnapshot> {
        self.queue.registry().list_locks(plan)
    }

    /// Reap every lock whose heartbeat has lapsed past the stale
    /// threshold. Returns the number reclaimed. Intended to be called
    /// both by the periodic reaper task and directly by an operator via
    /// `ClearStaleLocks`.
    pub fn clear_stale_locks(&self) -> usize {
        self.queue.registry().reap_stale()
    }
}

/// Run [`RepoQueue::clear_stale_locks`] on a dedicated thread at
/// `interval` until the returned handle is dropped or stopped.
///
/// A single background thread on a sleep-and-sweep loop, rather than a
/// scheduler of many recurring jobs.
pub struct Reaper {
    stop: CancellationToken,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Reaper {
    /// Start the reaper loop.
    pub fn start(queue: Arc<RepoQueue>, interval: std::time::Duration) -> Self {
        let stop = CancellationToken::new();
        let stop_for_thread = stop.clone();
        let handle = std::thread::spawn(move || {
            while !stop_for_thread.wait_timeout(interval) {
                let reclaimed = queue.clear_stale_locks();
                if reclaimed > 0 {
                    tracing::info!(reclaimed, "reaped stale locks");
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the reaper and wait for its thread to exit.
    pub fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reason::LockReason;
    use plandex_core_types::BranchName;

    fn config() -> CoreConfig {
        CoreConfig::new("/tmp/repo-queue-test")
    }

    #[test]
    fn submit_runs_closure_and_releases_lock() {
        let repo = RepoQueue::new(config());
        let plan = PlanId::new();
        let result = repo
            .submit(
                plan,
                LockRequest::write(BranchName::root(), LockReason::Commit),
                OperationContext::new(CancellationToken::new()),
                "session-1",
                || 42,
            )
            .unwrap();
        assert_eq!(result, 42);
        assert!(repo.list_locks(Some(plan)).is_empty());
    }

    #[test]
    fn operations_on_different_plans_do_not_block_each_other() {
        let repo = Arc::new(RepoQueue::new(config()));
        let plan_a = PlanId::new();
        let plan_b = PlanId::new();
        let repo_a = repo.clone();
        let repo_b = repo.clone();
        let handle_a = std::thread::spawn(move || {
            repo_a.submit(
                plan_a,
                LockRequest::write(BranchName::root(), LockReason::Commit),
                OperationContext::new(CancellationToken::new()),
                "a",
                || {
                    std::thread::sleep(std::time::Duration::from_millis(30));
                    "a-done"
                },
            )
        });
        let handle_b = std::thread::spawn(move || {
            repo_b.submit(
                plan_b,
                LockRequest::write(BranchName::root(), LockReason::Commit),
                OperationContext::new(CancellationToken::new()),
                "b",
                || "b-done",
            )
        });
        assert_eq!(handle_a.join().unwrap().unwrap(), "a-done");
        assert_eq!(handle_b.join().unwrap().unwrap(), "b-done");
    }

    #[test]
    fn cancelled_before_submit_fails_fast() {
        let repo = RepoQueue::new(config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), QueueError> = repo.submit(
            PlanId::new(),
            LockRequest::write(BranchName::root(), LockReason::Commit),
            OperationContext::new(cancel),
            "s1",
            || (),
        );
        assert!(matches!(result, Err(QueueError::Cancelled)));
    }
}
