//! One dispatcher thread per plan, each owning a FIFO of [`QueuedOp`]s.
//!
//! Generalizes a per-branch `DashMap<BranchId, Mutex<()>>` isolation
//! strategy from "one mutex per branch" to "one dispatcher thread per
//! plan, draining a queue that batches compatible operations."

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use plandex_core_types::{CoreConfig, PlanId};
use std::collections::VecDeque;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::QueueError;
use crate::heartbeat::HeartbeatDriver;
use crate::lock_registry::LockRegistry;
use crate::operation::{OperationContext, QueuedOp};
use crate::retry::acquire_with_retry;

struct Shared {
    queue: Mutex<VecDeque<QueuedOp>>,
    condvar: Condvar,
    stop: AtomicBool,
}

/// Owns one dispatcher thread per plan and the shared lock registry they
/// all acquire against. Operations submitted for the same plan are
/// dispatched in enqueue order; batching may run consecutive compatible
/// operations concurrently but never reorders an operation past an
/// earlier incompatible one.
pub struct OperationQueue {
    registry: Arc<LockRegistry>,
    config: CoreConfig,
    dispatchers: DashMap<PlanId, Arc<Shared>>,
}

impl OperationQueue {
    /// Build a queue backed by `registry`, using `config` for heartbeat
    /// interval and retry parameters.
    pub fn new(registry: Arc<LockRegistry>, config: CoreConfig) -> Self {
        Self {
            registry,
            config,
            dispatchers: DashMap::new(),
        }
    }

    /// Access the shared lock registry (for `ListLocks`/`ClearStaleLocks`).
    pub fn registry(&self) -> &Arc<LockRegistry> {
        &self.registry
    }

    fn dispatcher_for(&self, plan: PlanId) -> Arc<Shared> {
        if let Some(existing) = self.dispatchers.get(&plan) {
            return existing.clone();
        }
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let entry = self
            .dispatchers
            .entry(plan)
            .or_insert_with(|| shared.clone());
        if Arc::ptr_eq(&entry, &shared) {
            let registry = self.registry.clone();
            let heartbeat_interval = self.config.heartbeat_interval;
            let retry = self.config.retry;
            let dispatcher_shared = shared.clone();
            thread::spawn(move || dispatcher_loop(dispatcher_shared, registry, heartbeat_interval, retry));
        }
        entry.clone()
    }

    /// Enqueue an operation for `plan` and block the calling thread until
    /// its lock is resolved and its closure has run (or it failed / was
    /// cancelled). Operations submitted for the same plan from different
    /// threads interleave in enqueue order.
    pub fn submit<T, F>(
        &self,
        plan: PlanId,
        request: crate::operation::LockRequest,
        context: OperationContext,
        owner_session: impl Into<String>,
        f: F,
    ) -> Result<T, QueueError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if context.cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        if context.is_expired() {
            return Err(QueueError::DeadlineExceeded);
        }
        let (tx, rx) = std::sync::mpsc::channel::<Result<T, QueueError>>();
        let completion = Box::new(move |outcome: Result<(), QueueError>| {
            let result = outcome.map(|()| f());
            let _ = tx.send(result);
        });
        let op = QueuedOp {
            id: plandex_core_types::OperationId::new(),
            plan,
            request,
            context,
            owner_session: owner_session.into(),
            completion,
        };
        let shared = self.dispatcher_for(plan);
        {
            let mut queue = shared.queue.lock();
            queue.push_back(op);
        }
        shared.condvar.notify_all();
        rx.recv()
            .map_err(|_| QueueError::Internal("dispatcher dropped operation before completion".into()))?
    }
}

fn dispatcher_loop(
    shared: Arc<Shared>,
    registry: Arc<LockRegistry>,
    heartbeat_interval: std::time::Duration,
    retry: plandex_core_types::RetryConfig,
) {
    loop {
        let batch = match next_batch(&shared) {
            Some(batch) => batch,
            None => return,
        };
        if batch.is_empty() {
            continue;
        }
        thread::scope(|scope| {
            for op in batch {
                let registry = registry.clone();
                scope.spawn(move || run_op(op, registry, heartbeat_interval, retry));
            }
        });
    }
}

/// `NextBatch`: take the head op. A WRITE, or a READ on the root branch,
/// is always dispatched alone. Otherwise collect the run of consecutive
/// READs on the same branch that immediately follow the head, stopping
/// at the first non-matching op. Writes need exclusive access; same-
/// branch reads are safely parallel; root-branch reads are treated
/// conservatively because they race with broad metadata operations.
fn next_batch(shared: &Arc<Shared>) -> Option<Vec<QueuedOp>> {
    let mut queue = shared.queue.lock();
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(front) = queue.front() {
            if front.context.cancel.is_cancelled() {
                let op = queue.pop_front().unwrap();
                (op.completion)(Err(QueueError::Cancelled));
                continue;
            }
            if front.context.is_expired() {
                let op = queue.pop_front().unwrap();
                (op.completion)(Err(QueueError::DeadlineExceeded));
                continue;
            }
            break;
        }
        shared.condvar.wait(&mut queue);
    }

    let head = queue.pop_front().unwrap();
    if head.request.scope.is_write() || head.request.branch.is_root() {
        return Some(vec![head]);
    }
    let branch = head.request.branch.clone();
    let mut batch = vec![head];
    while let Some(front) = queue.front() {
        if front.context.cancel.is_cancelled() || front.context.is_expired() {
            break;
        }
        if front.request.scope.is_read() && front.request.branch == branch {
            batch.push(queue.pop_front().unwrap());
        } else {
            break;
        }
    }
    Some(batch)
}

fn run_op(
    op: QueuedOp,
    registry: Arc<LockRegistry>,
    heartbeat_interval: std::time::Duration,
    retry: plandex_core_types::RetryConfig,
) {
    let acquired = acquire_with_retry(
        &registry,
        op.plan,
        op.request.branch.clone(),
        op.request.scope,
        &op.owner_session,
        op.request.reason.clone(),
        &retry,
        &op.context,
    );

    match acquired {
        Err(err) => {
            (op.completion)(Err(err));
        }
        Ok(lock_id) => {
            let heartbeat = HeartbeatDriver::start(registry.clone(), vec![lock_id], heartbeat_interval);
            let op_id = op.id;
            let completion = op.completion;
            let result = panic::catch_unwind(panic::AssertUnwindSafe(|| completion(Ok(()))));
            heartbeat.stop();
            registry.release(lock_id);
            if result.is_err() {
                tracing::error!(operation_id = %op_id, "operation panicked, lock released");
            }
        }
    }
}
