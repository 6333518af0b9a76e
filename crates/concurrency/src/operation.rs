//! The unit of work the dispatcher schedules: one lock request plus a
//! completion callback invoked once that request is resolved.

use std::time::Instant;

use plandex_core_types::{BranchName, CancellationToken, OperationId, PlanId, Scope};

use crate::error::QueueError;
use crate::reason::LockReason;

/// Typed carrier for the two things a queued operation's caller controls
/// once it has been submitted: an out-of-band cancel signal, and an
/// optional wall-clock deadline after which the dispatcher gives up on
/// acquisition rather than retrying further.
///
/// Replaces a bare `CancellationToken` parameter so the Queue's
/// cancellation and deadline handling both have one concrete type to
/// carry instead of two independent, easy-to-forget arguments.
#[derive(Clone)]
pub struct OperationContext {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl OperationContext {
    /// A context with no deadline, cancellable via `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// A context with no deadline and a fresh, unfired cancellation token.
    pub fn uncancellable() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Attach a deadline, consuming `self`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// True once the deadline (if any) has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// The lock an operation needs before its closure can run.
#[derive(Debug, Clone)]
pub struct LockRequest {
    /// Branch to lock.
    pub branch: BranchName,
    /// Read or write.
    pub scope: Scope,
    /// Diagnostic reason recorded on the lock.
    pub reason: LockReason,
}

impl LockRequest {
    /// Build a request for a shared read lock.
    pub fn read(branch: impl Into<BranchName>, reason: LockReason) -> Self {
        Self {
            branch: branch.into(),
            scope: Scope::Read,
            reason,
        }
    }

    /// Build a request for an exclusive write lock.
    pub fn write(branch: impl Into<BranchName>, reason: LockReason) -> Self {
        Self {
            branch: branch.into(),
            scope: Scope::Write,
            reason,
        }
    }
}

/// A queued operation: one lock request plus the callback run once it's
/// resolved (successfully acquired, or failed/cancelled).
pub(crate) struct QueuedOp {
    pub id: OperationId,
    pub plan: PlanId,
    pub request: LockRequest,
    pub context: OperationContext,
    pub owner_session: String,
    pub completion: Box<dyn FnOnce(Result<(), QueueError>) + Send>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_constructors_set_scope() {
        let r = LockRequest::read("main", LockReason::PlanSync);
        let w = LockRequest::write("main", LockReason::Commit);
        assert!(r.scope.is_read());
        assert!(w.scope.is_write());
        assert_eq!(r.branch, w.branch);
    }

    #[test]
    fn context_without_deadline_never_expires() {
        let context = OperationContext::uncancellable();
        assert!(!context.is_expired());
    }

    #[test]
    fn context_with_past_deadline_is_expired() {
        let context = OperationContext::uncancellable()
            .with_deadline(Instant::now() - std::time::Duration::from_millis(1));
        assert!(context.is_expired());
    }

    #[test]
    fn context_with_future_deadline_is_not_expired() {
        let context = OperationContext::uncancellable()
            .with_deadline(Instant::now() + std::time::Duration::from_secs(60));
        assert!(!context.is_expired());
    }
}
