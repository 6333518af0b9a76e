//! Exponential backoff with jitter around [`LockRegistry::acquire`].

use plandex_core_types::{BranchName, PlanId, RetryConfig, Scope};
use rand::Rng;
use std::time::Duration;

use crate::error::QueueError;
use crate::lock_registry::LockRegistry;
use crate::operation::OperationContext;
use crate::reason::LockReason;

/// Attempt to acquire `scope` on `(plan, branch)`, retrying on conflict
/// with exponential backoff until `retry.max_attempts` is reached,
/// `context`'s cancellation fires, or `context`'s deadline passes.
pub fn acquire_with_retry(
    registry: &LockRegistry,
    plan: PlanId,
    branch: BranchName,
    scope: Scope,
    owner_session: &str,
    reason: LockReason,
    retry: &RetryConfig,
    context: &OperationContext,
) -> Result<plandex_core_types::LockId, QueueError> {
    let mut attempt: u32 = 0;
    loop {
        if context.cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        if context.is_expired() {
            return Err(QueueError::DeadlineExceeded);
        }
        match registry.acquire(plan, branch.clone(), scope, owner_session, reason.clone()) {
            Ok(id) => return Ok(id),
            Err(conflicting) => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    let snapshot = registry.describe(conflicting);
                    return Err(QueueError::LockExhausted {
                        plan,
                        branch,
                        scope,
                        held_for_secs: snapshot.as_ref().map(|s| s.age_secs).unwrap_or(0),
                        reason: snapshot
                            .map(|s| s.reason.to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                        attempts: attempt,
                    });
                }
                let mut delay = jittered_delay(retry, attempt - 1);
                if let Some(deadline) = context.deadline {
                    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                    if remaining.is_zero() {
                        return Err(QueueError::DeadlineExceeded);
                    }
                    delay = delay.min(remaining);
                }
                if context.cancel.wait_timeout(delay) {
                    return Err(QueueError::Cancelled);
                }
                if context.is_expired() {
                    return Err(QueueError::DeadlineExceeded);
                }
            }
        }
    }
}

fn jittered_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let base = retry.base_delay_for_attempt(attempt);
    let base_secs = base.as_secs_f64();
    let spread = base_secs * retry.jitter;
    let delta = if spread > 0.0 {
        rand::thread_rng().gen_range(-spread..=spread)
    } else {
        0.0
    };
    Duration::from_secs_f64((base_secs + delta).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plandex_core_types::CancellationToken;
    use std::time::Duration as StdDuration;

    #[test]
    fn succeeds_immediately_without_conflict() {
        let registry = LockRegistry::new(StdDuration::from_secs(60));
        let retry = RetryConfig::default();
        let context = OperationContext::uncancellable();
        let result = acquire_with_retry(
            &registry,
            PlanId::new(),
            BranchName::root(),
            Scope::Write,
            "s1",
            LockReason::Commit,
            &retry,
            &context,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let registry = LockRegistry::new(StdDuration::from_secs(60));
        let plan = PlanId::new();
        let branch = BranchName::root();
        registry
            .acquire(plan, branch.clone(), Scope::Write, "holder", LockReason::Commit)
            .unwrap();
        let mut retry = RetryConfig::default();
        retry.base_delay = StdDuration::from_millis(1);
        retry.max_attempts = 2;
        let context = OperationContext::uncancellable();
        let result = acquire_with_retry(
            &registry, plan, branch, Scope::Write, "s2", LockReason::Commit, &retry, &context,
        );
        match result {
            Err(QueueError::LockExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected LockExhausted, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_stops_retry_loop() {
        let registry = LockRegistry::new(StdDuration::from_secs(60));
        let plan = PlanId::new();
        let branch = BranchName::root();
        registry
            .acquire(plan, branch.clone(), Scope::Write, "holder", LockReason::Commit)
            .unwrap();
        let mut retry = RetryConfig::default();
        retry.base_delay = StdDuration::from_secs(30);
        retry.max_attempts = 5;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let context = OperationContext::new(cancel);
        let result = acquire_with_retry(
            &registry, plan, branch, Scope::Write, "s2", LockReason::Commit, &retry, &context,
        );
        assert!(matches!(result, Err(QueueError::Cancelled)));
    }

    #[test]
    fn expired_deadline_stops_retry_loop_without_exhausting_attempts() {
        let registry = LockRegistry::new(StdDuration::from_secs(60));
        let plan = PlanId::new();
        let branch = BranchName::root();
        registry
            .acquire(plan, branch.clone(), Scope::Write, "holder", LockReason::Commit)
            .unwrap();
        let mut retry = RetryConfig::default();
        retry.base_delay = StdDuration::from_secs(30);
        retry.max_attempts = 5;
        let context = OperationContext::uncancellable()
            .with_deadline(std::time::Instant::now() - StdDuration::from_secs(1));
        let result = acquire_with_retry(
            &registry, plan, branch, Scope::Write, "s2", LockReason::Commit, &retry, &context,
        );
        assert!(matches!(result, Err(QueueError::DeadlineExceeded)));
    }
}
