//! Property tests for the universal invariants owned by this crate:
//! lock exclusivity, submission-order preservation, and stale-lock
//! reclamation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plandex_concurrency::{LockReason, LockRequest, OperationContext, RepoQueue};
use plandex_core_types::{BranchName, CancellationToken, CoreConfig, PlanId, Scope};
use proptest::prelude::*;

fn scope_strategy() -> impl Strategy<Value = Scope> {
    prop_oneof![Just(Scope::Read), Just(Scope::Write)]
}

proptest! {
    /// Exclusivity: for any interleaving of concurrently submitted ops on
    /// the same `(plan, branch)`, no write ever overlaps another op's
    /// critical section, observed via a shared "currently inside"
    /// counter that a conflicting pair would push above 1.
    #[test]
    fn write_locks_are_mutually_exclusive(scopes in prop::collection::vec(scope_strategy(), 2..6)) {
        let queue = Arc::new(RepoQueue::new(CoreConfig::new("/tmp/plandex-prop-excl")));
        let plan = PlanId::new();
        let branch = BranchName::new("prop-branch");
        let active_writers = Arc::new(Mutex::new(0usize));
        let violation = Arc::new(Mutex::new(false));

        let handles: Vec<_> = scopes
            .into_iter()
            .enumerate()
            .map(|(i, scope)| {
                let queue = queue.clone();
                let branch = branch.clone();
                let active_writers = active_writers.clone();
                let violation = violation.clone();
                std::thread::spawn(move || {
                    let request = match scope {
                        Scope::Read => LockRequest::read(branch, LockReason::PlanSync),
                        Scope::Write => LockRequest::write(branch, LockReason::Commit),
                    };
                    let context = OperationContext::new(CancellationToken::new());
                    let _ = queue.submit(plan, request, context, format!("s{i}"), move || {
                        if scope.is_write() {
                            let mut count = active_writers.lock().unwrap();
                            *count += 1;
                            if *count > 1 {
                                *violation.lock().unwrap() = true;
                            }
                            std::thread::sleep(Duration::from_millis(2));
                            *count -= 1;
                        }
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        prop_assert!(!*violation.lock().unwrap());
    }

    /// Order preservation: operations submitted for the same plan from a
    /// single thread complete in submission order, regardless of branch
    /// mix.
    #[test]
    fn same_plan_submissions_complete_in_order(n in 2usize..8) {
        let queue = RepoQueue::new(CoreConfig::new("/tmp/plandex-prop-order"));
        let plan = PlanId::new();
        let completion_order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..n {
            let order = completion_order.clone();
            let _ = queue.submit(
                plan,
                LockRequest::write(BranchName::new("main"), LockReason::Commit),
                OperationContext::new(CancellationToken::new()),
                "single-thread",
                move || order.lock().unwrap().push(i),
            );
        }
        let observed = completion_order.lock().unwrap().clone();
        prop_assert_eq!(observed, (0..n).collect::<Vec<_>>());
    }

    /// Stale reclamation: a lock whose heartbeat is older than the
    /// configured threshold is always reaped, and a fresh lock never is.
    #[test]
    fn stale_locks_are_always_reclaimed(fresh_count in 0usize..4) {
        use plandex_concurrency::LockRegistry;

        let registry = LockRegistry::new(Duration::from_millis(0));
        let stale_branch = BranchName::new("stale");
        let stale_id = registry
            .acquire(PlanId::new(), stale_branch, Scope::Write, "holder", LockReason::Commit)
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let fresh_registry = LockRegistry::new(Duration::from_secs(3600));
        let mut fresh_ids = HashSet::new();
        for i in 0..fresh_count {
            let id = fresh_registry
                .acquire(
                    PlanId::new(),
                    BranchName::new(format!("fresh-{i}")),
                    Scope::Write,
                    "holder",
                    LockReason::Commit,
                )
                .unwrap();
            fresh_ids.insert(id);
        }

        prop_assert_eq!(registry.reap_stale(), 1);
        prop_assert!(registry.heartbeat(stale_id).is_err());
        prop_assert_eq!(fresh_registry.reap_stale(), 0);
        for id in fresh_ids {
            prop_assert!(fresh_registry.heartbeat(id).is_ok());
        }
    }
}
