//! Durable-in-memory record of active locks per `(plan, branch, scope)`.
//!
//! Generalizes a single exclusive per-branch mutex (`DashMap<BranchId,
//! Mutex<()>>`) into a full lock table supporting shared reads,
//! diagnostics, and heartbeat-based staleness detection.

use dashmap::DashMap;
use plandex_core_types::{now_micros, BranchName, LockId, PlanId, Scope};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::QueueError;
use crate::reason::LockReason;

struct LockRecord {
    plan: PlanId,
    branch: BranchName,
    scope: Scope,
    owner_session: String,
    created_at: u64,
    last_heartbeat_at: AtomicU64,
    reason: LockReason,
}

/// A point-in-time copy of a lock record, returned by [`LockRegistry::list_locks`]
/// and used to build lock-exhaustion diagnostics.
#[derive(Debug, Clone)]
pub struct LockSnapshot {
    /// The lock's identifier.
    pub id: LockId,
    /// Plan the lock belongs to.
    pub plan: PlanId,
    /// Branch the lock covers.
    pub branch: BranchName,
    /// Read or write.
    pub scope: Scope,
    /// Opaque identifier of the session that holds the lock.
    pub owner_session: String,
    /// Why the lock was requested.
    pub reason: LockReason,
    /// Seconds since the lock was created.
    pub age_secs: u64,
    /// Seconds since the last heartbeat refresh.
    pub idle_secs: u64,
}

/// Table of active locks, keyed by plan for conflict lookups and by lock
/// id for heartbeat/release.
pub struct LockRegistry {
    locks: DashMap<LockId, LockRecord>,
    by_plan: DashMap<PlanId, SmallVec<[LockId; 8]>>,
    stale_threshold: Duration,
}

impl LockRegistry {
    /// Create an empty registry. Locks with no heartbeat for longer than
    /// `stale_threshold` become eligible for [`Self::reap_stale`].
    pub fn new(stale_threshold: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            by_plan: DashMap::new(),
            stale_threshold,
        }
    }

    /// Try to acquire `scope` on `(plan, branch)`. A `WRITE` conflicts
    /// with every existing lock on `plan` regardless of branch; a `READ`
    /// conflicts with any `WRITE` on `plan` and with any `READ` on a
    /// different branch (same-branch reads are compatible). On success
    /// returns the new lock's id; on conflict returns the id of the
    /// blocking lock so the caller can report or inspect it.
    ///
    /// Holds the `by_plan` shard lock for the whole check-then-insert,
    /// which is what makes this atomic with respect to other acquires on
    /// the same plan.
    pub fn acquire(
        &self,
        plan: PlanId,
        branch: BranchName,
        scope: Scope,
        owner_session: &str,
        reason: LockReason,
    ) -> std::result::Result<LockId, LockId> {
        let mut held = self.by_plan.entry(plan).or_default();
        for id in held.iter() {
            if let Some(rec) = self.locks.get(id) {
                let conflicts = scope.is_write() || rec.scope.is_write() || rec.branch != branch;
                if conflicts {
                    return Err(*id);
                }
            }
        }
        let id = LockId::new();
        let now = now_micros();
        held.push(id);
        drop(held);
        self.locks.insert(
            id,
            LockRecord {
                plan,
                branch,
                scope,
                owner_session: owner_session.to_string(),
                created_at: now,
                last_heartbeat_at: AtomicU64::new(now),
                reason,
            },
        );
        Ok(id)
    }

    /// Refresh a lock's `last-heartbeat-at`. Fails with
    /// [`QueueError::LockNotFound`] if the lock was released or reaped.
    pub fn heartbeat(&self, id: LockId) -> std::result::Result<(), QueueError> {
        match self.locks.get(&id) {
            Some(rec) => {
                rec.last_heartbeat_at.store(now_micros(), Ordering::SeqCst);
                Ok(())
            }
            None => Err(QueueError::LockNotFound(id)),
        }
    }

    /// Release a lock. A no-op if the lock is already gone, so double
    /// release (e.g. from both a cancellation path and normal cleanup)
    /// is harmless.
    pub fn release(&self, id: LockId) {
        if let Some((_, rec)) = self.locks.remove(&id) {
            if let Some(mut ids) = self.by_plan.get_mut(&rec.plan) {
                ids.retain(|x| *x != id);
            }
        }
    }

    /// Remove every lock whose heartbeat is older than the stale
    /// threshold. Returns the number reclaimed.
    pub fn reap_stale(&self) -> usize {
        let now = now_micros();
        let threshold_micros = self.stale_threshold.as_micros() as u64;
        let stale: Vec<LockId> = self
            .locks
            .iter()
            .filter_map(|entry| {
                let last = entry.value().last_heartbeat_at.load(Ordering::SeqCst);
                if now.saturating_sub(last) > threshold_micros {
                    Some(*entry.key())
                } else {
                    None
                }
            })
            .collect();
        for id in &stale {
            self.release(*id);
        }
        stale.len()
    }

    /// Snapshot every lock, optionally restricted to one plan.
    pub fn list_locks(&self, plan: Option<PlanId>) -> Vec<LockSnapshot> {
        let now = now_micros();
        self.locks
            .iter()
            .filter(|entry| plan.map_or(true, |p| p == entry.value().plan))
            .map(|entry| self.snapshot(*entry.key(), entry.value(), now))
            .collect()
    }

    /// Describe a single lock, used to build lock-exhaustion diagnostics.
    pub fn describe(&self, id: LockId) -> Option<LockSnapshot> {
        let now = now_micros();
        self.locks.get(&id).map(|rec| self.snapshot(id, &rec, now))
    }

    fn snapshot(&self, id: LockId, rec: &LockRecord, now: u64) -> LockSnapshot {
        let last_heartbeat = rec.last_heartbeat_at.load(Ordering::SeqCst);
        LockSnapshot {
            id,
            plan: rec.plan,
            branch: rec.branch.clone(),
            scope: rec.scope,
            owner_session: rec.owner_session.clone(),
            reason: rec.reason.clone(),
            age_secs: now.saturating_sub(rec.created_at) / 1_000_000,
            idle_secs: now.saturating_sub(last_heartbeat) / 1_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LockRegistry {
        LockRegistry::new(Duration::from_secs(60))
    }

    #[test]
    fn reads_are_compatible() {
        let reg = registry();
        let plan = PlanId::new();
        let branch = BranchName::root();
        let a = reg
            .acquire(plan, branch.clone(), Scope::Read, "s1", LockReason::PlanSync)
            .unwrap();
        let b = reg
            .acquire(plan, branch.clone(), Scope::Read, "s2", LockReason::PlanSync)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn write_conflicts_with_write() {
        let reg = registry();
        let plan = PlanId::new();
        let branch = BranchName::root();
        reg.acquire(plan, branch.clone(), Scope::Write, "s1", LockReason::Commit)
            .unwrap();
        let err = reg.acquire(plan, branch, Scope::Write, "s2", LockReason::Commit);
        assert!(err.is_err());
    }

    #[test]
    fn write_conflicts_with_read() {
        let reg = registry();
        let plan = PlanId::new();
        let branch = BranchName::root();
        reg.acquire(plan, branch.clone(), Scope::Read, "s1", LockReason::PlanSync)
            .unwrap();
        let err = reg.acquire(plan, branch, Scope::Write, "s2", LockReason::Commit);
        assert!(err.is_err());
    }

    #[test]
    fn release_clears_conflict() {
        let reg = registry();
        let plan = PlanId::new();
        let branch = BranchName::root();
        let id = reg
            .acquire(plan, branch.clone(), Scope::Write, "s1", LockReason::Commit)
            .unwrap();
        reg.release(id);
        assert!(reg
            .acquire(plan, branch, Scope::Write, "s2", LockReason::Commit)
            .is_ok());
    }

    #[test]
    fn stale_lock_is_reaped() {
        let reg = LockRegistry::new(Duration::from_millis(0));
        let plan = PlanId::new();
        let branch = BranchName::root();
        let id = reg
            .acquire(plan, branch, Scope::Write, "s1", LockReason::Commit)
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let reclaimed = reg.reap_stale();
        assert_eq!(reclaimed, 1);
        assert!(reg.heartbeat(id).is_err());
    }

    #[test]
    fn write_conflicts_across_branches_on_same_plan() {
        let reg = registry();
        let plan = PlanId::new();
        reg.acquire(plan, BranchName::new("a"), Scope::Write, "s1", LockReason::Commit)
            .unwrap();
        let err = reg.acquire(plan, BranchName::new("b"), Scope::Write, "s2", LockReason::Commit);
        assert!(err.is_err());
    }

    #[test]
    fn reads_on_different_branches_conflict() {
        let reg = registry();
        let plan = PlanId::new();
        reg.acquire(plan, BranchName::new("a"), Scope::Read, "s1", LockReason::PlanSync)
            .unwrap();
        let err = reg.acquire(plan, BranchName::new("b"), Scope::Read, "s2", LockReason::PlanSync);
        assert!(err.is_err());
    }

    #[test]
    fn different_plans_never_conflict() {
        let reg = registry();
        reg.acquire(PlanId::new(), BranchName::new("a"), Scope::Write, "s1", LockReason::Commit)
            .unwrap();
        assert!(reg
            .acquire(PlanId::new(), BranchName::new("a"), Scope::Write, "s2", LockReason::Commit)
            .is_ok());
    }
}
