//! Background thread that refreshes a batch of held locks at a fixed
//! interval for as long as their owning operation runs.

use plandex_core_types::{CancellationToken, LockId};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::lock_registry::LockRegistry;

/// Refreshes `last-heartbeat-at` for a set of locks until [`Self::stop`]
/// is called or the driver is dropped.
///
/// A heartbeat write failure is logged but never stops the driver or
/// cancels the operation: if heartbeats then lapse past the stale
/// threshold, another caller may reclaim the lock, which is the correct
/// behavior for a hung process.
pub struct HeartbeatDriver {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatDriver {
    /// Start refreshing `locks` every `interval` in a dedicated thread.
    pub fn start(registry: Arc<LockRegistry>, locks: Vec<LockId>, interval: Duration) -> Self {
        let stop = CancellationToken::new();
        let stop_for_thread = stop.clone();
        let handle = thread::spawn(move || {
            while !stop_for_thread.wait_timeout(interval) {
                for id in &locks {
                    if let Err(err) = registry.heartbeat(*id) {
                        tracing::warn!(lock_id = %id, error = %err, "heartbeat failed");
                    }
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the driver and wait for its thread to exit.
    pub fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatDriver {
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
    use plandex_core_types::{BranchName, PlanId, Scope};
    use std::time::Duration as StdDuration;

    #[test]
    fn heartbeat_keeps_lock_fresh() {
        let registry = Arc::new(LockRegistry::new(StdDuration::from_millis(50)));
        let plan = PlanId::new();
        let id = registry
            .acquire(
                plan,
                BranchName::root(),
                Scope::Write,
                "s1",
                crate::reason::LockReason::Commit,
            )
            .unwrap();
        let driver = HeartbeatDriver::start(registry.clone(), vec![id], StdDuration::from_millis(10));
        thread::sleep(StdDuration::from_millis(120));
        assert_eq!(registry.reap_stale(), 0);
        driver.stop();
    }
}
