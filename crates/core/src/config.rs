//! Every tunable the embedding process may override, collected in one
//! place rather than scattered as free function arguments, in the same
//! `WalConfig`/`DatabasePaths`-style configuration-struct shape used
//! elsewhere in this durability layer.

use std::path::PathBuf;
use std::time::Duration;

/// Retry/backoff parameters for lock acquisition (default: base 300ms,
/// factor 2.0, 30% jitter, 5 attempts).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per additional attempt.
    pub factor: f64,
    /// Fraction of the computed delay randomized as jitter, e.g. `0.3`.
    pub jitter: f64,
    /// Maximum number of acquisition attempts before giving up.
    pub max_attempts: u32,
}

impl RetryConfig {
    /// Compute the delay for a zero-indexed attempt number, before
    /// jitter is applied.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.base_delay.as_secs_f64() * 1000.0 * self.factor.powi(attempt as i32);
        Duration::from_secs_f64(millis / 1000.0)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(300),
            factor: 2.0,
            jitter: 0.3,
            max_attempts: 5,
        }
    }
}

/// Policy governing when discarded workspaces are actually removed from
/// disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkspaceCleanupPolicy {
    /// Discarded workspaces older than this many days are eligible for
    /// removal.
    pub stale_after_days: u32,
    /// Maximum number of workspaces removed per cleanup pass.
    pub batch_size: usize,
    /// If true, discarded workspaces are kept on disk (for forensics)
    /// rather than deleted by cleanup.
    pub retain_discarded: bool,
}

impl Default for WorkspaceCleanupPolicy {
    fn default() -> Self {
        Self {
            stale_after_days: 7,
            batch_size: 50,
            retain_discarded: false,
        }
    }
}

/// Top-level configuration for the whole stack: lock registry, operation
/// queue, file transaction engine, and workspace manager.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Root directory the embedding process operates under. All plan and
    /// WAL paths are resolved relative to this and canonicalized at
    /// startup.
    pub project_root: PathBuf,
    /// Home directory workspaces are stored under (`<home>/.plandex-home`).
    /// Defaults to `<project_root>/.plandex-home` but is normally
    /// overridden to the user's real home directory by the embedding
    /// process.
    pub home_dir: PathBuf,
    /// Locks with no heartbeat for longer than this are reapable.
    pub stale_lock_threshold: Duration,
    /// Interval at which the heartbeat driver refreshes held locks.
    pub heartbeat_interval: Duration,
    /// Interval at which the background reaper sweeps for stale locks.
    pub reaper_interval: Duration,
    /// Lock acquisition retry/backoff parameters.
    pub retry: RetryConfig,
    /// Workspace cleanup policy.
    pub workspace_cleanup: WorkspaceCleanupPolicy,
}

impl CoreConfig {
    /// Build a config rooted at `project_root` with every other field at
    /// its documented default.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let home_dir = project_root.join(".plandex-home");
        Self {
            project_root,
            home_dir,
            stale_lock_threshold: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
            reaper_interval: Duration::from_secs(30),
            retry: RetryConfig::default(),
            workspace_cleanup: WorkspaceCleanupPolicy::default(),
        }
    }

    /// Override the home directory workspaces are stored under.
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = home_dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CoreConfig::new("/tmp/project");
        assert_eq!(cfg.stale_lock_threshold, Duration::from_secs(60));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(cfg.reaper_interval, Duration::from_secs(30));
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.factor, 2.0);
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let retry = RetryConfig::default();
        let d0 = retry.base_delay_for_attempt(0);
        let d1 = retry.base_delay_for_attempt(1);
        let d2 = retry.base_delay_for_attempt(2);
        assert_eq!(d0, Duration::from_millis(300));
        assert_eq!(d1, Duration::from_millis(600));
        assert_eq!(d2, Duration::from_millis(1200));
    }
}
