//! Cooperative cancellation token shared by the queue dispatcher, the
//! heartbeat driver, and the file transaction engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Inner {
    cancelled: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// A cheaply-cloneable flag that signals cooperative cancellation.
///
/// Unlike a bare `Arc<AtomicBool>`, waiters can block on
/// [`CancellationToken::wait_timeout`] instead of spin-polling — used by
/// the heartbeat driver to sleep until either its interval elapses or the
/// owning operation finishes.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a fresh, non-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Signal cancellation and wake any thread blocked in [`Self::wait_timeout`].
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.inner.mutex.lock().unwrap();
        self.inner.condvar.notify_all();
    }

    /// True once [`Self::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Block up to `timeout`, returning early if cancelled in the
    /// meantime. Returns `true` if cancellation occurred.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let guard = self.inner.mutex.lock().unwrap();
        let (_guard, _result) = self
            .inner
            .condvar
            .wait_timeout_while(guard, timeout, |_| !self.is_cancelled())
            .unwrap();
        self.is_cancelled()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
