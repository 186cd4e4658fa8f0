use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::state::StopReason;

struct Inner {
    triggered: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    condvar: Condvar,
}

/// Run-wide cooperative stop flag.
///
/// Workers poll `is_triggered()` between grabs; the controlling thread
/// blocks in `wait_timeout()`. Triggering is write-once: the first reason
/// wins and later calls are no-ops.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                triggered: AtomicBool::new(false),
                reason: Mutex::new(None),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Raise the flag and wake every waiter.
    ///
    /// Returns `true` only for the call that actually raised it.
    pub fn trigger(&self, reason: StopReason) -> bool {
        let mut current = self.inner.reason.lock();
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        *current = Some(reason);
        self.inner.condvar.notify_all();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.inner.reason.lock()
    }

    /// Block until triggered or `timeout` elapses. Returns whether triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut reason = self.inner.reason.lock();
        if reason.is_none() {
            self.inner.condvar.wait_for(&mut reason, timeout);
        }
        reason.is_some()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("triggered", &self.is_triggered())
            .field("reason", &self.reason())
            .finish()
    }
}
