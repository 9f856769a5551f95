//! Mutual-exclusion gate for cross-cutting session transitions.
//!
//! Two independent single-winner locks: the reconfiguration lock (a
//! browser-initiated download and a server-initiated instruction must not
//! both proceed) and the session lock (teardown must not race a
//! lock-screen activation). Acquisition is an atomic compare-and-swap, so
//! exactly one of any number of racing callers wins.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide coordination gate.
///
/// Shared by `Arc` between the operation sequence's task and host
/// dispatch tasks. Releasing a lock that is not held is a no-op.
#[derive(Debug, Default)]
pub struct Coordinator {
    reconfiguration: AtomicBool,
    session: AtomicBool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the reconfiguration lock.
    ///
    /// Returns `true` only for the caller that performed the
    /// false-to-true transition.
    pub fn request_reconfiguration_lock(&self) -> bool {
        self.reconfiguration
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the reconfiguration lock. Idempotent.
    pub fn release_reconfiguration_lock(&self) {
        self.reconfiguration.store(false, Ordering::Release);
    }

    pub fn is_reconfiguration_locked(&self) -> bool {
        self.reconfiguration.load(Ordering::Acquire)
    }

    /// Try to acquire the session lock.
    ///
    /// Returns `true` only for the caller that performed the
    /// false-to-true transition.
    pub fn request_session_lock(&self) -> bool {
        self.session
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the session lock. Idempotent.
    pub fn release_session_lock(&self) {
        self.session.store(false, Ordering::Release);
    }

    pub fn is_session_locked(&self) -> bool {
        self.session.load(Ordering::Acquire)
    }
}
