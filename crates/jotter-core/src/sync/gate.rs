//! In-memory busy flag for drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Busy flag shared by everything that may start a drain
///
/// Not persisted: after a crash the flag starts cleared and queue items are
/// left in their last committed state, which is safe to resume from.
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    busy: Arc<AtomicBool>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or `None` when a drain already holds it
    pub fn try_acquire(&self) -> Option<DrainPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Whether a drain currently holds the gate
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the gate; releases it on drop
#[derive(Debug)]
pub struct DrainPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for DrainPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_permit_drops() {
        let gate = SyncGate::new();

        let permit = gate.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());

        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn clones_share_one_flag() {
        let gate = SyncGate::new();
        let other = gate.clone();

        let _permit = gate.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[test]
    fn permit_releases_on_panic() {
        let gate = SyncGate::new();
        let inner = gate.clone();

        let result = std::panic::catch_unwind(move || {
            let _permit = inner.try_acquire().unwrap();
            panic!("drain blew up");
        });

        assert!(result.is_err());
        assert!(!gate.is_busy());
    }
}
