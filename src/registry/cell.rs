use crate::lock_order::{track_lock_acquisition, track_lock_release, LockId};
use crate::service::RunningService;
use tokio::sync::MutexGuard;

/// Per-key registry state.
///
/// # Mutex Type Selection
///
/// - **`tokio::sync::Mutex`** (`attempt`): held for the whole start attempt,
///   across `.await` points. This is the single-flight serialization point.
///   Tokio's mutex is FIFO, so queued callers are served in arrival order.
///
/// - **`parking_lot::RwLock`** (`running`): guards the cached descriptor for
///   brief synchronous reads and the one write after a successful attempt.
///   Lookups take only this lock, so they never wait on an attempt.
pub(crate) struct ServiceCell {
    attempt: tokio::sync::Mutex<()>,
    running: parking_lot::RwLock<Option<RunningService>>,
}

impl ServiceCell {
    pub(crate) fn new() -> Self {
        Self {
            attempt: tokio::sync::Mutex::new(()),
            running: parking_lot::RwLock::new(None),
        }
    }

    /// Wait until no other attempt for this key is in flight.
    pub(crate) async fn lock_attempt(&self) -> MutexGuard<'_, ()> {
        self.attempt.lock().await
    }

    /// Snapshot of the cached descriptor.
    pub(crate) fn cached(&self) -> Option<RunningService> {
        track_lock_acquisition(LockId::CellValue);
        let running = self.running.read().clone();
        track_lock_release(LockId::CellValue);
        running
    }

    /// Cache the result of a successful attempt.
    ///
    /// Callers must hold the attempt lock.
    pub(crate) fn store(&self, running: RunningService) {
        track_lock_acquisition(LockId::CellValue);
        *self.running.write() = Some(running);
        track_lock_release(LockId::CellValue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::service::ServiceKey;
    use std::time::Duration;

    fn running(host: &str) -> RunningService {
        RunningService::new(ServiceKey::new(Digest::from_string(host), "c1"), host)
    }

    #[test]
    fn test_new_cell_is_empty() {
        assert!(ServiceCell::new().cached().is_none());
    }

    #[test]
    fn test_store_then_cached() {
        let cell = ServiceCell::new();
        cell.store(running("db"));
        assert_eq!(cell.cached(), Some(running("db")));
    }

    #[tokio::test]
    async fn test_cached_does_not_wait_on_attempt() {
        let cell = ServiceCell::new();
        let _attempt = cell.lock_attempt().await;
        // A read while an attempt holds the lock must return immediately
        assert!(cell.cached().is_none());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), cell.lock_attempt())
                .await
                .is_err(),
            "second attempt should be queued behind the first"
        );
    }
}
