//! Debug-build checks for the registry's lock hierarchy.
//!
//! Only the two synchronous locks are tracked, on a thread-local stack:
//!
//! 1. [`LockId::Registry`]: the key to cell map
//! 2. [`LockId::CellValue`]: one cell's cached running service
//!
//! A thread may only take a lock ranked strictly above every lock it holds,
//! and must release in reverse order. A cell's attempt lock is async and is
//! held across a whole start, so it is not on the stack; instead
//! [`assert_no_locks_held`] runs right before a caller queues on it.
//!
//! Release builds compile every check to nothing.

#[cfg(debug_assertions)]
use std::cell::RefCell;

/// Tracked locks, ranked by discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockId {
    Registry = 1,
    CellValue = 2,
}

impl LockId {
    pub fn name(&self) -> &'static str {
        match self {
            LockId::Registry => "registry",
            LockId::CellValue => "cell_value",
        }
    }
}

#[cfg(debug_assertions)]
thread_local! {
    static LOCK_STACK: RefCell<Vec<LockId>> = const { RefCell::new(Vec::new()) };
}

/// Record that `lock` is about to be taken.
///
/// # Panics
///
/// If a lock of equal or higher rank is already held on this thread.
#[cfg(debug_assertions)]
pub fn track_lock_acquisition(lock: LockId) {
    LOCK_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();

        if let Some(held) = stack.iter().find(|held| **held >= lock) {
            panic!(
                "Lock ordering violation: '{}' requested while '{}' is held \
                 (required order: registry, then cell_value)",
                lock.name(),
                held.name()
            );
        }

        stack.push(lock);
    });
}

/// Record that `lock` was just released.
///
/// # Panics
///
/// If `lock` is not the most recently acquired lock on this thread.
#[cfg(debug_assertions)]
pub fn track_lock_release(lock: LockId) {
    LOCK_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();

        match stack.pop() {
            Some(top_lock) if top_lock == lock => {}
            Some(top_lock) => panic!(
                "Lock release order violation: releasing '{}' while '{}' is on top",
                lock.name(),
                top_lock.name()
            ),
            None => panic!(
                "Lock release without acquisition: '{}' is not held",
                lock.name()
            ),
        }
    });
}

/// Called before waiting on a cell's attempt lock, which may block for the
/// full duration of another caller's start.
///
/// # Panics
///
/// If any tracked lock is held on this thread.
#[cfg(debug_assertions)]
pub fn assert_no_locks_held(waiting_for: &str) {
    LOCK_STACK.with(|stack| {
        if let Some(held) = stack.borrow().last() {
            panic!(
                "Blocking lock held across wait: '{}' is held while waiting for {}",
                held.name(),
                waiting_for
            );
        }
    });
}

#[cfg(not(debug_assertions))]
#[inline(always)]
pub fn track_lock_acquisition(_lock: LockId) {}

#[cfg(not(debug_assertions))]
#[inline(always)]
pub fn track_lock_release(_lock: LockId) {}

#[cfg(not(debug_assertions))]
#[inline(always)]
pub fn assert_no_locks_held(_waiting_for: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(debug_assertions)]
    fn test_valid_lock_order() {
        track_lock_acquisition(LockId::Registry);
        track_lock_acquisition(LockId::CellValue);

        track_lock_release(LockId::CellValue);
        track_lock_release(LockId::Registry);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Lock ordering violation")]
    fn test_invalid_lock_order() {
        track_lock_acquisition(LockId::CellValue);
        track_lock_acquisition(LockId::Registry);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Lock ordering violation")]
    fn test_reentrant_registry_lock() {
        // parking_lot mutexes are not reentrant; this would deadlock for real
        track_lock_acquisition(LockId::Registry);
        track_lock_acquisition(LockId::Registry);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Lock release order violation")]
    fn test_invalid_release_order() {
        track_lock_acquisition(LockId::Registry);
        track_lock_acquisition(LockId::CellValue);

        track_lock_release(LockId::Registry);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Lock release without acquisition")]
    fn test_release_without_acquisition() {
        track_lock_release(LockId::Registry);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_reacquisition_same_lock() {
        track_lock_acquisition(LockId::Registry);
        track_lock_release(LockId::Registry);
        track_lock_acquisition(LockId::Registry);
        track_lock_release(LockId::Registry);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_no_locks_held_passes_when_clear() {
        track_lock_acquisition(LockId::CellValue);
        track_lock_release(LockId::CellValue);
        assert_no_locks_held("attempt");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Blocking lock held across wait")]
    fn test_waiting_while_holding_registry_panics() {
        track_lock_acquisition(LockId::Registry);
        assert_no_locks_held("attempt");
    }
}
