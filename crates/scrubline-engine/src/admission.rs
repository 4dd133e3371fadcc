//! Counting semaphores for decode admission control (spec §4.4).
//!
//! Grounded on the teacher's `probe_sem: Arc<(Mutex<u32>, Condvar)>` pattern
//! in `velocut-media/src/worker.rs` (`MediaWorker::probe_clip`), including its
//! RAII release guard — generalized here to a reusable type with a
//! `try_acquire` variant (the scrub path never blocks a decode loop waiting
//! for a slot, it moves on to the next candidate frame instead).

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct SemState {
    count: Mutex<u32>,
    cvar: Condvar,
}

/// A bounded counting semaphore. Cheap to clone (shares the inner `Arc`).
#[derive(Clone)]
pub struct Semaphore {
    state: Arc<SemState>,
}

impl Semaphore {
    pub fn new() -> Self {
        Self { state: Arc::new(SemState { count: Mutex::new(0), cvar: Condvar::new() }) }
    }

    pub fn in_use(&self) -> u32 {
        *self.state.count.lock()
    }

    /// Acquire a slot if fewer than `capacity` are held, else return `None`
    /// immediately (never blocks — admission failures are handled by the
    /// caller retrying later, not by parking the decode loop).
    pub fn try_acquire(&self, capacity: u32) -> Option<SemaphoreGuard> {
        let mut count = self.state.count.lock();
        if *count < capacity {
            *count += 1;
            Some(SemaphoreGuard { state: Arc::clone(&self.state) })
        } else {
            None
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SemaphoreGuard {
    state: Arc<SemState>,
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        let mut count = self.state.count.lock();
        *count = count.saturating_sub(1);
        self.state.cvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_beyond_capacity_and_frees_on_drop() {
        let sem = Semaphore::new();
        let a = sem.try_acquire(1).unwrap();
        assert!(sem.try_acquire(1).is_none());
        drop(a);
        assert!(sem.try_acquire(1).is_some());
    }
}
