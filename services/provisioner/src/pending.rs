//! Executors planned but not yet resolved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Count of executors whose launch is still in flight.
#[derive(Debug, Default)]
pub struct PendingCounter {
    executors: AtomicU64,
}

impl PendingCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add `executors` until the returned lease is dropped.
    pub fn acquire(self: &Arc<Self>, executors: u32) -> PendingLease {
        self.executors
            .fetch_add(u64::from(executors), Ordering::SeqCst);
        PendingLease {
            counter: self.clone(),
            executors,
        }
    }

    pub fn get(&self) -> u64 {
        self.executors.load(Ordering::SeqCst)
    }
}

/// Holds executors in the pending count; releases them on drop.
#[derive(Debug)]
pub struct PendingLease {
    counter: Arc<PendingCounter>,
    executors: u32,
}

impl PendingLease {
    pub fn executors(&self) -> u32 {
        self.executors
    }
}

impl Drop for PendingLease {
    fn drop(&mut self) {
        self.counter
            .executors
            .fetch_sub(u64::from(self.executors), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_releases_on_drop() {
        let counter = PendingCounter::new();
        let a = counter.acquire(2);
        let b = counter.acquire(3);
        assert_eq!(counter.get(), 5);
        assert_eq!(b.executors(), 3);

        drop(a);
        assert_eq!(counter.get(), 3);
        drop(b);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_release_across_threads() {
        let counter = PendingCounter::new();
        let leases: Vec<_> = (0..16).map(|_| counter.acquire(1)).collect();
        assert_eq!(counter.get(), 16);

        let handles: Vec<_> = leases
            .into_iter()
            .map(|lease| std::thread::spawn(move || drop(lease)))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 0);
    }
}
