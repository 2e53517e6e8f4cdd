//! Non-blocking connection ceilings for image downloads.
//!
//! Two ceilings apply to every transfer: one per host and one across all
//! hosts. Acquisition never waits. When either ceiling is saturated the
//! caller gets `None` and is expected to retry after some transfer finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct ConnectionLimiter {
    total: Arc<Semaphore>,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    max_per_host: usize,
    max_total: usize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

/// Held for the duration of one transfer. Both slots are released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _host: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ConnectionLimiter {
    /// Ceilings of zero are raised to one so the limiter can make progress.
    pub fn new(max_per_host: usize, max_total: usize) -> Self {
        let max_per_host = max_per_host.max(1);
        let max_total = max_total.max(1);
        Self {
            total: Arc::new(Semaphore::new(max_total)),
            per_host: Mutex::new(HashMap::new()),
            max_per_host,
            max_total,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Take one slot for `host`, or `None` if a ceiling is reached.
    ///
    /// Hosts with no transfer in flight are dropped from the table here, so
    /// it only ever holds the hosts currently being downloaded from.
    pub fn try_acquire(&self, host: &str) -> Option<ConnectionPermit> {
        let host_permit = {
            let mut hosts = self
                .per_host
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            hosts.retain(|_, semaphore| semaphore.available_permits() < self.max_per_host);
            let semaphore = hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)));
            Arc::clone(semaphore).try_acquire_owned().ok()?
        };

        let total_permit = Arc::clone(&self.total).try_acquire_owned().ok()?;

        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);

        Some(ConnectionPermit {
            _host: host_permit,
            _total: total_permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Hosts currently tracked by the per-host ceiling.
    pub fn tracked_hosts(&self) -> usize {
        self.per_host
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn max_per_host(&self) -> usize {
        self.max_per_host
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_host_ceiling() {
        let limiter = ConnectionLimiter::new(2, 10);
        let a = limiter.try_acquire("a.test").unwrap();
        let _b = limiter.try_acquire("a.test").unwrap();
        assert!(limiter.try_acquire("a.test").is_none());

        // other hosts are unaffected
        assert!(limiter.try_acquire("b.test").is_some());

        drop(a);
        assert!(limiter.try_acquire("a.test").is_some());
    }

    #[test]
    fn test_total_ceiling_spans_hosts() {
        let limiter = ConnectionLimiter::new(4, 2);
        let _a = limiter.try_acquire("a.test").unwrap();
        let _b = limiter.try_acquire("b.test").unwrap();
        assert!(limiter.try_acquire("c.test").is_none());
        assert_eq!(limiter.in_flight(), 2);
    }

    #[test]
    fn test_refused_total_does_not_leak_host_slot() {
        let limiter = ConnectionLimiter::new(1, 1);
        let held = limiter.try_acquire("a.test").unwrap();
        assert!(limiter.try_acquire("b.test").is_none());
        drop(held);
        // b.test's host slot was returned when the total ceiling refused it
        assert!(limiter.try_acquire("b.test").is_some());
    }

    #[test]
    fn test_in_flight_and_peak() {
        let limiter = ConnectionLimiter::new(4, 4);
        let permits: Vec<_> = (0..3)
            .map(|_| limiter.try_acquire("a.test").unwrap())
            .collect();
        assert_eq!(limiter.in_flight(), 3);
        drop(permits);
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.peak_in_flight(), 3);
    }

    #[test]
    fn test_idle_hosts_are_forgotten() {
        let limiter = ConnectionLimiter::new(2, 1000);
        for i in 0..500 {
            let permit = limiter.try_acquire(&format!("host-{}.test", i)).unwrap();
            drop(permit);
        }
        assert!(limiter.tracked_hosts() <= 1);

        // a busy host keeps its entry and its ceiling
        let _a = limiter.try_acquire("a.test").unwrap();
        let _b = limiter.try_acquire("a.test").unwrap();
        let _other = limiter.try_acquire("other.test").unwrap();
        assert!(limiter.try_acquire("a.test").is_none());
        assert_eq!(limiter.tracked_hosts(), 2);
    }

    #[test]
    fn test_zero_ceiling_is_raised() {
        let limiter = ConnectionLimiter::new(0, 0);
        assert_eq!(limiter.max_per_host(), 1);
        assert_eq!(limiter.max_total(), 1);
        assert!(limiter.try_acquire("a.test").is_some());
    }
}
