//! Per-key exponential backoff for the work queue
//!
//! Tracks consecutive failures per key and computes the delay before the next
//! retry: `base * 2^failures`, capped at a configured maximum. Forgetting a
//! key resets it to the initial delay.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;

/// Per-key exponential failure backoff.
///
/// All methods are non-blocking and safe to call from any task; state is a
/// single mutex-guarded map of consecutive-failure counts.
pub struct ItemBackoff<K> {
    base_delay: Duration,
    max_delay: Duration,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash + Clone> ItemBackoff<K> {
    /// Create a backoff policy with the given initial and maximum delays
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Compute the delay before the key may be retried, and record one more
    /// failure against it.
    ///
    /// The first call for a key yields the base delay; each subsequent call
    /// without an intervening [`forget`](Self::forget) doubles it, up to the
    /// cap. Delays are therefore non-decreasing per key.
    pub fn next_delay(&self, key: &K) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let exp = *count;
        *count = count.saturating_add(1);

        // Float math mirrors the cap-then-clamp behavior of the classic
        // workqueue limiter and avoids integer overflow at high counts.
        let delay = self.base_delay.as_secs_f64() * 2f64.powi(exp.min(i32::MAX as u32) as i32);
        if delay > self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Clear the failure count for the key.
    ///
    /// Called on success or when a key is dropped permanently, so backoff
    /// state cannot grow without bound.
    pub fn forget(&self, key: &K) {
        self.failures.lock().remove(key);
    }

    /// Number of failures recorded against the key since it was last forgotten
    pub fn retries(&self, key: &K) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}
