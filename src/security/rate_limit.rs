use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

/// Sliding-window request counter keyed by caller identifier
#[derive(Debug, Default)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request for `identifier` if fewer than `limit` requests were
    /// seen within `window`. Rejected requests are not recorded.
    pub fn is_allowed(&self, identifier: &str, limit: usize, window: Duration) -> bool {
        self.is_allowed_at(identifier, limit, window, Instant::now())
    }

    fn is_allowed_at(&self, identifier: &str, limit: usize, window: Duration, now: Instant) -> bool {
        let mut requests = self.lock();
        let seen = requests.entry(identifier.to_string()).or_default();

        while let Some(oldest) = seen.front() {
            if now.saturating_duration_since(*oldest) >= window {
                seen.pop_front();
            } else {
                break;
            }
        }

        if seen.len() >= limit {
            return false;
        }

        seen.push_back(now);
        true
    }

    /// Drop requests older than `max_age` and forget idle identifiers.
    /// Returns the number of identifiers removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.cleanup_at(max_age, Instant::now())
    }

    fn cleanup_at(&self, max_age: Duration, now: Instant) -> usize {
        let mut requests = self.lock();
        let before = requests.len();

        requests.retain(|_, seen| {
            seen.retain(|t| now.saturating_duration_since(*t) < max_age);
            !seen.is_empty()
        });

        before - requests.len()
    }

    /// Run [`RateLimiter::cleanup`] on a fixed interval
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration, max_age: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = limiter.cleanup(max_age);
                if removed > 0 {
                    debug!(removed, "rate limiter dropped idle callers");
                }
            }
        })
    }

    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
