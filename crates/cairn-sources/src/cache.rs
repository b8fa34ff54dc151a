//! Time-bounded memoization of catalog fetches

use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default time a fetched catalog stays fresh
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Single-slot cache whose value expires after a TTL
#[derive(Debug)]
pub struct FetchCache<T> {
    ttl: Duration,
    entry: RwLock<Option<(Instant, T)>>,
}

impl<T: Clone> FetchCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Cached value if it is still within the TTL
    pub fn get(&self) -> Option<T> {
        let guard = self.entry.read().ok()?;
        match guard.as_ref() {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn put(&self, value: T) {
        if let Ok(mut guard) = self.entry.write() {
            *guard = Some((Instant::now(), value));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.entry.write() {
            *guard = None;
        }
    }
}

impl<T: Clone> Default for FetchCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
