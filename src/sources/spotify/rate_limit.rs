//! Global "do not call before" marker for the catalog API.
//!
//! The remote enforces a single limit across every endpoint, so one guard
//! is shared (via `Arc`) by all entity kinds. Updates take the maximum of
//! the stored instant and the new one, so a late response carrying a short
//! `Retry-After` can never shorten a longer wait that is already in force.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Longest block ever recorded, whatever the remote asks for.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
pub struct RateLimitGuard {
    retry_after: Mutex<Option<Instant>>,
}

impl RateLimitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self) -> bool {
        self.remaining().is_some()
    }

    /// Time left until the catalog may be called again, if any.
    pub fn remaining(&self) -> Option<Duration> {
        let retry_after = (*self.retry_after.lock())?;
        let now = Instant::now();
        (retry_after > now).then(|| retry_after - now)
    }

    pub fn record_rate_limited(&self, retry_after: Duration) {
        let retry_after = retry_after.min(MAX_RETRY_AFTER);
        let Some(candidate) = Instant::now().checked_add(retry_after) else {
            warn!("⚠️ Retry-After fuera de rango, se ignora: {:?}", retry_after);
            return;
        };
        let mut slot = self.retry_after.lock();
        match *slot {
            Some(current) if current >= candidate => {}
            _ => {
                *slot = Some(candidate);
                warn!(
                    "⏳ Catálogo con rate limit, bloqueado durante {}",
                    humantime::format_duration(retry_after)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_blocks_for_the_reported_window() {
        let guard = RateLimitGuard::new();
        assert!(!guard.is_blocked());

        guard.record_rate_limited(Duration::from_secs(30));
        assert!(guard.is_blocked());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(guard.is_blocked());
        assert!(guard.remaining().unwrap() <= Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!guard.is_blocked());
        assert_eq!(guard.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_wait_never_lowers_retry_after() {
        let guard = RateLimitGuard::new();
        guard.record_rate_limited(Duration::from_secs(60));
        guard.record_rate_limited(Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(guard.is_blocked());

        guard.record_rate_limited(Duration::from_secs(120));
        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(guard.is_blocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_wait_is_capped_to_one_day() {
        let guard = RateLimitGuard::new();
        guard.record_rate_limited(Duration::MAX);
        guard.record_rate_limited(Duration::from_secs(u64::MAX));

        assert_eq!(guard.remaining(), Some(MAX_RETRY_AFTER));

        tokio::time::advance(MAX_RETRY_AFTER + Duration::from_secs(1)).await;
        assert!(!guard.is_blocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_agree() {
        let guard = Arc::new(RateLimitGuard::new());
        guard.record_rate_limited(Duration::from_secs(30));

        let readers: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.is_blocked() })
            })
            .collect();
        for reader in readers {
            assert!(reader.await.unwrap());
        }

        tokio::time::advance(Duration::from_secs(31)).await;

        let readers: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                tokio::spawn(async move { guard.is_blocked() })
            })
            .collect();
        for reader in readers {
            assert!(!reader.await.unwrap());
        }
    }
}
