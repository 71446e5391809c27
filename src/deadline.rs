//! Request deadline.
//!
//! A deadline is fixed once at request entry and passed unmodified through the
//! dispatcher into whichever adapter handles the request.

use std::time::Duration;

use tokio::time::Instant;

/// Cap for deadlines that would otherwise overflow the clock (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Absolute expiry time attached to a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now, capped so huge timeouts never overflow.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(
            now.checked_add(timeout.min(FAR_FUTURE))
                .unwrap_or_else(|| now + Duration::from_secs(86400)),
        )
    }

    /// Deadline at an absolute instant.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Remaining time capped at `limit` (an adapter's own fixed timeout).
    pub fn bounded(&self, limit: Duration) -> Duration {
        self.remaining().min(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Duration::from_secs(2));
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_is_capped() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), FAR_FUTURE);
        assert_eq!(deadline.bounded(Duration::from_secs(5)), Duration::from_secs(5));

        let from_config = Deadline::after(Duration::from_secs(u64::MAX));
        assert_eq!(from_config.remaining(), FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_takes_smaller_limit() {
        let deadline = Deadline::after(Duration::from_secs(30));
        assert_eq!(deadline.bounded(Duration::from_secs(5)), Duration::from_secs(5));

        let short = Deadline::after(Duration::from_millis(200));
        assert_eq!(short.bounded(Duration::from_secs(5)), Duration::from_millis(200));
    }
}
