//! Pending clear-all confirmations.
//!
//! A clear is a two-step operation: the request hands out a single-use
//! token, and only presenting that token again performs the reset.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Outstanding clear requests keyed by token, with expiry.
#[derive(Clone)]
pub struct ClearConfirmations {
    pending: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    ttl: Duration,
}

impl ClearConfirmations {
    /// # Arguments
    /// * `ttl_seconds` - How long a pending clear stays confirmable, clamped
    ///   to what `chrono::Duration` can hold
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::try_seconds(ttl_seconds).unwrap_or(Duration::MAX),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        // The map holds no invariants a panicking holder could break
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a pending clear and returns its token (UUID v4).
    pub fn open(&self) -> String {
        let token = Uuid::new_v4().to_string();
        self.pending().insert(token.clone(), Utc::now());
        token
    }

    /// Consumes a token. True only if it existed and had not expired.
    pub fn consume(&self, token: &str) -> bool {
        let Some(created_at) = self.pending().remove(token) else {
            return false;
        };
        Utc::now() - created_at <= self.ttl
    }

    /// Drops a token without acting on it. True if it was pending.
    pub fn discard(&self, token: &str) -> bool {
        self.pending().remove(token).is_some()
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let ttl = self.ttl;
        self.pending().retain(|_, created_at| now - *created_at <= ttl);
    }

    pub fn count(&self) -> usize {
        self.pending().len()
    }
}

/// Background task pruning expired confirmations. A zero interval runs
/// every second.
pub async fn run_confirmation_cleanup(confirmations: ClearConfirmations, interval_seconds: u64) {
    let period = tokio::time::Duration::from_secs(interval_seconds.max(1));
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        confirmations.cleanup_expired();
        tracing::debug!(
            remaining = confirmations.count(),
            "Pending clear cleanup complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_consume() {
        let confirmations = ClearConfirmations::new(300);
        let token = confirmations.open();
        assert!(!token.is_empty());
        assert!(confirmations.consume(&token));
    }

    #[test]
    fn test_token_is_single_use() {
        let confirmations = ClearConfirmations::new(300);
        let token = confirmations.open();

        assert!(confirmations.consume(&token));
        assert!(!confirmations.consume(&token));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let confirmations = ClearConfirmations::new(300);
        assert!(!confirmations.consume("not-a-token"));
    }

    #[test]
    fn test_discarded_token_cannot_confirm() {
        let confirmations = ClearConfirmations::new(300);
        let token = confirmations.open();

        assert!(confirmations.discard(&token));
        assert!(!confirmations.discard(&token));
        assert!(!confirmations.consume(&token));
    }

    #[test]
    fn test_expired_token_rejected() {
        let confirmations = ClearConfirmations::new(1);
        let token = confirmations.open();

        std::thread::sleep(std::time::Duration::from_secs(2));

        assert!(!confirmations.consume(&token));
        assert_eq!(confirmations.count(), 0);
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let confirmations = ClearConfirmations::new(1);
        confirmations.open();
        confirmations.open();
        assert_eq!(confirmations.count(), 2);

        std::thread::sleep(std::time::Duration::from_secs(2));

        confirmations.cleanup_expired();
        assert_eq!(confirmations.count(), 0);
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let confirmations = ClearConfirmations::new(i64::MAX);
        assert_eq!(confirmations.ttl(), Duration::MAX);

        let token = confirmations.open();
        confirmations.cleanup_expired();
        assert!(confirmations.consume(&token));
    }

    #[tokio::test]
    async fn test_cleanup_task_survives_zero_interval() {
        let confirmations = ClearConfirmations::new(1);
        confirmations.open();

        let handle = tokio::spawn(run_confirmation_cleanup(confirmations.clone(), 0));
        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;

        assert!(!handle.is_finished());
        assert_eq!(confirmations.count(), 0);
        handle.abort();
    }
}
