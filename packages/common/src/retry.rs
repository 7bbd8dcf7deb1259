//! Bounded retries with exponential backoff for transient job failures.
//!
//! Attempts are counted per image id in process memory, so a job that keeps
//! failing on one worker is dead-lettered after `max_retries` redeliveries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::config::DlqConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based.
    pub attempt: u8,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back off, then hand the job back to the broker.
    Retry { attempt: u8, delay: Duration },
    /// Give up; the history is what ends up in the dead-letter record.
    Exhausted { history: Vec<RetryAttempt> },
}

#[derive(Debug)]
struct Entry {
    history: Vec<RetryAttempt>,
    touched: Instant,
}

#[derive(Debug)]
pub struct RetryTracker {
    entries: HashMap<Uuid, Entry>,
    max_retries: u8,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryTracker {
    pub fn new(max_retries: u8, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &DlqConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Record a failed attempt for `key` and decide what happens next.
    ///
    /// The first `max_retries` failures are retried; the one after that
    /// exhausts the entry and forgets it.
    pub fn record_failure(&mut self, key: Uuid, error: impl Into<String>) -> RetryDecision {
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            history: Vec::new(),
            touched: Instant::now(),
        });
        let attempt = u8::try_from(entry.history.len() + 1).unwrap_or(u8::MAX);
        entry.touched = Instant::now();
        entry.history.push(RetryAttempt {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        });

        if attempt <= self.max_retries {
            RetryDecision::Retry {
                attempt,
                delay: backoff_delay(attempt, self.base_delay, self.max_delay),
            }
        } else {
            let history = self
                .entries
                .remove(&key)
                .map(|e| e.history)
                .unwrap_or_default();
            RetryDecision::Exhausted { history }
        }
    }

    pub fn clear(&mut self, key: Uuid) {
        self.entries.remove(&key);
    }

    pub fn attempts(&self, key: Uuid) -> usize {
        self.entries.get(&key).map_or(0, |e| e.history.len())
    }

    /// Forget keys that have not failed within `max_age`. Returns how many
    /// were dropped.
    pub fn evict_idle(&mut self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.touched.elapsed() < max_age);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `base * 2^(attempt-1)` plus up to 25% jitter, capped at `max`.
pub fn backoff_delay(attempt: u8, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(u32::from(attempt) - 1));
    let jitter = rand::rng().random_range(0..=delay_ms / 4);
    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}

/// Periodically evict idle tracker entries until `shutdown` flips to true.
pub fn spawn_eviction_task(
    tracker: Arc<Mutex<RetryTracker>>,
    every: Duration,
    max_age: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = tracker.lock().await.evict_idle(max_age);
                    if evicted > 0 {
                        info!(evicted, "Evicted idle retry tracker entries");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_retries: u8) -> RetryTracker {
        RetryTracker::new(max_retries, Duration::from_millis(100), Duration::from_secs(1))
    }

    #[test]
    fn backoff_doubles_within_jitter() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_secs(60);
        for (attempt, floor) in [(1u8, 1000u128), (2, 2000), (3, 4000)] {
            let ms = backoff_delay(attempt, base, max).as_millis();
            assert!(ms >= floor && ms <= floor + floor / 4, "attempt {attempt}: {ms}");
        }
        assert_eq!(backoff_delay(0, base, max), Duration::ZERO);
    }

    #[test]
    fn backoff_is_capped() {
        let d = backoff_delay(40, Duration::from_secs(10), Duration::from_secs(30));
        assert_eq!(d, Duration::from_secs(30));
    }

    #[test]
    fn exhausts_after_max_retries() {
        let mut t = tracker(2);
        let key = Uuid::now_v7();

        assert!(matches!(
            t.record_failure(key, "io timeout"),
            RetryDecision::Retry { attempt: 1, .. }
        ));
        assert!(matches!(
            t.record_failure(key, "io timeout"),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        match t.record_failure(key, "disk gone") {
            RetryDecision::Exhausted { history } => {
                let attempts: Vec<u8> = history.iter().map(|a| a.attempt).collect();
                assert_eq!(attempts, vec![1, 2, 3]);
                assert_eq!(history[2].error, "disk gone");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(t.attempts(key), 0);
    }

    #[test]
    fn zero_retries_exhausts_immediately() {
        let mut t = tracker(0);
        assert!(matches!(
            t.record_failure(Uuid::now_v7(), "boom"),
            RetryDecision::Exhausted { .. }
        ));
    }

    #[test]
    fn keys_are_independent_and_clearable() {
        let mut t = tracker(3);
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        t.record_failure(a, "x");
        t.record_failure(a, "x");
        t.record_failure(b, "y");
        assert_eq!((t.attempts(a), t.attempts(b)), (2, 1));

        t.clear(a);
        assert_eq!(t.attempts(a), 0);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn eviction_respects_age() {
        let mut t = tracker(3);
        t.record_failure(Uuid::now_v7(), "x");
        assert_eq!(t.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(t.evict_idle(Duration::ZERO), 1);
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn eviction_task_stops_on_shutdown() {
        let shared = Arc::new(Mutex::new(tracker(3)));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_eviction_task(
            shared,
            Duration::from_millis(10),
            Duration::from_secs(1),
            rx,
        );
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
