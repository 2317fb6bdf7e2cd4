//! Reconnection back-off state machine for offline peers (spec.md §4.1).
//!
//! Fixed-interval, not exponential — "preserved from source behavior" per
//! the spec. Shaped like the teacher's `ConnectionTracker`
//! (`connection_retry.rs`) but deliberately simpler: no jitter, no
//! multiplier, because the spec calls those out as not part of this
//! contract.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ReconnectState {
    pub state: ConnectionState,
    pub attempts: u32,
    pub next_attempt_at: Option<Instant>,
    base_interval: Duration,
    max_attempts: u32,
}

impl ReconnectState {
    pub fn new(base_interval: Duration, max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Connected,
            attempts: 0,
            next_attempt_at: None,
            base_interval,
            max_attempts,
        }
    }

    /// A successful observation resets the counter and transitions to
    /// `connected`, from any prior state.
    pub fn on_success(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.next_attempt_at = None;
    }

    /// The peer was just observed offline. On the first such observation
    /// this schedules the next retry; subsequent observations while
    /// already disconnected are absorbed by `on_attempt_failed`.
    pub fn on_disconnect(&mut self, now: Instant) {
        if self.state == ConnectionState::Failed {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.next_attempt_at = Some(now + self.base_interval);
    }

    /// A scheduled reconnect attempt failed. Fixed-base back-off: always
    /// retry at `now + base_interval`, never growing. After
    /// `max_attempts` consecutive failures, transition to `failed` and
    /// stop scheduling further attempts until externally reset.
    pub fn on_attempt_failed(&mut self, now: Instant) {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            self.state = ConnectionState::Failed;
            self.next_attempt_at = None;
        } else {
            self.state = ConnectionState::Reconnecting;
            self.next_attempt_at = Some(now + self.base_interval);
        }
    }

    pub fn due_for_retry(&self, now: Instant) -> bool {
        matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Reconnecting
        ) && self.next_attempt_at.map(|at| now >= at).unwrap_or(false)
    }

    /// Externally reset a `failed` peer so retries resume.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
        self.next_attempt_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_to_failed_after_max_attempts() {
        let mut s = ReconnectState::new(Duration::from_millis(1), 3);
        let now = Instant::now();
        s.on_disconnect(now);
        assert_eq!(s.state, ConnectionState::Disconnected);
        s.on_attempt_failed(now);
        assert_eq!(s.state, ConnectionState::Reconnecting);
        assert_eq!(s.attempts, 1);
        s.on_attempt_failed(now);
        s.on_attempt_failed(now);
        assert_eq!(s.state, ConnectionState::Failed);
        assert_eq!(s.attempts, 3);
        assert!(s.next_attempt_at.is_none());
    }

    #[test]
    fn success_resets_counter_from_any_state() {
        let mut s = ReconnectState::new(Duration::from_millis(1), 3);
        let now = Instant::now();
        s.on_disconnect(now);
        s.on_attempt_failed(now);
        s.on_attempt_failed(now);
        s.on_success();
        assert_eq!(s.state, ConnectionState::Connected);
        assert_eq!(s.attempts, 0);
        assert!(s.next_attempt_at.is_none());
    }

    #[test]
    fn backoff_interval_is_fixed_not_exponential() {
        let base = Duration::from_secs(10);
        let mut s = ReconnectState::new(base, 5);
        let now = Instant::now();
        s.on_disconnect(now);
        let first = s.next_attempt_at.unwrap();
        s.on_attempt_failed(now);
        let second = s.next_attempt_at.unwrap();
        // Both scheduled exactly `base` after their respective `now`, never growing.
        assert_eq!(first.duration_since(now), base);
        assert_eq!(second.duration_since(now), base);
    }
}
