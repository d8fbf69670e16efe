//! Connection health state machine.
//!
//! ```text
//!                 feed_started              sentence_received
//!  Disconnected ───────────────▶ WaitingForData ──────────────▶ Connected
//!       ▲                              ▲                            │
//!       │                              └──── heartbeat_expired ─────┘
//!       └────────────── disconnected (from any state) ──────────────┘
//! ```
//!
//! [`HealthMonitor`] is pure: it never reads the clock or sleeps. The engine
//! task passes `now` in and sleeps until [`HealthMonitor::heartbeat_deadline`]
//! itself.

use std::time::Duration;

use flarmlink_core::types::ConnectionStatus;
use tokio::time::Instant;

/// Default time without a valid sentence before `Connected` degrades to
/// `WaitingForData`.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the connectivity status and the heartbeat deadline.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    status: ConnectionStatus,
    heartbeat_timeout: Duration,
    deadline: Option<Instant>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_TIMEOUT)
    }
}

impl HealthMonitor {
    /// Create a monitor in `Disconnected` with the given heartbeat timeout.
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            heartbeat_timeout,
            deadline: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// When the heartbeat expires, if armed.
    pub fn heartbeat_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A transport connected or a replay started.
    pub fn feed_started(&mut self, now: Instant) -> Option<ConnectionStatus> {
        self.deadline = Some(now + self.heartbeat_timeout);
        if self.status == ConnectionStatus::Disconnected {
            return self.transition(ConnectionStatus::WaitingForData);
        }
        None
    }

    /// A valid sentence arrived.
    ///
    /// Ignored while `Disconnected`: only a started feed can leave that state.
    pub fn sentence_received(&mut self, now: Instant) -> Option<ConnectionStatus> {
        if self.status == ConnectionStatus::Disconnected {
            return None;
        }
        self.deadline = Some(now + self.heartbeat_timeout);
        self.transition(ConnectionStatus::Connected)
    }

    /// The heartbeat timer fired.
    ///
    /// Does nothing unless the heartbeat is armed and `now` has reached the
    /// deadline, so a stale wakeup cannot degrade a fresh connection.
    pub fn heartbeat_expired(&mut self, now: Instant) -> Option<ConnectionStatus> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                if self.status == ConnectionStatus::Connected {
                    return self.transition(ConnectionStatus::WaitingForData);
                }
                None
            }
            _ => None,
        }
    }

    /// The feed ended: transport lost, `stop()`, or end of replay.
    pub fn disconnected(&mut self) -> Option<ConnectionStatus> {
        self.deadline = None;
        self.transition(ConnectionStatus::Disconnected)
    }

    fn transition(&mut self, to: ConnectionStatus) -> Option<ConnectionStatus> {
        if self.status == to {
            return None;
        }
        tracing::debug!(from = %self.status, to = %to, "connection status changed");
        self.status = to;
        Some(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn connected_at(now: Instant) -> HealthMonitor {
        let mut health = HealthMonitor::new(TIMEOUT);
        health.feed_started(now);
        health.sentence_received(now);
        health
    }

    #[test]
    fn starts_disconnected_and_unarmed() {
        let health = HealthMonitor::default();
        assert_eq!(health.status(), ConnectionStatus::Disconnected);
        assert!(health.heartbeat_deadline().is_none());
    }

    #[test]
    fn feed_start_waits_for_data() {
        let now = Instant::now();
        let mut health = HealthMonitor::new(TIMEOUT);
        assert_eq!(
            health.feed_started(now),
            Some(ConnectionStatus::WaitingForData)
        );
        assert_eq!(health.heartbeat_deadline(), Some(now + TIMEOUT));
        assert_eq!(health.feed_started(now), None);
    }

    #[test]
    fn first_sentence_connects_then_debounces() {
        let now = Instant::now();
        let mut health = HealthMonitor::new(TIMEOUT);
        health.feed_started(now);

        assert_eq!(
            health.sentence_received(now),
            Some(ConnectionStatus::Connected)
        );
        let later = now + Duration::from_secs(1);
        assert_eq!(health.sentence_received(later), None);
        assert_eq!(health.heartbeat_deadline(), Some(later + TIMEOUT));
    }

    #[test]
    fn sentence_while_disconnected_is_ignored() {
        let mut health = HealthMonitor::new(TIMEOUT);
        assert_eq!(health.sentence_received(Instant::now()), None);
        assert_eq!(health.status(), ConnectionStatus::Disconnected);
        assert!(health.heartbeat_deadline().is_none());
    }

    #[test]
    fn heartbeat_expires_exactly_at_threshold() {
        let now = Instant::now();
        let mut health = connected_at(now);

        let just_before = now + TIMEOUT - Duration::from_millis(1);
        assert_eq!(health.heartbeat_expired(just_before), None);
        assert_eq!(health.status(), ConnectionStatus::Connected);

        assert_eq!(
            health.heartbeat_expired(now + TIMEOUT),
            Some(ConnectionStatus::WaitingForData)
        );
        assert!(health.heartbeat_deadline().is_none());
    }

    #[test]
    fn expiry_disarms_until_next_sentence() {
        let now = Instant::now();
        let mut health = connected_at(now);
        health.heartbeat_expired(now + TIMEOUT);
        assert_eq!(health.heartbeat_expired(now + TIMEOUT * 3), None);

        let resumed = now + TIMEOUT * 4;
        assert_eq!(
            health.sentence_received(resumed),
            Some(ConnectionStatus::Connected)
        );
        assert_eq!(health.heartbeat_deadline(), Some(resumed + TIMEOUT));
    }

    #[test]
    fn expiry_while_waiting_keeps_status() {
        let now = Instant::now();
        let mut health = HealthMonitor::new(TIMEOUT);
        health.feed_started(now);
        assert_eq!(health.heartbeat_expired(now + TIMEOUT), None);
        assert_eq!(health.status(), ConnectionStatus::WaitingForData);
    }

    #[test]
    fn disconnect_from_any_state() {
        let now = Instant::now();
        let mut health = connected_at(now);
        assert_eq!(
            health.disconnected(),
            Some(ConnectionStatus::Disconnected)
        );
        assert!(health.heartbeat_deadline().is_none());
        assert_eq!(health.disconnected(), None);

        health.feed_started(now);
        assert_eq!(
            health.disconnected(),
            Some(ConnectionStatus::Disconnected)
        );
    }
}
