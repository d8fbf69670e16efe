//! The sentence pipeline shared by the live and simulator feeds.
//!
//! [`Pipeline`] takes complete lines, classifies them, drives the health
//! machine and the device-info tracker, and publishes every observable change
//! twice: as an [`AdaptorEvent`] on the broadcast channel and as a fresh
//! [`AdaptorState`] snapshot on the watch channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use flarmlink_core::events::AdaptorEvent;
use flarmlink_core::types::{AdaptorState, ConnectionStatus, DeviceInfo, LastFix};
use flarmlink_nmea::{ClassifiedSentence, SentenceCatalogue};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::device_info::DeviceInfoTracker;
use crate::health::HealthMonitor;

/// Per-connection data. Only exists while the status is not `Disconnected`.
#[derive(Debug)]
enum Session {
    Disconnected,
    Active {
        device: DeviceInfoTracker,
        last_fix: Option<LastFix>,
    },
}

/// Line-to-event pipeline.
pub(crate) struct Pipeline {
    catalogue: SentenceCatalogue,
    health: HealthMonitor,
    session: Session,
    known_good: Arc<HashSet<String>>,
    event_tx: broadcast::Sender<AdaptorEvent>,
    state_tx: watch::Sender<AdaptorState>,
}

impl Pipeline {
    /// A pipeline in the `Disconnected` state publishing to the given channels.
    pub(crate) fn new(
        catalogue: SentenceCatalogue,
        heartbeat_timeout: Duration,
        known_good: HashSet<String>,
        event_tx: broadcast::Sender<AdaptorEvent>,
        state_tx: watch::Sender<AdaptorState>,
    ) -> Self {
        Self {
            catalogue,
            health: HealthMonitor::new(heartbeat_timeout),
            session: Session::Disconnected,
            known_good: Arc::new(known_good),
            event_tx,
            state_tx,
        }
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> ConnectionStatus {
        self.health.status()
    }

    /// When the heartbeat expires, if it is armed.
    pub(crate) fn heartbeat_deadline(&self) -> Option<Instant> {
        self.health.heartbeat_deadline()
    }

    /// A feed (transport or replay) has started delivering.
    pub(crate) fn feed_started(&mut self, now: Instant) {
        let change = self.health.feed_started(now);
        if matches!(self.session, Session::Disconnected) {
            self.session = Session::Active {
                device: DeviceInfoTracker::new(Arc::clone(&self.known_good)),
                last_fix: None,
            };
        }
        if let Some(status) = change {
            self.emit(AdaptorEvent::StatusChanged { status });
        }
        self.publish();
    }

    /// Classify one line and apply its effects.
    ///
    /// Rejected lines are dropped and do not count as a heartbeat.
    pub(crate) fn process_line(&mut self, line: &str, now: Instant) {
        let sentence = match self.catalogue.classify(line) {
            Ok(sentence) => sentence,
            Err(rejection) => {
                tracing::trace!(line, %rejection, "rejected sentence");
                return;
            }
        };
        tracing::trace!(?sentence, "classified sentence");

        if let Some(status) = self.health.sentence_received(now) {
            self.emit(AdaptorEvent::StatusChanged { status });
        }

        let mut events = Vec::new();
        if let Session::Active { device, last_fix } = &mut self.session {
            events.extend(device.apply(&sentence).into_iter().map(AdaptorEvent::from));

            if let ClassifiedSentence::PositionFix {
                altitude_m,
                fix_time,
                ..
            } = &sentence
            {
                let fix = LastFix {
                    altitude_m: *altitude_m,
                    time: *fix_time,
                };
                if *last_fix != Some(fix) {
                    *last_fix = Some(fix);
                    events.push(AdaptorEvent::LastFixChanged { fix: Some(fix) });
                }
            }
        }

        for event in events {
            if let AdaptorEvent::SelfTestFailed { text } = &event {
                tracing::warn!(text = %text, "FLARM self-test failed");
            }
            self.emit(event);
        }
        self.publish();
    }

    /// The heartbeat timer fired.
    pub(crate) fn heartbeat_expired(&mut self, now: Instant) {
        if let Some(status) = self.health.heartbeat_expired(now) {
            self.emit(AdaptorEvent::StatusChanged { status });
            self.publish();
        }
    }

    /// The feed ended. Clears all per-connection data.
    pub(crate) fn disconnected(&mut self) {
        let Some(status) = self.health.disconnected() else {
            return;
        };
        self.emit(AdaptorEvent::StatusChanged { status });

        if let Session::Active {
            mut device,
            last_fix,
        } = std::mem::replace(&mut self.session, Session::Disconnected)
        {
            for change in device.reset() {
                self.emit(change.into());
            }
            if last_fix.is_some() {
                self.emit(AdaptorEvent::LastFixChanged { fix: None });
            }
        }
        self.publish();
    }

    /// Report a new connection attempt.
    pub(crate) fn reconnecting(&self, attempt: u32) {
        self.emit(AdaptorEvent::Reconnecting { attempt });
    }

    /// Report an advisory error.
    pub(crate) fn runtime_error(&self, message: impl Into<String>) {
        self.emit(AdaptorEvent::RuntimeError {
            message: message.into(),
        });
    }

    fn emit(&self, event: AdaptorEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn snapshot(&self) -> AdaptorState {
        let (device_info, last_fix) = match &self.session {
            Session::Active { device, last_fix } => (device.info().clone(), *last_fix),
            Session::Disconnected => (DeviceInfo::default(), None),
        };
        AdaptorState {
            status: self.health.status(),
            device_info,
            last_fix,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.state_tx.send_if_modified(|state| {
            if *state == snapshot {
                return false;
            }
            *state = snapshot;
            true
        });
    }
}
