//! Accumulates device identity and self-test results for one connection.

use std::collections::HashSet;
use std::sync::Arc;

use flarmlink_core::events::AdaptorEvent;
use flarmlink_core::types::DeviceInfo;
use flarmlink_nmea::{ClassifiedSentence, SELF_TEST_OK};

/// One observable change produced by [`DeviceInfoTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceInfoChange {
    HardwareVersion(Option<String>),
    SoftwareVersion(Option<String>),
    ObstacleDatabaseVersion(Option<String>),
    SelfTestResult(Option<String>),
    /// A self-test report that is not in the known-good set.
    SelfTestFailed(String),
}

impl From<DeviceInfoChange> for AdaptorEvent {
    fn from(change: DeviceInfoChange) -> Self {
        match change {
            DeviceInfoChange::HardwareVersion(version) => {
                AdaptorEvent::HardwareVersionChanged { version }
            }
            DeviceInfoChange::SoftwareVersion(version) => {
                AdaptorEvent::SoftwareVersionChanged { version }
            }
            DeviceInfoChange::ObstacleDatabaseVersion(version) => {
                AdaptorEvent::ObstacleDatabaseVersionChanged { version }
            }
            DeviceInfoChange::SelfTestResult(result) => {
                AdaptorEvent::SelfTestResultChanged { result }
            }
            DeviceInfoChange::SelfTestFailed(text) => AdaptorEvent::SelfTestFailed { text },
        }
    }
}

/// The default known-good self-test set: just [`SELF_TEST_OK`].
pub fn default_known_good() -> HashSet<String> {
    HashSet::from([SELF_TEST_OK.to_string()])
}

/// Device information tracker.
///
/// Lives exactly as long as one connection session; the pipeline drops it
/// (after calling [`reset`](Self::reset)) on the transition into
/// `Disconnected`.
#[derive(Debug, Clone)]
pub struct DeviceInfoTracker {
    info: DeviceInfo,
    known_good: Arc<HashSet<String>>,
}

impl Default for DeviceInfoTracker {
    fn default() -> Self {
        Self::new(Arc::new(default_known_good()))
    }
}

impl DeviceInfoTracker {
    /// Create an empty tracker that treats `known_good` texts as passing
    /// self-tests.
    pub fn new(known_good: Arc<HashSet<String>>) -> Self {
        Self {
            info: DeviceInfo::default(),
            known_good,
        }
    }

    /// Current values.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Fold one sentence into the tracked fields.
    ///
    /// Only identity and self-test sentences matter here; anything else
    /// returns no changes.
    pub fn apply(&mut self, sentence: &ClassifiedSentence) -> Vec<DeviceInfoChange> {
        let mut changes = Vec::new();
        match sentence {
            ClassifiedSentence::DeviceIdentity {
                hardware_version,
                software_version,
                obstacle_database_version,
            } => {
                if replace(&mut self.info.hardware_version, hardware_version) {
                    changes.push(DeviceInfoChange::HardwareVersion(hardware_version.clone()));
                }
                if replace(&mut self.info.software_version, software_version) {
                    changes.push(DeviceInfoChange::SoftwareVersion(software_version.clone()));
                }
                if replace(
                    &mut self.info.obstacle_database_version,
                    obstacle_database_version,
                ) {
                    changes.push(DeviceInfoChange::ObstacleDatabaseVersion(
                        obstacle_database_version.clone(),
                    ));
                }
            }
            ClassifiedSentence::SelfTestResult { text } => {
                let value = Some(text.clone());
                if replace(&mut self.info.self_test_result, &value) {
                    changes.push(DeviceInfoChange::SelfTestResult(value));
                }
                if !text.is_empty() && !self.known_good.contains(text) {
                    changes.push(DeviceInfoChange::SelfTestFailed(text.clone()));
                }
            }
            ClassifiedSentence::PositionFix { .. } | ClassifiedSentence::Unrecognized { .. } => {}
        }
        changes
    }

    /// Clear every field, reporting the ones that were set.
    pub fn reset(&mut self) -> Vec<DeviceInfoChange> {
        let old = std::mem::take(&mut self.info);
        let mut changes = Vec::new();
        if old.hardware_version.is_some() {
            changes.push(DeviceInfoChange::HardwareVersion(None));
        }
        if old.software_version.is_some() {
            changes.push(DeviceInfoChange::SoftwareVersion(None));
        }
        if old.obstacle_database_version.is_some() {
            changes.push(DeviceInfoChange::ObstacleDatabaseVersion(None));
        }
        if old.self_test_result.is_some() {
            changes.push(DeviceInfoChange::SelfTestResult(None));
        }
        changes
    }
}

/// Overwrite `slot` with `value`; returns whether it changed.
fn replace(slot: &mut Option<String>, value: &Option<String>) -> bool {
    if slot == value {
        return false;
    }
    slot.clone_from(value);
    true
}
