//! Observable value types shared by the adaptor and its consumers.

use std::fmt;

use chrono::NaiveTime;

/// Connectivity of the FLARM data feed.
///
/// There is exactly one authoritative status, owned by the adaptor's health
/// state machine. Consumers observe it; they never set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// A device is connected and valid sentences are arriving.
    Connected,
    /// A device is connected, but no valid sentence has arrived within the
    /// heartbeat window.
    WaitingForData,
    /// No device is connected (or replay is not running).
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    /// Human-readable description, suitable for a status line in a UI.
    pub fn description(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "FLARM device connected, receiving data",
            ConnectionStatus::WaitingForData => {
                "FLARM device connected, waiting for data"
            }
            ConnectionStatus::Disconnected => "No FLARM device connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::WaitingForData => write!(f, "WaitingForData"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Identity and self-test information reported by the device.
///
/// Every field is `None` until the corresponding sentence has been seen on
/// the current connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Hardware version from `PFLAV`.
    pub hardware_version: Option<String>,
    /// Firmware version from `PFLAV`.
    pub software_version: Option<String>,
    /// Name of the installed obstacle database from `PFLAV`.
    pub obstacle_database_version: Option<String>,
    /// Text of the most recent self-test result from `PFLAE`.
    pub self_test_result: Option<String>,
}

impl DeviceInfo {
    /// Returns `true` when no field has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.hardware_version.is_none()
            && self.software_version.is_none()
            && self.obstacle_database_version.is_none()
            && self.self_test_result.is_none()
    }
}

/// Altitude and UTC time of the most recent position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastFix {
    /// Altitude above mean sea level, in metres.
    pub altitude_m: f64,
    /// UTC time of day at which the fix was taken.
    pub time: NaiveTime,
}

impl fmt::Display for LastFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} m at {} UTC", self.altitude_m, self.time.format("%H:%M:%S"))
    }
}

/// Consistent snapshot of everything the adaptor exposes.
///
/// Published as a whole, so a reader never sees device information from a
/// previous connection next to a `Disconnected` status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdaptorState {
    /// Current connectivity.
    pub status: ConnectionStatus,
    /// Device identity and self-test of the current connection.
    pub device_info: DeviceInfo,
    /// Most recent fix of the current connection.
    pub last_fix: Option<LastFix>,
}
