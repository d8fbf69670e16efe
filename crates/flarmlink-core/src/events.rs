//! Adaptor change notifications.
//!
//! Events are emitted through a [`tokio::sync::broadcast`] channel owned by
//! the adaptor whenever an observable value changes. A UI subscribes and
//! reacts; the adaptor never pushes anything else.

use crate::types::{ConnectionStatus, LastFix};

/// An event emitted by the adaptor when observable state changes.
///
/// Events are only emitted on actual changes: repeated sentences that leave
/// a value as it was do not produce an event. The one exception is
/// [`SelfTestFailed`](AdaptorEvent::SelfTestFailed), which fires for every
/// failing self-test report because it demands the pilot's attention.
#[derive(Debug, Clone, PartialEq)]
pub enum AdaptorEvent {
    /// The connectivity status changed.
    StatusChanged {
        /// The new status.
        status: ConnectionStatus,
    },

    /// The device hardware version changed (or was cleared).
    HardwareVersionChanged {
        /// New value, `None` when cleared on disconnect.
        version: Option<String>,
    },

    /// The device firmware version changed (or was cleared).
    SoftwareVersionChanged {
        /// New value, `None` when cleared on disconnect.
        version: Option<String>,
    },

    /// The obstacle database version changed (or was cleared).
    ObstacleDatabaseVersionChanged {
        /// New value, `None` when cleared on disconnect.
        version: Option<String>,
    },

    /// The self-test result text changed (or was cleared).
    SelfTestResultChanged {
        /// New value, `None` when cleared on disconnect.
        result: Option<String>,
    },

    /// The device reported a failing self-test.
    SelfTestFailed {
        /// The self-test text as reported.
        text: String,
    },

    /// A new position fix was received (or the fix was cleared).
    LastFixChanged {
        /// New value, `None` when cleared on disconnect.
        fix: Option<LastFix>,
    },

    /// A new connection attempt is starting after a failure or loss.
    Reconnecting {
        /// The reconnection attempt number (1-based).
        attempt: u32,
    },

    /// An advisory error that did not stop the adaptor, e.g. an unusable
    /// simulator log.
    RuntimeError {
        /// Description of the problem.
        message: String,
    },
}
