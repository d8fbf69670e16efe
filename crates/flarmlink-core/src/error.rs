//! Error types for flarmlink.
//!
//! Fallible operations across the workspace return [`Result<T>`], which uses
//! [`Error`] as the error type. None of these errors is fatal to the adaptor:
//! transport failures turn into a `Disconnected` status and a reconnect, and
//! simulator-log failures are reported to the caller of `start()`.

/// The error type for flarmlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP connect refused, DNS failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for a connection or for data.
    #[error("timeout waiting for device")]
    Timeout,

    /// An invalid configuration value was supplied.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No transport connection has been established.
    #[error("not connected")]
    NotConnected,

    /// The device closed the connection or it was reset.
    #[error("connection lost")]
    ConnectionLost,

    /// A simulator log could not be used.
    ///
    /// `line` is the 1-based line number of the offending record, or `0`
    /// when the file as a whole could not be read.
    #[error("simulator log error at line {line}: {reason}")]
    SimulatorLog {
        /// 1-based line number, `0` for whole-file failures.
        line: usize,
        /// What was wrong with the record.
        reason: String,
    },

    /// The adaptor's engine task has exited; no further requests are accepted.
    #[error("adaptor closed")]
    AdaptorClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
