//! Transport traits for the FLARM data port.
//!
//! The [`Transport`] trait abstracts over the byte stream coming from the
//! device, and [`Connector`] abstracts over how a fresh stream is opened for
//! each connection attempt. The adaptor's connection manager only talks to
//! these traits, so it can be driven by a real TCP socket in production and
//! by `MockConnector`/`MockTransport` from `flarmlink-test-harness` in tests.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a FLARM device.
///
/// `receive` must be cancel-safe: if the returned future is dropped before
/// it completes, no data may be lost. The connection manager races reads
/// against timers and control requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// The adaptor itself only consumes the inbound direction; this exists
    /// for tools that query the device (e.g. `$PFLAV,R*hh`).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data and
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if none
    /// arrives. A peer close is reported as
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost).
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected). Closing
    /// twice is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Opens a new [`Transport`] to a fixed endpoint.
///
/// Called once per connection attempt; a failed attempt is retried by the
/// connection manager after its reconnect interval.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attempt one connection.
    async fn connect(&self) -> Result<Box<dyn Transport>>;

    /// Endpoint description for logging, e.g. `"192.168.1.1:2000"`.
    fn endpoint(&self) -> String;
}
