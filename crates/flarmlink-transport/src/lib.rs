//! Transport implementations for flarmlink.
//!
//! This crate provides the concrete [`Transport`](flarmlink_core::Transport)
//! and [`Connector`](flarmlink_core::Connector) for FLARM devices that serve
//! their data port over TCP:
//!
//! - [`TcpTransport`]: one open connection to the data port
//! - [`TcpConnector`]: opens a new [`TcpTransport`] per connection attempt

pub mod tcp;

pub use tcp::{DEFAULT_CONNECT_TIMEOUT, TcpConnector, TcpTransport};
