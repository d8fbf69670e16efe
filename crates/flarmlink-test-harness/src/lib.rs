//! flarmlink-test-harness: mock transports and a scripted TCP feed for
//! testing flarmlink.
//!
//! - [`MockTransport`]: scripted reads (data, pauses, disconnects) on the
//!   tokio clock, for deterministic tests with paused time
//! - [`MockConnector`]: scripted connection outcomes for reconnect tests
//! - [`MockTcpServer`]: a real localhost listener serving a sentence feed

pub mod mock_connector;
pub mod mock_tcp;
pub mod mock_transport;

pub use mock_connector::{ConnectOutcome, MockConnector};
pub use mock_tcp::MockTcpServer;
pub use mock_transport::{MockTransport, Step};
