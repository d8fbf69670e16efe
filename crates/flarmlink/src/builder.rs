//! FlarmAdaptorBuilder -- fluent builder for constructing [`FlarmAdaptor`] instances.
//!
//! Separates configuration from construction so that callers can set the
//! endpoint, timing, simulator file and sentence catalogue before the engine
//! task is spawned.
//!
//! # Example
//!
//! ```no_run
//! use flarmlink::FlarmAdaptorBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> flarmlink::Result<()> {
//! let adaptor = FlarmAdaptorBuilder::new()
//!     .host("192.168.1.1")
//!     .port(2000)
//!     .heartbeat_timeout(Duration::from_secs(5))
//!     .build()
//!     .await?;
//! adaptor.start().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flarmlink_core::error::{Error, Result};
use flarmlink_core::transport::Connector;
use flarmlink_core::types::AdaptorState;
use flarmlink_nmea::SentenceCatalogue;
use flarmlink_transport::{DEFAULT_CONNECT_TIMEOUT, TcpConnector};
use tokio::sync::{broadcast, watch};

use crate::adaptor::FlarmAdaptor;
use crate::device_info::default_known_good;
use crate::health::DEFAULT_HEARTBEAT_TIMEOUT;
use crate::io::{EngineConfig, spawn_engine};
use crate::pipeline::Pipeline;

/// Default address of the FLARM data port on the cockpit WiFi.
pub const DEFAULT_HOST: &str = "192.168.1.1";

/// Default TCP port of the FLARM data port.
pub const DEFAULT_PORT: u16 = 2000;

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default timeout of a single transport read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fluent builder for [`FlarmAdaptor`].
///
/// Every setting has a default, so the simplest usage is:
///
/// ```ignore
/// let adaptor = FlarmAdaptorBuilder::new().build().await?;
/// ```
pub struct FlarmAdaptorBuilder {
    host: String,
    port: u16,
    connect_timeout: Duration,
    reconnect_interval: Duration,
    heartbeat_timeout: Duration,
    read_timeout: Duration,
    simulator_file: Option<PathBuf>,
    capture_file: Option<PathBuf>,
    catalogue: SentenceCatalogue,
    known_good_self_test: HashSet<String>,
    event_capacity: usize,
}

impl Default for FlarmAdaptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlarmAdaptorBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        FlarmAdaptorBuilder {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            simulator_file: None,
            capture_file: None,
            catalogue: SentenceCatalogue::default(),
            known_good_self_test: default_known_good(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the device host name or IP address (default: `192.168.1.1`).
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the data port (default: 2000).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the timeout of a single connection attempt (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the delay before reconnecting after a failure (default: 5s).
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set how long the feed may stay silent before `Connected` degrades to
    /// `WaitingForData` (default: 5s).
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the timeout of a single transport read (default: 1s).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Replay this simulator log instead of connecting to a device.
    pub fn simulator_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.simulator_file = Some(path.into());
        self
    }

    /// Record every live sentence to this file in simulator-log format.
    pub fn capture_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.capture_file = Some(path.into());
        self
    }

    /// Use a custom sentence catalogue.
    pub fn catalogue(mut self, catalogue: SentenceCatalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    /// Set the self-test texts that do not count as failures
    /// (default: `{"OK"}`).
    pub fn known_good_self_test<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_good_self_test = texts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the capacity of the event channel (default: 256).
    ///
    /// Subscribers that fall further behind than this miss events and see
    /// `RecvError::Lagged`.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<()> {
        let durations = [
            ("connect_timeout", self.connect_timeout),
            ("reconnect_interval", self.reconnect_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("read_timeout", self.read_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::InvalidParameter(format!("{} must be non-zero", name)));
            }
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Build a [`FlarmAdaptor`] with a caller-provided connector.
    ///
    /// This is the primary entry point for testing (pass a `MockConnector`
    /// from `flarmlink-test-harness`). The host, port and connect timeout
    /// settings are ignored; the connector decides where to connect.
    ///
    /// Must be called from within a Tokio runtime. The adaptor starts
    /// stopped; call [`FlarmAdaptor::start`].
    pub async fn build_with_connector(self, connector: Box<dyn Connector>) -> Result<FlarmAdaptor> {
        self.validate()?;

        let (event_tx, _) = broadcast::channel(self.event_capacity);
        let (state_tx, state_rx) = watch::channel(AdaptorState::default());
        let pipeline = Pipeline::new(
            self.catalogue,
            self.heartbeat_timeout,
            self.known_good_self_test,
            event_tx.clone(),
            state_tx,
        );
        let config = EngineConfig {
            connector: Arc::from(connector),
            reconnect_interval: self.reconnect_interval,
            read_timeout: self.read_timeout,
            simulator_file: self.simulator_file,
            capture_file: self.capture_file,
        };

        let engine = spawn_engine(config, pipeline);
        Ok(FlarmAdaptor::new(engine, event_tx, state_rx))
    }

    /// Build a [`FlarmAdaptor`] that connects over TCP to `host:port`.
    pub async fn build(self) -> Result<FlarmAdaptor> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidParameter("host must not be empty".into()));
        }
        let endpoint = format!("{}:{}", self.host.trim(), self.port);
        let connector = TcpConnector::new(endpoint).with_timeout(self.connect_timeout);
        self.build_with_connector(Box::new(connector)).await
    }
}
