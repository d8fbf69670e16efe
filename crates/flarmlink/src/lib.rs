//! # flarmlink -- Live telemetry from FLARM devices
//!
//! `flarmlink` connects to the NMEA data port of a FLARM collision-avoidance
//! device (normally `192.168.1.1:2000` on the cockpit WiFi), reassembles and
//! validates the sentence stream, and exposes what it learns as observable
//! state: connection health, device identity, self-test result and the most
//! recent position fix.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flarmlink::{AdaptorEvent, FlarmAdaptorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let adaptor = FlarmAdaptorBuilder::new()
//!         .host("192.168.1.1")
//!         .port(2000)
//!         .build()
//!         .await?;
//!     let mut events = adaptor.subscribe();
//!     adaptor.start().await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let AdaptorEvent::StatusChanged { status } = event {
//!             println!("status: {}", status);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                    | Purpose                                         |
//! |--------------------------|-------------------------------------------------|
//! | `flarmlink-core`         | Observable types, events, errors, transport traits |
//! | `flarmlink-transport`    | TCP transport and connector                     |
//! | `flarmlink-nmea`         | Framing, checksums, sentence classification     |
//! | **`flarmlink`**          | This crate -- the adaptor engine and replay     |
//!
//! A single engine task owns the connection, the reconnect backoff, the
//! heartbeat deadline and the simulator replay timer. The
//! [`FlarmAdaptor`] handle talks to it over a request channel and observes
//! it through a broadcast channel of [`AdaptorEvent`]s and a watch channel
//! holding the current [`AdaptorState`].
//!
//! ## Simulator mode
//!
//! Instead of a device, the adaptor can replay a recorded log (see
//! [`replay`] for the format). Replay goes through exactly the same pipeline
//! as live data, so health transitions and device info behave identically.
//! [`FlarmAdaptorBuilder::capture_file`] records a live session in the same
//! format.

mod adaptor;
mod builder;
pub mod device_info;
pub mod health;
mod io;
mod pipeline;
pub mod replay;

pub use adaptor::FlarmAdaptor;
pub use builder::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
    DEFAULT_RECONNECT_INTERVAL, FlarmAdaptorBuilder,
};
pub use device_info::{DeviceInfoChange, DeviceInfoTracker};
pub use health::{DEFAULT_HEARTBEAT_TIMEOUT, HealthMonitor};
pub use replay::{CaptureWriter, SimulatorCursor, SimulatorLog, SimulatorRecord};

pub use flarmlink_core::*;
pub use flarmlink_nmea::{ClassifiedSentence, Rejection, SentenceCatalogue, SentenceKind};
