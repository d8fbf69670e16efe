//! flarmlink-core: Core types, events, and error definitions for flarmlink.
//!
//! This crate defines the abstractions shared by every flarmlink crate. UI
//! code that only observes an adaptor can depend on these types without
//! pulling in the transport or the sentence parser.
//!
//! # Key types
//!
//! - [`ConnectionStatus`], [`DeviceInfo`], [`LastFix`], [`AdaptorState`] --
//!   observable values
//! - [`AdaptorEvent`] -- change notifications
//! - [`Transport`] / [`Connector`] -- byte-level link to the device
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::AdaptorEvent;
pub use transport::{Connector, Transport};
pub use types::{AdaptorState, ConnectionStatus, DeviceInfo, LastFix};
