//! flarmlink-nmea: sentence framing and classification for the FLARM data port.
//!
//! - [`protocol`]: `$...*HH` framing, checksum, and the [`LineBuffer`] that
//!   reassembles transport fragments into lines
//! - [`sentence`]: the [`ClassifiedSentence`] model and its field decoders
//! - [`catalogue`]: identifier dispatch via [`SentenceCatalogue`]
//! - [`self_test`]: `PFLAE` severity and error-code descriptions
//!
//! Everything here is synchronous and stateless apart from the line buffer.

pub mod catalogue;
pub mod protocol;
pub mod self_test;
pub mod sentence;

pub use catalogue::SentenceCatalogue;
pub use protocol::{LineBuffer, checksum, frame_sentence};
pub use self_test::SELF_TEST_OK;
pub use sentence::{ClassifiedSentence, Rejection, SentenceKind};
