//! Identifier-to-decoder dispatch.
//!
//! A [`SentenceCatalogue`] owns the mapping from sentence identifiers to
//! [`SentenceKind`]s, so firmware-specific identifiers can be added without
//! touching the decoders.

use std::collections::HashMap;

use crate::protocol::unframe;
use crate::sentence::{
    ClassifiedSentence, Rejection, SentenceKind, decode_device_identity, decode_position_fix,
    decode_self_test,
};

/// Identifiers the default catalogue knows about.
pub const DEFAULT_IDENTIFIERS: &[(&str, SentenceKind)] = &[
    ("GPGGA", SentenceKind::PositionFix),
    ("GNGGA", SentenceKind::PositionFix),
    ("PFLAV", SentenceKind::DeviceIdentity),
    ("PFLAE", SentenceKind::SelfTestResult),
];

/// Classifies raw lines into [`ClassifiedSentence`]s.
#[derive(Debug, Clone)]
pub struct SentenceCatalogue {
    kinds: HashMap<String, SentenceKind>,
    require_checksum: bool,
}

impl Default for SentenceCatalogue {
    fn default() -> Self {
        let mut catalogue = Self::empty();
        for (identifier, kind) in DEFAULT_IDENTIFIERS {
            catalogue.register(*identifier, *kind);
        }
        catalogue
    }
}

impl SentenceCatalogue {
    /// A catalogue with no identifiers; every sentence is `Unrecognized`.
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
            require_checksum: false,
        }
    }

    /// Map `identifier` to `kind`, replacing any previous mapping.
    pub fn register(&mut self, identifier: impl Into<String>, kind: SentenceKind) -> &mut Self {
        self.kinds.insert(identifier.into(), kind);
        self
    }

    /// Remove the mapping for `identifier`, returning it if present.
    pub fn remove(&mut self, identifier: &str) -> Option<SentenceKind> {
        self.kinds.remove(identifier)
    }

    /// The kind `identifier` is mapped to.
    pub fn kind_of(&self, identifier: &str) -> Option<SentenceKind> {
        self.kinds.get(identifier).copied()
    }

    /// Reject sentences without a `*HH` checksum.
    pub fn require_checksum(mut self, require: bool) -> Self {
        self.require_checksum = require;
        self
    }

    /// Whether sentences without a checksum are rejected.
    pub fn requires_checksum(&self) -> bool {
        self.require_checksum
    }

    /// Validate and classify one line.
    pub fn classify(&self, line: &str) -> Result<ClassifiedSentence, Rejection> {
        let body = unframe(line, self.require_checksum)?;
        let fields: Vec<&str> = body.split(',').collect();

        let identifier = fields[0];
        if identifier.is_empty() {
            return Err(Rejection::MissingIdentifier);
        }

        match self.kind_of(identifier) {
            Some(SentenceKind::PositionFix) => decode_position_fix(&fields),
            Some(SentenceKind::DeviceIdentity) => decode_device_identity(&fields),
            Some(SentenceKind::SelfTestResult) => decode_self_test(&fields),
            None => Ok(ClassifiedSentence::Unrecognized {
                identifier: identifier.to_string(),
            }),
        }
    }
}
