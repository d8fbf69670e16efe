//! Classified sentences and the field decoders that produce them.
//!
//! Each decoder takes the comma-separated fields of a sentence body (the
//! identifier is field 0) and either returns a fully populated
//! [`ClassifiedSentence`] or a [`Rejection`]. A decoder never returns a
//! partially populated sentence.

use chrono::NaiveTime;

use crate::self_test;

/// A validated sentence from the data port.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedSentence {
    /// A GNSS position fix (GGA).
    PositionFix {
        /// Latitude in decimal degrees, north positive.
        latitude: f64,
        /// Longitude in decimal degrees, east positive.
        longitude: f64,
        /// Altitude above mean sea level, in metres.
        altitude_m: f64,
        /// UTC time of day of the fix.
        fix_time: NaiveTime,
    },

    /// Device version information (`PFLAV`).
    DeviceIdentity {
        /// Hardware version, `None` if the device left the field empty.
        hardware_version: Option<String>,
        /// Firmware version, `None` if the device left the field empty.
        software_version: Option<String>,
        /// Obstacle database name, `None` if none is installed.
        obstacle_database_version: Option<String>,
    },

    /// Result of the device self-test (`PFLAE`).
    SelfTestResult {
        /// Human-readable result; [`self_test::SELF_TEST_OK`] when healthy.
        text: String,
    },

    /// A well-formed sentence this catalogue has no decoder for.
    ///
    /// Still counts as a sign of life for the heartbeat.
    Unrecognized {
        /// The sentence identifier, e.g. `"PFLAU"`.
        identifier: String,
    },
}

/// The decoders a sentence identifier can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentenceKind {
    /// Decode as GGA position fix.
    PositionFix,
    /// Decode as `PFLAV` version answer.
    DeviceIdentity,
    /// Decode as `PFLAE` self-test answer.
    SelfTestResult,
}

/// Why a line was not turned into a [`ClassifiedSentence`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Nothing but whitespace.
    #[error("line is empty")]
    Empty,

    /// The line contains non-ASCII characters.
    #[error("line contains non-ASCII characters")]
    NonAscii,

    /// The line does not start with `$`.
    #[error("line does not start with '$'")]
    MissingStart,

    /// The text after `*` is not two hex digits.
    #[error("malformed checksum field {0:?}")]
    MalformedChecksum(String),

    /// The checksum does not match the sentence body.
    #[error("checksum mismatch: sentence says {expected:02X}, body computes to {computed:02X}")]
    ChecksumMismatch {
        /// Checksum carried by the sentence.
        expected: u8,
        /// Checksum computed over the body.
        computed: u8,
    },

    /// The catalogue requires a checksum and the line has none.
    #[error("checksum required but absent")]
    MissingChecksum,

    /// The first field is empty.
    #[error("sentence identifier is empty")]
    MissingIdentifier,

    /// Too few fields for the sentence grammar.
    #[error("{identifier}: expected at least {expected} fields, got {actual}")]
    FieldCount {
        /// Sentence identifier.
        identifier: String,
        /// Minimum field count including the identifier.
        expected: usize,
        /// Field count found.
        actual: usize,
    },

    /// A field does not parse or is out of range.
    #[error("{identifier}: invalid {field} {value:?}")]
    InvalidField {
        /// Sentence identifier.
        identifier: String,
        /// Name of the offending field.
        field: &'static str,
        /// Raw field text.
        value: String,
    },
}

impl Rejection {
    fn invalid(fields: &[&str], field: &'static str, value: &str) -> Self {
        Rejection::InvalidField {
            identifier: fields[0].to_string(),
            field,
            value: value.to_string(),
        }
    }
}

fn require_fields(fields: &[&str], expected: usize) -> Result<(), Rejection> {
    if fields.len() < expected {
        return Err(Rejection::FieldCount {
            identifier: fields[0].to_string(),
            expected,
            actual: fields.len(),
        });
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

// ---------------------------------------------------------------------------
// GGA
// ---------------------------------------------------------------------------

/// Field count of a GGA sentence up to and including the altitude unit.
const GGA_MIN_FIELDS: usize = 11;

/// Decode a GGA sentence.
///
/// Layout: `xxGGA,hhmmss.ss,ddmm.mmm,N,dddmm.mmm,E,q,nn,h.h,alt,M,...`.
/// Every non-empty field is validated first. A GGA whose position fields are
/// all empty, or with fix quality `0`, then carries no fix and decodes to
/// [`ClassifiedSentence::Unrecognized`]; any other GGA must carry time,
/// position and altitude.
pub fn decode_position_fix(fields: &[&str]) -> Result<ClassifiedSentence, Rejection> {
    require_fields(fields, GGA_MIN_FIELDS)?;

    let fix_time = optional_field(fields, 1, "time", decode_time)?;
    let latitude = optional_coordinate(fields, 2, Axis::Latitude)?;
    let longitude = optional_coordinate(fields, 4, Axis::Longitude)?;
    let quality = optional_field(fields, 6, "fix quality", |q| q.parse::<u8>().ok())?;
    let altitude = optional_field(fields, 9, "altitude", |a| {
        a.parse::<f64>().ok().filter(|a| a.is_finite())
    })?;
    let unit = fields[10];
    if !unit.is_empty() && unit != "M" {
        return Err(Rejection::invalid(fields, "altitude unit", unit));
    }

    if quality == Some(0) || (latitude.is_none() && longitude.is_none()) {
        return Ok(ClassifiedSentence::Unrecognized {
            identifier: fields[0].to_string(),
        });
    }

    let fix_time = fix_time.ok_or_else(|| Rejection::invalid(fields, "time", fields[1]))?;
    let latitude = latitude
        .ok_or_else(|| Rejection::invalid(fields, "latitude", &position_text(fields, 2)))?;
    let longitude = longitude
        .ok_or_else(|| Rejection::invalid(fields, "longitude", &position_text(fields, 4)))?;
    let altitude_m = altitude.ok_or_else(|| Rejection::invalid(fields, "altitude", fields[9]))?;
    if unit.is_empty() {
        return Err(Rejection::invalid(fields, "altitude unit", unit));
    }

    Ok(ClassifiedSentence::PositionFix {
        latitude,
        longitude,
        altitude_m,
        fix_time,
    })
}

/// Decode `fields[index]` if it is non-empty; an empty field is `None`.
fn optional_field<T>(
    fields: &[&str],
    index: usize,
    name: &'static str,
    decode: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, Rejection> {
    let value = fields[index];
    if value.is_empty() {
        return Ok(None);
    }
    decode(value)
        .map(Some)
        .ok_or_else(|| Rejection::invalid(fields, name, value))
}

/// Decode the coordinate at `fields[index]` with its hemisphere at
/// `fields[index + 1]`. Both empty is `None`; anything else must decode.
fn optional_coordinate(
    fields: &[&str],
    index: usize,
    axis: Axis,
) -> Result<Option<f64>, Rejection> {
    let (value, hemisphere) = (fields[index], fields[index + 1]);
    if value.is_empty() && hemisphere.is_empty() {
        return Ok(None);
    }
    decode_coordinate(value, hemisphere, axis)
        .map(Some)
        .ok_or_else(|| Rejection::invalid(fields, axis.name(), &position_text(fields, index)))
}

fn position_text(fields: &[&str], index: usize) -> String {
    format!("{},{}", fields[index], fields[index + 1])
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::Latitude => "latitude",
            Axis::Longitude => "longitude",
        }
    }

    fn degree_digits(self) -> usize {
        match self {
            Axis::Latitude => 2,
            Axis::Longitude => 3,
        }
    }

    fn max_degrees(self) -> f64 {
        match self {
            Axis::Latitude => 90.0,
            Axis::Longitude => 180.0,
        }
    }

    fn sign(self, hemisphere: &str) -> Option<f64> {
        match (self, hemisphere) {
            (Axis::Latitude, "N") | (Axis::Longitude, "E") => Some(1.0),
            (Axis::Latitude, "S") | (Axis::Longitude, "W") => Some(-1.0),
            _ => None,
        }
    }
}

/// Decode `ddmm.mmm` / `dddmm.mmm` plus hemisphere into signed decimal degrees.
///
/// Degrees and minutes are decoded separately and combined as
/// `degrees + minutes / 60`.
fn decode_coordinate(value: &str, hemisphere: &str, axis: Axis) -> Option<f64> {
    let sign = axis.sign(hemisphere)?;

    let integer_len = value.find('.').unwrap_or(value.len());
    if integer_len != axis.degree_digits() + 2 {
        return None;
    }
    let (degrees, minutes) = value.split_at(axis.degree_digits());
    if !degrees.bytes().all(|b| b.is_ascii_digit())
        || !minutes.bytes().all(|b| b.is_ascii_digit() || b == b'.')
    {
        return None;
    }

    let degrees: u32 = degrees.parse().ok()?;
    let minutes: f64 = minutes.parse().ok()?;
    if minutes >= 60.0 {
        return None;
    }

    let decimal = f64::from(degrees) + minutes / 60.0;
    if decimal > axis.max_degrees() {
        return None;
    }
    Some(sign * decimal)
}

/// Decode `hhmmss` with optional fractional seconds.
fn decode_time(value: &str) -> Option<NaiveTime> {
    let (hms, fraction) = match value.split_once('.') {
        Some((hms, fraction)) => (hms, fraction),
        None => (value, ""),
    };
    if hms.len() != 6
        || !hms.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
        || fraction.len() > 9
    {
        return None;
    }

    let hour: u32 = hms[0..2].parse().ok()?;
    let minute: u32 = hms[2..4].parse().ok()?;
    let second: u32 = hms[4..6].parse().ok()?;
    let nanos: u32 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<9}", fraction).parse().ok()?
    };

    // Reject leap-second encodings; NaiveTime would accept them as
    // nanosecond overflow.
    if second > 59 {
        return None;
    }
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
}

// ---------------------------------------------------------------------------
// PFLAV / PFLAE
// ---------------------------------------------------------------------------

/// Decode a `PFLAV` version answer.
///
/// Layout: `PFLAV,A,<hw>,<sw>[,<obstacle db>]`. Requests (`R`) and other
/// query types decode to [`ClassifiedSentence::Unrecognized`].
pub fn decode_device_identity(fields: &[&str]) -> Result<ClassifiedSentence, Rejection> {
    require_fields(fields, 2)?;
    if fields[1] != "A" {
        return Ok(ClassifiedSentence::Unrecognized {
            identifier: fields[0].to_string(),
        });
    }
    require_fields(fields, 4)?;

    Ok(ClassifiedSentence::DeviceIdentity {
        hardware_version: non_empty(fields[2]),
        software_version: non_empty(fields[3]),
        obstacle_database_version: fields.get(4).and_then(|f| non_empty(f)),
    })
}

/// Decode a `PFLAE` self-test answer.
///
/// Layout: `PFLAE,A,<severity>,<hex error code>[,<message>]`.
pub fn decode_self_test(fields: &[&str]) -> Result<ClassifiedSentence, Rejection> {
    require_fields(fields, 2)?;
    if fields[1] != "A" {
        return Ok(ClassifiedSentence::Unrecognized {
            identifier: fields[0].to_string(),
        });
    }
    require_fields(fields, 4)?;

    let severity = fields[2]
        .parse::<u8>()
        .ok()
        .and_then(self_test::Severity::from_code)
        .ok_or_else(|| Rejection::invalid(fields, "severity", fields[2]))?;
    let error_code = if fields[3].is_empty() {
        0
    } else {
        u16::from_str_radix(fields[3], 16)
            .map_err(|_| Rejection::invalid(fields, "error code", fields[3]))?
    };
    // The free-text message may itself contain commas.
    let message = (fields.len() > 4).then(|| fields[4..].join(","));

    Ok(ClassifiedSentence::SelfTestResult {
        text: self_test::describe(severity, error_code, message.as_deref()),
    })
}
