//! FLARM self-test severities and error codes.
//!
//! `PFLAE` answers carry a severity (0..=3) and a hexadecimal error code.
//! [`describe`] turns them into the single result string the adaptor exposes.

use std::fmt;

/// Result text for a device that reports no error.
pub const SELF_TEST_OK: &str = "OK";

/// `PFLAE` severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// No error, the device is fully operational.
    NoError,
    /// Information only; the device works normally.
    Information,
    /// Some functionality is unavailable.
    ReducedFunctionality,
    /// The device does not work.
    Fatal,
}

impl Severity {
    /// Map the numeric severity field to a [`Severity`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Severity::NoError),
            1 => Some(Severity::Information),
            2 => Some(Severity::ReducedFunctionality),
            3 => Some(Severity::Fatal),
            _ => None,
        }
    }

    /// Human-readable description of the severity.
    pub fn description(&self) -> &'static str {
        match self {
            Severity::NoError => "No error",
            Severity::Information => "Information",
            Severity::ReducedFunctionality => "Reduced functionality",
            Severity::Fatal => "Fatal problem, device will not work",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Describe a FLARM error code, or `None` if the code is not known.
pub fn error_code_description(code: u16) -> Option<&'static str> {
    let text = match code {
        0x11 => "Firmware expired",
        0x12 => "Firmware update error",
        0x21 => "Power (e.g. voltage < 8V)",
        0x22 => "UI error",
        0x23 => "Audio error",
        0x24 => "ADC error",
        0x25 => "SD card error",
        0x26 => "USB error",
        0x27 => "LED error",
        0x28 => "EEPROM error",
        0x29 => "General hardware error",
        0x2A => "Transponder receiver Mode-C/S/ADS-B unserviceable",
        0x2B => "EEPROM error",
        0x2C => "GPIO error",
        0x31 => "GPS communication",
        0x32 => "Configuration of GPS module",
        0x33 => "GPS antenna",
        0x41 => "RF communication",
        0x42 => "Another FLARM device with the same radio ID is being received",
        0x43 => "Wrong ICAO 24-bit address or radio ID",
        0x51 => "Communication",
        0x61 => "Flash memory",
        0x71 => "Pressure sensor",
        0x81 => "Obstacle database",
        0x82 => "Obstacle database expired",
        0x91 => "Flight recorder",
        0x93 => "Engine-noise recording not possible",
        0x94 => "Range analyzer",
        0xA1 => "Configuration error",
        0xB1 => "Invalid obstacle database license",
        0xB2 => "Invalid IGC feature license",
        0xB3 => "Invalid AUD feature license",
        0xB4 => "Invalid ENL feature license",
        0xB5 => "Invalid RFB feature license",
        0xB6 => "Invalid TIS feature license",
        0x100 => "Generic error",
        0x101 => "Flash file system error",
        0x110 => "Failure updating firmware of external display",
        0x120 => "Device is operated outside the designated region",
        0xF1 => "Other",
        _ => return None,
    };
    Some(text)
}

/// Build the self-test result text for a `PFLAE` answer.
///
/// Severity [`Severity::NoError`] yields [`SELF_TEST_OK`]. Anything else joins
/// the severity, the error-code description and the device's own message
/// with `"; "`.
pub fn describe(severity: Severity, error_code: u16, message: Option<&str>) -> String {
    if severity == Severity::NoError {
        return SELF_TEST_OK.to_string();
    }

    let mut parts = vec![severity.description().to_string()];
    if error_code != 0 {
        match error_code_description(error_code) {
            Some(text) => parts.push(text.to_string()),
            None => parts.push(format!("Unknown error code {:X}", error_code)),
        }
    }
    if let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) {
        parts.push(message.to_string());
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_from_code() {
        assert_eq!(Severity::from_code(0), Some(Severity::NoError));
        assert_eq!(Severity::from_code(3), Some(Severity::Fatal));
        assert_eq!(Severity::from_code(4), None);
    }

    #[test]
    fn no_error_is_ok() {
        assert_eq!(describe(Severity::NoError, 0, None), SELF_TEST_OK);
        assert_eq!(describe(Severity::NoError, 0, Some("all good")), SELF_TEST_OK);
    }

    #[test]
    fn known_error_code() {
        assert_eq!(
            describe(Severity::ReducedFunctionality, 0x33, None),
            "Reduced functionality; GPS antenna"
        );
    }

    #[test]
    fn unknown_error_code_with_message() {
        assert_eq!(
            describe(Severity::Information, 0xEE, Some(" check wiring ")),
            "Information; Unknown error code EE; check wiring"
        );
    }

    #[test]
    fn severity_only() {
        assert_eq!(describe(Severity::Fatal, 0, Some("")), Severity::Fatal.to_string());
    }

    #[test]
    fn table_lookups() {
        assert_eq!(error_code_description(0x81), Some("Obstacle database"));
        assert_eq!(error_code_description(0x120).map(|t| t.contains("region")), Some(true));
        assert_eq!(error_code_description(0x00), None);
    }
}
