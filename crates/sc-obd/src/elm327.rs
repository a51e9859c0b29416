//! ELM327 command subset: reset, protocol selection, headers, identity
//! queries, and the status lines the adapter mixes into responses.

use std::str::FromStr;

use sc_protocol::{RawLine, RawRecord};

use crate::error::SessionError;

/// Prompt printed when the adapter is ready for the next command.
pub const PROMPT: u8 = b'>';

/// Terminator written after every command.
pub const COMMAND_END: &str = "\r";

pub const RESET: &str = "ATZ";
pub const AUTO_PROTOCOL: &str = "ATSP0";
pub const HEADERS_ON: &str = "ATH1";
pub const HEADERS_OFF: &str = "ATH0";

/// Throwaway query that forces the adapter's protocol search.
pub const PROTOCOL_SEARCH: &str = "0100";

/// Value of an identity attribute before it has been queried.
pub const UNKNOWN_ATTRIBUTE: &str = "Unknown";

/// Identity attributes and the command that retrieves each.
pub const ATTRIBUTES: &[(&str, &str)] = &[
    ("Brand", "AT@1"),
    ("Brand2", "AT@2"),
    ("Firmware", "ATI"),
    ("Proto", "ATDP"),
    ("ProtoNum", "ATDPN"),
    ("Voltage", "ATRV"),
];

/// Reader chips the session knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderDevice {
    Elm327,
}

impl FromStr for ReaderDevice {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ELM327" => Ok(Self::Elm327),
            _ => Err(SessionError::UnknownDevice(s.to_string())),
        }
    }
}

impl std::fmt::Display for ReaderDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Elm327 => f.write_str("ELM327"),
        }
    }
}

/// What an echoed `AT` command means for session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// `ATZ`, `ATWS`, `ATD`: adapter back to defaults (headers off).
    Reset,
    HeadersOn,
    HeadersOff,
    /// One of [`ATTRIBUTES`], by name.
    Attribute(&'static str),
    Other,
}

impl AtCommand {
    /// Parse an echo, ignoring case and spacing (`"at dpn"` → `ATDPN`).
    pub fn parse(echo: &RawLine) -> Self {
        let cmd = echo.compact();
        match cmd.as_str() {
            "ATZ" | "ATWS" | "ATD" => Self::Reset,
            "ATH1" => Self::HeadersOn,
            "ATH0" => Self::HeadersOff,
            other => ATTRIBUTES
                .iter()
                .find(|(_, c)| *c == other)
                .map(|(name, _)| Self::Attribute(*name))
                .unwrap_or(Self::Other),
        }
    }
}

/// Adapter status lines that are not vehicle data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// No ECU answered. A valid, empty outcome.
    NoData,
    /// Protocol search in progress.
    Searching,
    /// Adapter receive buffer overflowed; data was lost.
    BufferFull,
    /// The adapter did not understand the command.
    Unrecognized,
    /// Bus or adapter fault (`CAN ERROR`, `UNABLE TO CONNECT`, ...).
    Fault(String),
}

impl StatusLine {
    pub fn classify(line: &RawLine) -> Option<Self> {
        let text = line.joined().to_ascii_uppercase();
        match text.as_str() {
            "NO DATA" => Some(Self::NoData),
            "BUFFER FULL" => Some(Self::BufferFull),
            "?" => Some(Self::Unrecognized),
            t if t.starts_with("SEARCHING") => Some(Self::Searching),
            "UNABLE TO CONNECT" | "CAN ERROR" | "BUS ERROR" | "BUS BUSY" | "DATA ERROR" | "FB ERROR"
            | "STOPPED" | "ERROR" | "LV RESET" | "ACT ALERT" => Some(Self::Fault(text.clone())),
            t if t.starts_with("BUS INIT") => Some(Self::Searching),
            _ => None,
        }
    }
}

/// Remove status lines from an application record's response body.
/// The echo (line 0) is kept.
pub fn scrub_status_lines(record: &RawRecord) -> RawRecord {
    let command = record.echo().map(RawLine::joined).unwrap_or_default();
    let mut lines = Vec::with_capacity(record.len());
    lines.extend(record.echo().cloned());

    for line in record.responses() {
        match StatusLine::classify(line) {
            None => lines.push(line.clone()),
            Some(StatusLine::NoData) => tracing::debug!(command = %command, "no data"),
            Some(StatusLine::Searching) => tracing::debug!(command = %command, "adapter searching"),
            Some(StatusLine::BufferFull) => {
                tracing::warn!(command = %command, "adapter buffer full, response incomplete; host is not draining fast enough")
            }
            Some(StatusLine::Unrecognized) => tracing::warn!(command = %command, "adapter did not recognize command"),
            Some(StatusLine::Fault(text)) => tracing::warn!(command = %command, status = %text, "adapter reported fault"),
        }
    }
    RawRecord::new(lines)
}

/// Response text of an `AT` record, lines joined with spaces.
pub fn response_text(record: &RawRecord) -> String {
    record
        .responses()
        .iter()
        .map(RawLine::joined)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_elm327_is_recognized() {
        assert_eq!("ELM327".parse::<ReaderDevice>().unwrap(), ReaderDevice::Elm327);
        assert_eq!("elm327".parse::<ReaderDevice>().unwrap(), ReaderDevice::Elm327);
        assert!(matches!(
            "STN1110".parse::<ReaderDevice>(),
            Err(SessionError::UnknownDevice(d)) if d == "STN1110"
        ));
    }

    #[test]
    fn at_echo_parsing() {
        assert_eq!(AtCommand::parse(&RawLine::from_text("atz")), AtCommand::Reset);
        assert_eq!(AtCommand::parse(&RawLine::from_text("AT H1")), AtCommand::HeadersOn);
        assert_eq!(AtCommand::parse(&RawLine::from_text("ATH0")), AtCommand::HeadersOff);
        assert_eq!(AtCommand::parse(&RawLine::from_text("at dpn")), AtCommand::Attribute("ProtoNum"));
        assert_eq!(AtCommand::parse(&RawLine::from_text("ATRV")), AtCommand::Attribute("Voltage"));
        assert_eq!(AtCommand::parse(&RawLine::from_text("ATSP0")), AtCommand::Other);
    }

    #[test]
    fn status_lines_are_scrubbed() {
        let rec = RawRecord::from_text("0100\rSEARCHING...\r41 00 BE 3E A8 11\rBUFFER FULL\r");
        let clean = scrub_status_lines(&rec);
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.responses()[0].joined(), "41 00 BE 3E A8 11");

        let none = scrub_status_lines(&RawRecord::from_text("010C\rNO DATA\r"));
        assert_eq!(none.len(), 1);
        assert_eq!(none.echo().unwrap().joined(), "010C");
    }

    #[test]
    fn status_classification() {
        let classify = |t: &str| StatusLine::classify(&RawLine::from_text(t));
        assert_eq!(classify("NO DATA"), Some(StatusLine::NoData));
        assert_eq!(classify("?"), Some(StatusLine::Unrecognized));
        assert_eq!(classify("UNABLE TO CONNECT"), Some(StatusLine::Fault("UNABLE TO CONNECT".into())));
        assert_eq!(classify("BUS INIT: ...OK"), Some(StatusLine::Searching));
        assert_eq!(classify("41 0C 1A F8"), None);
    }

    #[test]
    fn attribute_text_joins_lines() {
        let rec = RawRecord::from_text("ATDP\rAUTO, ISO 15765-4 (CAN 11/500)\r");
        assert_eq!(response_text(&rec), "AUTO, ISO 15765-4 (CAN 11/500)");
    }
}
