use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of adapter output, split on whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawLine(pub Vec<String>);

impl RawLine {
    pub fn new(tokens: Vec<String>) -> Self {
        Self(tokens)
    }

    /// Tokenize a line of text the way the adapter output is tokenized.
    pub fn from_text(text: &str) -> Self {
        Self(text.split_whitespace().map(String::from).collect())
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Tokens joined with single spaces (`"NO DATA"`, `"41 00 BE 3E"`).
    pub fn joined(&self) -> String {
        self.0.join(" ")
    }

    /// Tokens concatenated without separators, upper-cased. Used to compare
    /// echoes regardless of the spacing the user typed.
    pub fn compact(&self) -> String {
        self.0.concat().to_uppercase()
    }
}

/// Everything the adapter printed for one command, up to the prompt.
///
/// Line 0 is always the echoed command; lines 1..n are the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub lines: Vec<RawLine>,
}

impl RawRecord {
    pub fn new(lines: Vec<RawLine>) -> Self {
        Self { lines }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from adapter text, splitting lines on CR/LF.
    pub fn from_text(text: &str) -> Self {
        let lines = text
            .split(['\r', '\n'])
            .map(RawLine::from_text)
            .filter(|l| !l.is_empty())
            .collect();
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// The echoed command line, if any.
    pub fn echo(&self) -> Option<&RawLine> {
        self.lines.first()
    }

    /// Response lines (everything after the echo).
    pub fn responses(&self) -> &[RawLine] {
        self.lines.get(1..).unwrap_or(&[])
    }
}

/// A reassembled application record: payload bytes per responding ECU.
///
/// Each payload starts with the response mode byte, then the parameter id
/// byte(s), then data. Line numbers, byte-count headers, PCI bytes and
/// checksums have already been removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Command as sent (e.g., "0100").
    pub command: String,
    /// When the record was reassembled.
    pub timestamp: DateTime<Utc>,
    /// ECU identifier → payload bytes.
    #[serde(with = "hex_payloads")]
    pub responses: BTreeMap<String, Vec<u8>>,
}

impl CanonicalRecord {
    pub fn new(command: impl Into<String>, responses: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            command: command.into(),
            timestamp: Utc::now(),
            responses,
        }
    }

    /// A record for a command that produced no ECU response (`NO DATA`).
    pub fn no_data(command: impl Into<String>) -> Self {
        Self::new(command, BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn payload(&self, ecu: &str) -> Option<&[u8]> {
        self.responses.get(ecu).map(Vec::as_slice)
    }

    pub fn ecus(&self) -> impl Iterator<Item = &str> {
        self.responses.keys().map(String::as_str)
    }
}

/// Render bytes as space-separated upper-case hex (`"41 0C 1A F8"`).
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

mod hex_payloads {
    use std::collections::BTreeMap;

    use serde::{self, Deserialize, Deserializer, Serializer, ser::SerializeMap};

    pub fn serialize<S>(map: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (ecu, bytes) in map {
            out.serialize_entry(ecu, &super::hex_dump(bytes))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(ecu, hex)| {
                let bytes = hex
                    .split_whitespace()
                    .map(|t| u8::from_str_radix(t, 16).map_err(serde::de::Error::custom))
                    .collect::<Result<Vec<u8>, _>>()?;
                Ok((ecu, bytes))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_text_splits_lines_and_tokens() {
        let rec = RawRecord::from_text("0100\r\n41 00 BE 3E A8 11\r\n\r\n");
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.echo().unwrap().joined(), "0100");
        assert_eq!(rec.responses()[0].tokens().len(), 6);
    }

    #[test]
    fn empty_record_has_no_responses() {
        let rec = RawRecord::empty();
        assert!(rec.echo().is_none());
        assert!(rec.responses().is_empty());
    }

    #[test]
    fn compact_ignores_spacing_and_case() {
        assert_eq!(RawLine::from_text("01 0c").compact(), "010C");
    }

    #[test]
    fn canonical_record_serializes_hex_payloads() {
        let mut responses = BTreeMap::new();
        responses.insert("7E8".to_string(), vec![0x41, 0x0C, 0x1A, 0xF8]);
        let rec = CanonicalRecord::new("010C", responses);

        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["responses"]["7E8"], "41 0C 1A F8");

        let back: CanonicalRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.payload("7E8"), Some(&[0x41, 0x0C, 0x1A, 0xF8][..]));
    }
}
