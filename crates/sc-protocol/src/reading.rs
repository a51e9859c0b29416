//! Decoded readings: the (label, value, unit) triples the decoder emits.

use serde::{Deserialize, Serialize};

/// Label used for each PID synthesized by a feature-bitmap decode.
pub const SUPPORTED_PID_LABEL: &str = "Supported PID";

/// A decoded value. Decode failures are carried as `Error` rather than
/// returned as `Err`, so one bad sensor never hides the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    /// Bits of one byte, index 0 = least significant bit.
    Bits(Vec<bool>),
    Error(ReadingFault),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bits(bits) => {
                for b in bits {
                    f.write_str(if *b { "1" } else { "0" })?;
                }
                Ok(())
            }
            Value::Error(_) => f.write_str("ERROR"),
        }
    }
}

/// Why a reading could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum ReadingFault {
    #[error("unknown PID {key}: {data}")]
    UnknownPid { key: String, data: String },

    #[error("expected more databytes: need {expected}, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("formula unknown")]
    FormulaUnknown,

    #[error("formula failed: {message}")]
    FormulaFailed { message: String },

    #[error("value {value} under min {min}")]
    UnderMin { value: f64, min: f64 },

    #[error("value {value} over max {max}")]
    OverMax { value: f64, max: f64 },

    #[error("mode {mode:02X} PID {pid} not implemented: {data}")]
    Unimplemented { mode: u8, pid: String, data: String },

    #[error("negative response to service {service:02X}: {reason}")]
    NegativeResponse { service: u8, reason: NegativeReason },
}

impl ReadingFault {
    /// Short tag placed in the unit slot of an error reading.
    pub fn tag(&self) -> &'static str {
        match self {
            ReadingFault::UnknownPid { .. } => "unknown PID",
            ReadingFault::InsufficientData { .. } => "expected more databytes",
            ReadingFault::FormulaUnknown => "formula unknown",
            ReadingFault::FormulaFailed { .. } => "formula failed",
            ReadingFault::UnderMin { .. } => "under min",
            ReadingFault::OverMax { .. } => "over max",
            ReadingFault::Unimplemented { .. } => "unimplemented",
            ReadingFault::NegativeResponse { .. } => "negative response",
        }
    }
}

/// Reason code carried in the third byte of a `7F` negative response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum NegativeReason {
    #[error("general reject")]
    GeneralReject,
    #[error("service not supported")]
    ServiceNotSupported,
    #[error("sub-function not supported or invalid format")]
    SubFunctionInvalid,
    #[error("busy, repeat request")]
    BusyRepeatRequest,
    #[error("conditions not correct or request sequence error")]
    SequenceError,
    #[error("response pending")]
    ResponsePending,
    #[error("reason code {0:02X}")]
    Other(u8),
}

impl NegativeReason {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x10 => Self::GeneralReject,
            0x11 => Self::ServiceNotSupported,
            0x12 => Self::SubFunctionInvalid,
            0x21 => Self::BusyRepeatRequest,
            0x22 => Self::SequenceError,
            0x78 => Self::ResponsePending,
            other => Self::Other(other),
        }
    }
}

/// One decoded (label, value, unit) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedReading {
    pub label: String,
    pub value: Value,
    /// Unit, table text, or an error tag. May be empty.
    pub unit: String,
}

impl DecodedReading {
    pub fn new(label: impl Into<String>, value: Value, unit: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value,
            unit: unit.into(),
        }
    }

    pub fn text(label: impl Into<String>, text: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::new(label, Value::Text(text.into()), unit)
    }

    /// An error-tagged reading; the unit slot carries the fault's tag.
    pub fn error(label: impl Into<String>, fault: ReadingFault) -> Self {
        let unit = fault.tag();
        Self::new(label, Value::Error(fault), unit)
    }

    pub fn is_error(&self) -> bool {
        self.value.is_error()
    }
}

/// Everything decoded from one ECU's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcuReadings {
    /// Request mode recovered from the response byte (`0x41` → 1). For a
    /// negative response this is the rejected service.
    pub mode: u8,
    /// Parameter id, for modes that carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u8>,
    pub readings: Vec<DecodedReading>,
}

impl EcuReadings {
    /// PIDs reported by a feature-bitmap decode, in bit order.
    pub fn supported_pids(&self) -> Vec<String> {
        self.readings
            .iter()
            .filter(|r| r.label == SUPPORTED_PID_LABEL)
            .filter_map(|r| r.value.as_text().map(String::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reading_uses_fault_tag_as_unit() {
        let r = DecodedReading::error("Engine RPM", ReadingFault::OverMax { value: 20000.0, max: 16383.75 });
        assert!(r.is_error());
        assert_eq!(r.unit, "over max");
        assert_eq!(r.value.to_string(), "ERROR");
    }

    #[test]
    fn negative_reason_codes() {
        assert_eq!(NegativeReason::from_code(0x11), NegativeReason::ServiceNotSupported);
        assert_eq!(NegativeReason::from_code(0x78), NegativeReason::ResponsePending);
        assert_eq!(NegativeReason::from_code(0x31), NegativeReason::Other(0x31));
    }

    #[test]
    fn bits_display_lsb_first() {
        let v = Value::Bits(vec![true, false, false, true]);
        assert_eq!(v.to_string(), "1001");
    }

    #[test]
    fn value_serialization_is_tagged() {
        let json = serde_json::to_value(Value::Float(1.5)).unwrap();
        assert_eq!(json["kind"], "float");
        assert_eq!(json["value"], 1.5);

        let json = serde_json::to_value(Value::Error(ReadingFault::FormulaUnknown)).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["value"]["fault"], "formula_unknown");
    }

    #[test]
    fn supported_pids_filter_by_label() {
        let ecu = EcuReadings {
            mode: 1,
            pid: Some(0),
            readings: vec![
                DecodedReading::text(SUPPORTED_PID_LABEL, "0101", ""),
                DecodedReading::text("Other", "x", ""),
                DecodedReading::text(SUPPORTED_PID_LABEL, "0120", ""),
            ],
        };
        assert_eq!(ecu.supported_pids(), vec!["0101", "0120"]);
    }
}
