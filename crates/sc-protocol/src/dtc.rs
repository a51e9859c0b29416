use serde::{Deserialize, Serialize};

/// OBD-II Diagnostic Trouble Code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtcCode {
    /// Standard DTC string (e.g., "P0300", "C0035").
    pub code: String,
    /// DTC category derived from the two high bits of the first byte.
    pub category: DtcCategory,
    /// Human-readable description (from the catalog).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// DTC category, the letter in front of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtcCategory {
    /// P: Powertrain (engine, transmission).
    Powertrain,
    /// C: Chassis (ABS, steering).
    Chassis,
    /// B: Body (airbags, AC, lighting).
    Body,
    /// U: Network/Communication (CAN bus errors).
    Network,
}

impl DtcCategory {
    /// Category from the 2-bit selector in bits 7..6 of the first DTC byte.
    pub fn from_selector(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Powertrain,
            1 => Self::Chassis,
            2 => Self::Body,
            _ => Self::Network,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::Powertrain => 'P',
            Self::Chassis => 'C',
            Self::Body => 'B',
            Self::Network => 'U',
        }
    }
}
