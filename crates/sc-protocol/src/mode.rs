use serde::{Deserialize, Serialize};

/// Offset added to a request mode to get the response mode byte.
pub const RESPONSE_MODE_OFFSET: u8 = 0x40;

/// First response byte of a negative response.
pub const NEGATIVE_RESPONSE: u8 = 0x7F;

/// OBD-II service (mode) numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// 01: current data.
    CurrentData,
    /// 02: freeze frame data.
    FreezeFrame,
    /// 03: stored DTCs.
    StoredDtcs,
    /// 04: clear DTCs.
    ClearDtcs,
    /// 05: oxygen sensor monitoring (legacy only).
    OxygenSensorTest,
    /// 06: on-board monitoring test results.
    TestResults,
    /// 07: pending DTCs.
    PendingDtcs,
    /// 08: control of on-board system.
    ControlOperation,
    /// 09: vehicle information.
    VehicleInfo,
    /// 0A: permanent DTCs.
    PermanentDtcs,
}

impl Mode {
    pub const ALL: [Mode; 10] = [
        Mode::CurrentData,
        Mode::FreezeFrame,
        Mode::StoredDtcs,
        Mode::ClearDtcs,
        Mode::OxygenSensorTest,
        Mode::TestResults,
        Mode::PendingDtcs,
        Mode::ControlOperation,
        Mode::VehicleInfo,
        Mode::PermanentDtcs,
    ];

    pub fn request_byte(self) -> u8 {
        match self {
            Mode::CurrentData => 0x01,
            Mode::FreezeFrame => 0x02,
            Mode::StoredDtcs => 0x03,
            Mode::ClearDtcs => 0x04,
            Mode::OxygenSensorTest => 0x05,
            Mode::TestResults => 0x06,
            Mode::PendingDtcs => 0x07,
            Mode::ControlOperation => 0x08,
            Mode::VehicleInfo => 0x09,
            Mode::PermanentDtcs => 0x0A,
        }
    }

    pub fn response_byte(self) -> u8 {
        self.request_byte() + RESPONSE_MODE_OFFSET
    }

    pub fn from_request(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.request_byte() == byte)
    }

    /// Recover the request mode from a response mode byte (`0x41` → 01).
    pub fn from_response(byte: u8) -> Option<Self> {
        byte.checked_sub(RESPONSE_MODE_OFFSET)
            .and_then(Self::from_request)
    }

    /// Number of parameter id bytes that follow the mode byte on the wire.
    pub fn pid_len(self) -> usize {
        match self {
            Mode::StoredDtcs | Mode::ClearDtcs | Mode::PendingDtcs | Mode::PermanentDtcs => 0,
            _ => 1,
        }
    }

    /// Modes whose payload is a list of trouble codes.
    pub fn carries_dtcs(self) -> bool {
        matches!(
            self,
            Mode::StoredDtcs | Mode::PendingDtcs | Mode::PermanentDtcs
        )
    }

    /// Two-digit upper-case hex, as used in catalog keys.
    pub fn hex(self) -> String {
        format!("{:02X}", self.request_byte())
    }
}

/// Catalog key for a mode and parameter id (`"010C"`).
pub fn pid_key(mode: Mode, pid: u8) -> String {
    format!("{:02X}{pid:02X}", mode.request_byte())
}

/// Normalize a user-supplied key: upper-case and zero-padded so that the
/// mode is two digits and the PID at least two (`"1c"` under mode 1 →
/// `"011C"`).
pub fn normalize_key(mode: &str, pid: &str) -> String {
    format!(
        "{:0>2}{:0>2}",
        mode.trim().to_uppercase(),
        pid.trim().to_uppercase()
    )
}
