//! OBD-II application decode: canonical payload bytes to typed readings.
//!
//! Each ECU payload starts with the response mode byte and its parameter id
//! (see [`sc_protocol::CanonicalRecord`]). Semantic failures become
//! error-tagged readings; only a payload too short to carry a mode or a
//! parameter id is a [`DecodeError`].

use std::collections::BTreeMap;

use sc_protocol::{
    CanonicalRecord, DecodedReading, DtcCategory, DtcCode, EcuReadings, Mode, NEGATIVE_RESPONSE,
    NegativeReason, RESPONSE_MODE_OFFSET, ReadingFault, SUPPORTED_PID_LABEL, Value, hex_dump,
    pid_key,
};

use crate::catalog::{Catalog, PidDefinition};
use crate::error::DecodeError;
use crate::formula::Number;
use crate::tables;

/// Per-ECU decode outcome for one record.
pub type DecodedRecord = BTreeMap<String, Result<EcuReadings, DecodeError>>;

/// Data bytes in a feature-support bitmap.
pub const FEATURE_BITMAP_BYTES: usize = 4;

/// Stand-in for non-printable bytes in text payloads.
pub const TEXT_PLACEHOLDER: char = '.';

const VIN_LEN: usize = 17;
const CALIBRATION_ID_LEN: usize = 16;
const CVN_LEN: usize = 4;
const ECU_NAME_LEN: usize = 20;

/// Whether a parameter id asks which of the next 32 ids are supported.
pub fn is_feature_pid(pid: u8) -> bool {
    pid % 0x20 == 0
}

/// Decode every ECU payload in a record.
pub fn decode_record(record: &CanonicalRecord, catalog: &dyn Catalog) -> DecodedRecord {
    record
        .responses
        .iter()
        .map(|(ecu, payload)| {
            let decoded = decode_payload(payload, catalog);
            if let Err(e) = &decoded {
                tracing::warn!(command = %record.command, ecu = %ecu, error = %e, "payload not decodable");
            }
            (ecu.clone(), decoded)
        })
        .collect()
}

/// Decode one ECU payload: response mode byte, parameter id, data.
pub fn decode_payload(payload: &[u8], catalog: &dyn Catalog) -> Result<EcuReadings, DecodeError> {
    let (&first, rest) = payload.split_first().ok_or(DecodeError::Empty)?;

    if first == NEGATIVE_RESPONSE {
        return Ok(negative_response(rest));
    }

    let Some(mode) = Mode::from_response(first) else {
        tracing::debug!(byte = first, "unrecognized response mode");
        return Ok(EcuReadings {
            mode: first.wrapping_sub(RESPONSE_MODE_OFFSET),
            pid: None,
            readings: Vec::new(),
        });
    };

    if mode.pid_len() == 0 {
        let readings = if mode.carries_dtcs() {
            decode_dtcs(rest, catalog)
        } else {
            Vec::new()
        };
        return Ok(EcuReadings {
            mode: mode.request_byte(),
            pid: None,
            readings,
        });
    }

    let (&pid, data) = rest.split_first().ok_or(DecodeError::MissingParameterId {
        mode: mode.request_byte(),
    })?;

    let readings = match mode {
        Mode::CurrentData => decode_current(Mode::CurrentData, pid, data, catalog),
        Mode::FreezeFrame => {
            // Frame number precedes the data.
            let data = data.get(1..).unwrap_or_default();
            decode_current(Mode::FreezeFrame, pid, data, catalog)
        }
        Mode::OxygenSensorTest | Mode::TestResults | Mode::ControlOperation => {
            if is_feature_pid(pid) && mode != Mode::ControlOperation {
                decode_feature_bitmap(mode, pid, data)
            } else {
                vec![unimplemented(mode, pid, data)]
            }
        }
        Mode::VehicleInfo => decode_vehicle_info(pid, data, catalog),
        Mode::StoredDtcs | Mode::ClearDtcs | Mode::PendingDtcs | Mode::PermanentDtcs => Vec::new(),
    };

    Ok(EcuReadings {
        mode: mode.request_byte(),
        pid: Some(pid),
        readings,
    })
}

fn negative_response(rest: &[u8]) -> EcuReadings {
    let service = rest.first().copied().unwrap_or_default();
    let reason = NegativeReason::from_code(rest.get(1).copied().unwrap_or(0x10));
    tracing::warn!(service, %reason, "negative response");
    EcuReadings {
        mode: service,
        pid: None,
        readings: vec![DecodedReading::error(
            "Negative response",
            ReadingFault::NegativeResponse { service, reason },
        )],
    }
}

fn unimplemented(mode: Mode, pid: u8, data: &[u8]) -> DecodedReading {
    DecodedReading::error(
        pid_key(mode, pid),
        ReadingFault::Unimplemented {
            mode: mode.request_byte(),
            pid: format!("{pid:02X}"),
            data: hex_dump(data),
        },
    )
}

// ---------------------------------------------------------------------------
// Mode 01 / 02
// ---------------------------------------------------------------------------

/// Modes 01 and 02 share the mode 01 definitions. `mode` only decides the
/// prefix of synthesized feature PIDs.
fn decode_current(mode: Mode, pid: u8, data: &[u8], catalog: &dyn Catalog) -> Vec<DecodedReading> {
    if is_feature_pid(pid) {
        return decode_feature_bitmap(mode, pid, data);
    }

    let needed = match pid {
        0x01 | 0x41 => 4,
        0x02 | 0x03 => 2,
        0x12 | 0x13 | 0x1C | 0x1D | 0x51 => 1,
        _ => 0,
    };
    if data.len() < needed {
        return vec![DecodedReading::error(
            pid_key(Mode::CurrentData, pid),
            ReadingFault::InsufficientData {
                expected: needed,
                actual: data.len(),
            },
        )];
    }

    match pid {
        0x01 | 0x41 => decode_monitors(pid, data),
        0x02 => decode_dtcs(&data[..2], catalog),
        0x03 => decode_fuel_system(data),
        0x12 => lowest_set_bit(data[0], tables::SECONDARY_AIR_STATUSES.len())
            .map(|i| {
                DecodedReading::new(
                    "Secondary air status",
                    Value::Int(i as i64),
                    tables::SECONDARY_AIR_STATUSES[i],
                )
            })
            .into_iter()
            .collect(),
        0x13 | 0x1D => vec![DecodedReading::new(
            "O2 Sensor bitmap",
            Value::Bits(bits_lsb_first(data[0])),
            "Next 8 PIDs",
        )],
        0x1C => vec![DecodedReading::new(
            "OBD standard",
            Value::Int(i64::from(data[0])),
            tables::lookup(tables::OBD_STANDARDS, data[0]),
        )],
        0x51 => vec![DecodedReading::new(
            "Fuel type",
            Value::Int(i64::from(data[0])),
            tables::lookup(tables::FUEL_TYPES, data[0]),
        )],
        _ => decode_generic(&pid_key(Mode::CurrentData, pid), data, catalog),
    }
}

/// Expand a feature-support bitmap into the PIDs it marks as supported.
///
/// The most significant bit of the first data byte is `base + 1`, the
/// least significant bit of the last is `base + 32`.
pub fn decode_feature_bitmap(mode: Mode, base_pid: u8, data: &[u8]) -> Vec<DecodedReading> {
    let base = (u16::from(mode.request_byte()) << 8) | u16::from(base_pid);
    let mut readings = Vec::new();
    for (i, byte) in data.iter().take(FEATURE_BITMAP_BYTES).enumerate() {
        for j in 0..8 {
            if byte & (0x80 >> j) != 0 {
                let pid = base + (8 * i + j + 1) as u16;
                readings.push(DecodedReading::text(SUPPORTED_PID_LABEL, format!("{pid:04X}"), ""));
            }
        }
    }
    readings
}

/// Catalog-driven decode: bind data bytes to `A`..`G` and evaluate every
/// sensor formula of the definition.
pub fn decode_generic(key: &str, data: &[u8], catalog: &dyn Catalog) -> Vec<DecodedReading> {
    let Some(def) = catalog.lookup_pid(key) else {
        tracing::debug!(key, data = %hex_dump(data), "unknown PID");
        return vec![DecodedReading::error(
            "Unknown",
            ReadingFault::UnknownPid {
                key: key.to_string(),
                data: hex_dump(data),
            },
        )];
    };
    evaluate(def, data)
}

fn evaluate(def: &PidDefinition, data: &[u8]) -> Vec<DecodedReading> {
    if data.len() < def.bytes {
        return vec![DecodedReading::error(
            def.label(),
            ReadingFault::InsufficientData {
                expected: def.bytes,
                actual: data.len(),
            },
        )];
    }

    let bound = &data[..def.bytes];
    def.sensors
        .iter()
        .map(|sensor| {
            let Some(formula) = &sensor.formula else {
                return DecodedReading::error(&sensor.label, ReadingFault::FormulaUnknown);
            };
            let number = match formula.eval(bound) {
                Ok(n) => n,
                Err(e) => {
                    return DecodedReading::error(
                        &sensor.label,
                        ReadingFault::FormulaFailed {
                            message: e.to_string(),
                        },
                    );
                }
            };
            let value = number.as_f64();
            if value < sensor.min {
                DecodedReading::error(&sensor.label, ReadingFault::UnderMin { value, min: sensor.min })
            } else if value > sensor.max {
                DecodedReading::error(&sensor.label, ReadingFault::OverMax { value, max: sensor.max })
            } else {
                let value = match number {
                    Number::Int(v) => Value::Int(v),
                    Number::Float(v) => Value::Float(v),
                };
                DecodedReading::new(&sensor.label, value, &sensor.unit)
            }
        })
        .collect()
}

fn bit(byte: u8, index: usize) -> bool {
    (byte >> index) & 1 == 1
}

fn bits_lsb_first(byte: u8) -> Vec<bool> {
    (0..8).map(|i| bit(byte, i)).collect()
}

fn lowest_set_bit(byte: u8, limit: usize) -> Option<usize> {
    (0..limit).find(|&i| bit(byte, i))
}

/// PIDs 01 and 41: MIL, DTC count, ignition type and monitor readiness.
fn decode_monitors(pid: u8, data: &[u8]) -> Vec<DecodedReading> {
    let [a, b, c, d] = [data[0], data[1], data[2], data[3]];
    let mut readings = Vec::new();

    // Only the since-clear PID carries MIL and count.
    if pid == 0x01 {
        let mil = if bit(a, 7) { "ON" } else { "Off" };
        readings.push(DecodedReading::text("MIL", mil, ""));
        readings.push(DecodedReading::new("DTC count", Value::Int(i64::from(a & 0x7F)), ""));
    }

    let ignition = usize::from(bit(b, 3));
    readings.push(DecodedReading::new(
        "Ignition Type",
        Value::Int(ignition as i64),
        tables::IGNITION_TYPES[ignition],
    ));

    for (i, name) in tables::CONTINUOUS_MONITORS.iter().enumerate() {
        readings.push(monitor(name, bit(b, i), !bit(b, i + 4)));
    }

    if ignition == 0 {
        for (i, name) in tables::SPARK_MONITORS.iter().enumerate() {
            readings.push(monitor(name, bit(c, i), !bit(d, i)));
        }
    } else {
        for i in tables::COMPRESSION_MONITOR_BITS {
            readings.push(monitor(tables::COMPRESSION_MONITORS[i], bit(c, i), !bit(d, i)));
        }
    }

    readings
}

fn monitor(name: &str, supported: bool, ready: bool) -> DecodedReading {
    let (state, done) = match (supported, ready) {
        (false, _) => ("UNSUPPORTED", ""),
        (true, true) => ("SUPPORTED", "READY"),
        (true, false) => ("SUPPORTED", "INCOMPLETE"),
    };
    DecodedReading::text(name, state, done)
}

/// PID 03: one status per fuel system, lowest set bit wins.
fn decode_fuel_system(data: &[u8]) -> Vec<DecodedReading> {
    let limit = tables::FUEL_SYSTEM_STATUSES.len();
    data.iter()
        .take(2)
        .enumerate()
        .filter_map(|(n, byte)| {
            lowest_set_bit(*byte, limit).map(|i| {
                DecodedReading::new(
                    format!("Fuel system {} status", n + 1),
                    Value::Int(i as i64),
                    tables::FUEL_SYSTEM_STATUSES[i],
                )
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Trouble codes
// ---------------------------------------------------------------------------

/// Build the trouble code packed into two bytes, or `None` for `00 00`
/// padding.
pub fn decode_dtc_pair(a: u8, b: u8) -> Option<DtcCode> {
    if a == 0 && b == 0 {
        return None;
    }
    let category = DtcCategory::from_selector(a >> 6);
    let code = format!("{}{}{:X}{b:02X}", category.letter(), (a >> 4) & 0x03, a & 0x0F);
    Some(DtcCode {
        code,
        category,
        description: None,
    })
}

/// Decode a stream of trouble code pairs. An odd-length stream starts with
/// a count byte, which is skipped.
pub fn decode_dtcs(data: &[u8], catalog: &dyn Catalog) -> Vec<DecodedReading> {
    let data = if data.len() % 2 == 1 { &data[1..] } else { data };
    data.chunks_exact(2)
        .filter_map(|pair| decode_dtc_pair(pair[0], pair[1]))
        .map(|dtc| {
            let desc = catalog.lookup_dtc(&dtc.code).unwrap_or_default().to_string();
            DecodedReading::text("DTC", dtc.code, desc)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Mode 09
// ---------------------------------------------------------------------------

fn decode_vehicle_info(pid: u8, data: &[u8], catalog: &dyn Catalog) -> Vec<DecodedReading> {
    if is_feature_pid(pid) {
        return decode_feature_bitmap(Mode::VehicleInfo, pid, data);
    }
    let key = pid_key(Mode::VehicleInfo, pid);
    let label = |fallback: &str| {
        catalog
            .lookup_pid(&key)
            .map(|d| d.label().to_string())
            .unwrap_or_else(|| fallback.to_string())
    };

    match pid {
        0x02 => {
            let vin = data.get(data.len().saturating_sub(VIN_LEN)..).unwrap_or_default();
            vec![DecodedReading::text(label("Vehicle Identification Number"), decode_text(vin), "")]
        }
        0x04 => {
            let ids = &data[data.len() % CALIBRATION_ID_LEN..];
            let label = label("Calibration ID");
            ids.chunks_exact(CALIBRATION_ID_LEN)
                .map(|chunk| DecodedReading::text(&label, decode_text(trim_nul(chunk)), ""))
                .collect()
        }
        0x06 => {
            let cvns = &data[data.len() % CVN_LEN..];
            let label = label("Calibration Verification Numbers");
            cvns.chunks_exact(CVN_LEN)
                .map(|chunk| {
                    let hex: String = chunk.iter().map(|b| format!("{b:02X}")).collect();
                    DecodedReading::text(&label, hex, "")
                })
                .collect()
        }
        0x08 => decode_performance_counters(data, tables::SPARK_PERFORMANCE_COUNTERS),
        0x0B => decode_performance_counters(data, tables::COMPRESSION_PERFORMANCE_COUNTERS),
        0x0A => {
            let name = data.get(data.len().saturating_sub(ECU_NAME_LEN)..).unwrap_or_default();
            vec![DecodedReading::text(label("ECU name"), decode_text(trim_nul(name)), "")]
        }
        _ => decode_generic(&key, data, catalog),
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Printable ASCII passes through; anything else becomes
/// [`TEXT_PLACEHOLDER`].
pub fn decode_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                b as char
            } else {
                TEXT_PLACEHOLDER
            }
        })
        .collect()
}

/// Big-endian 16-bit counters, one per name, until names or data run out.
/// An odd-length stream starts with a count byte, which is skipped.
pub fn decode_performance_counters(data: &[u8], names: &[&str]) -> Vec<DecodedReading> {
    let data = if data.len() % 2 == 1 { &data[1..] } else { data };
    data.chunks_exact(2)
        .zip(names)
        .map(|(pair, name)| {
            let count = u16::from_be_bytes([pair[0], pair[1]]);
            DecodedReading::new(*name, Value::Int(i64::from(count)), "")
        })
        .collect()
}
