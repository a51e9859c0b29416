//! Record formatter: classify a raw adapter record and reassemble its
//! response lines into per-ECU payloads.
//!
//! Four wire layouts, selected by [`FrameLayout`]:
//!
//! | layout | line shape |
//! |---|---|
//! | CAN, headers | `7E8 10 14 49 02 01 31 47 31` (id, PCI, payload) |
//! | CAN, no headers | `014` / `0: 49 02 01 31 47 31` / `1: ...` or bare single frames |
//! | legacy, headers | `48 6B 10 41 0C 1A F8 C2` (priority, receiver, sender, ..., checksum) |
//! | legacy, no headers | `41 0C 1A F8` |

use std::collections::BTreeMap;

use sc_protocol::{CanonicalRecord, FrameLayout, Mode, RawLine, RawRecord};

use crate::error::FormatError;

/// Frames accepted from one ECU in one response. Continuation frames
/// are ordered by a lexical sort, which only holds for sequence numbers
/// `1..=F` following the first frame.
pub const MAX_FRAMES_PER_ECU: usize = 16;

/// First synthetic ECU id for CAN responses without headers.
pub const CAN_SYNTHETIC_BASE: u16 = 0x7E8;

/// Synthetic ECU id for legacy responses without headers.
pub const LEGACY_SYNTHETIC_ID: &str = "09";

const LEGACY_HEADER_TOKENS: usize = 3;
const CAN_29BIT_ID_TOKENS: usize = 4;

/// What kind of record the adapter produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Empty, or the adapter did not understand the command.
    Noise,
    /// Echo of an `AT` command; handled by the session, never decoded.
    AdapterStatus,
    /// OBD-II response lines.
    Application,
}

pub fn classify(record: &RawRecord) -> RecordKind {
    let Some(echo) = record.echo() else {
        return RecordKind::Noise;
    };
    match echo.first() {
        None | Some("?") => RecordKind::Noise,
        Some(_) if echo.compact().starts_with("AT") => RecordKind::AdapterStatus,
        Some(_) => RecordKind::Application,
    }
}

/// Reassemble an application record. Status lines must already have been
/// removed; a record with no response lines yields an empty map.
pub fn reassemble(record: &RawRecord, layout: FrameLayout) -> Result<CanonicalRecord, FormatError> {
    let command = record.echo().map(RawLine::compact).unwrap_or_default();
    if record.len() < 2 {
        return Ok(CanonicalRecord::no_data(command));
    }

    let lines = record.responses();
    let responses = match layout {
        FrameLayout::CanHeaders => can_headers(lines)?,
        FrameLayout::CanNoHeaders => can_no_headers(lines)?,
        FrameLayout::LegacyHeaders => legacy_headers(lines)?,
        FrameLayout::LegacyNoHeaders => legacy_no_headers(lines)?,
    };
    Ok(CanonicalRecord::new(command, responses))
}

fn parse_byte(token: &str) -> Result<u8, FormatError> {
    if token.len() > 2 {
        return Err(FormatError::InvalidToken {
            token: token.to_string(),
        });
    }
    u8::from_str_radix(token, 16).map_err(|_| FormatError::InvalidToken {
        token: token.to_string(),
    })
}

fn parse_bytes(tokens: &[String]) -> Result<Vec<u8>, FormatError> {
    tokens.iter().map(|t| parse_byte(t)).collect()
}

fn synthetic_can_id(index: usize) -> String {
    format!("{:03X}", usize::from(CAN_SYNTHETIC_BASE) + index)
}

/// Mode and parameter-id tokens at the start of a payload line, plus the
/// mode 09 sequence token that follows them.
fn prefix_len(first_token: Option<&str>) -> (usize, bool) {
    let mode = first_token
        .and_then(|t| parse_byte(t).ok())
        .and_then(Mode::from_response);
    match mode {
        Some(m) => (1 + m.pid_len(), m == Mode::VehicleInfo),
        None => (1, false),
    }
}

// ── CAN, headers on ─────────────────────────────────────────────

#[derive(Default)]
struct IsoTpAccumulator {
    declared: usize,
    payload: Vec<u8>,
    frames: usize,
    overflowed: bool,
}

impl IsoTpAccumulator {
    fn extend(&mut self, bytes: &[u8]) {
        for b in bytes {
            if self.payload.len() >= self.declared {
                break;
            }
            self.payload.push(*b);
        }
    }
}

/// Split a line into its ECU id and the tokens after it. 11-bit ids are a
/// single three-digit token; 29-bit ids span four byte tokens.
fn split_can_id(tokens: &[String]) -> Option<(String, &[String])> {
    let first = tokens.first()?;
    if first.len() == 3 {
        return Some((first.to_uppercase(), &tokens[1..]));
    }
    if tokens.len() > CAN_29BIT_ID_TOKENS {
        let id = tokens[..CAN_29BIT_ID_TOKENS].concat().to_uppercase();
        return Some((id, &tokens[CAN_29BIT_ID_TOKENS..]));
    }
    None
}

fn can_headers(lines: &[RawLine]) -> Result<BTreeMap<String, Vec<u8>>, FormatError> {
    let mut sorted = lines.to_vec();
    sorted.sort();

    let mut ecus: BTreeMap<String, IsoTpAccumulator> = BTreeMap::new();
    for line in &sorted {
        let Some((id, rest)) = split_can_id(line.tokens()) else {
            tracing::warn!(line = %line.joined(), "CAN line without an ECU id, skipped");
            continue;
        };
        let Some((pci, frame)) = rest.split_first() else {
            tracing::warn!(ecu = %id, "CAN line without a PCI byte, skipped");
            continue;
        };
        let pci = parse_byte(pci)?;
        let frame = parse_bytes(frame)?;

        let acc = ecus.entry(id.clone()).or_default();
        acc.frames += 1;
        if acc.frames > MAX_FRAMES_PER_ECU {
            if !acc.overflowed {
                tracing::warn!(ecu = %id, limit = MAX_FRAMES_PER_ECU, "too many frames, response truncated");
                acc.overflowed = true;
            }
            continue;
        }

        match pci >> 4 {
            0x0 => {
                acc.declared = usize::from(pci & 0x0F);
                acc.payload.clear();
                acc.extend(&frame);
            }
            0x1 => {
                let Some((low, data)) = frame.split_first() else {
                    tracing::warn!(ecu = %id, "first frame without length byte, skipped");
                    continue;
                };
                acc.declared = (usize::from(pci & 0x0F) << 8) | usize::from(*low);
                acc.payload.clear();
                acc.extend(data);
            }
            0x2 => acc.extend(&frame),
            other => {
                tracing::debug!(ecu = %id, frame_type = other, "non-data frame ignored");
            }
        }
    }

    Ok(ecus
        .into_iter()
        .filter(|(_, acc)| acc.declared > 0)
        .map(|(id, acc)| (id, acc.payload))
        .collect())
}

// ── CAN, headers off ────────────────────────────────────────────

fn is_count_header(line: &RawLine) -> bool {
    line.len() == 1 && line.first().is_some_and(|t| t.len() == 3)
}

fn can_no_headers(lines: &[RawLine]) -> Result<BTreeMap<String, Vec<u8>>, FormatError> {
    let mut out = BTreeMap::new();

    if lines.len() >= 2 && is_count_header(&lines[0]) {
        let mut source: Option<(usize, Vec<u8>)> = None;
        for line in lines {
            if line.len() == 1 {
                if let Some((declared, payload)) = source.take() {
                    finish_can_source(&mut out, declared, payload);
                }
                let token = line.first().unwrap_or_default();
                let declared = usize::from_str_radix(token, 16).map_err(|_| FormatError::InvalidToken {
                    token: token.to_string(),
                })?;
                source = Some((declared, Vec::with_capacity(declared)));
                continue;
            }
            let Some((declared, payload)) = source.as_mut() else {
                continue;
            };
            // First token is the `N:` line number.
            for byte in parse_bytes(line.tokens().get(1..).unwrap_or_default())? {
                if payload.len() >= *declared {
                    break;
                }
                payload.push(byte);
            }
        }
        if let Some((declared, payload)) = source {
            finish_can_source(&mut out, declared, payload);
        }
        return Ok(out);
    }

    for line in lines {
        let id = synthetic_can_id(out.len());
        out.insert(id, parse_bytes(line.tokens())?);
    }
    Ok(out)
}

fn finish_can_source(out: &mut BTreeMap<String, Vec<u8>>, declared: usize, payload: Vec<u8>) {
    if payload.len() < declared {
        tracing::warn!(declared, received = payload.len(), "multi-frame message shorter than declared");
    }
    let id = synthetic_can_id(out.len());
    out.insert(id, payload);
}

// ── Legacy, headers on ──────────────────────────────────────────

fn legacy_headers(lines: &[RawLine]) -> Result<BTreeMap<String, Vec<u8>>, FormatError> {
    let mut sorted = lines.to_vec();
    sorted.sort();

    let mut out: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for (index, line) in sorted.iter().enumerate() {
        let tokens = line.tokens();
        let body = tokens.get(LEGACY_HEADER_TOKENS..).unwrap_or_default();
        let (prefix, sequenced) = prefix_len(body.first().map(String::as_str));
        let needed = LEGACY_HEADER_TOKENS + prefix + 1;
        if tokens.len() < needed {
            return Err(FormatError::TruncatedHeader {
                line: index,
                tokens: tokens.len(),
                needed,
            });
        }

        let sender = tokens[2].to_uppercase();
        // Drop the checksum.
        let body = &body[..body.len() - 1];

        match out.get_mut(&sender) {
            None => {
                out.insert(sender, parse_bytes(body)?);
            }
            Some(payload) => {
                let skip = (prefix + usize::from(sequenced)).min(body.len());
                payload.extend(parse_bytes(&body[skip..])?);
            }
        }
    }
    Ok(out)
}

// ── Legacy, headers off ─────────────────────────────────────────

fn legacy_no_headers(lines: &[RawLine]) -> Result<BTreeMap<String, Vec<u8>>, FormatError> {
    let Some((first, rest)) = lines.split_first() else {
        return Ok(BTreeMap::new());
    };
    let mut payload = parse_bytes(first.tokens())?;
    let (prefix, sequenced) = prefix_len(first.first());
    let skip = prefix + usize::from(sequenced);
    for line in rest {
        let tokens = line.tokens();
        payload.extend(parse_bytes(tokens.get(skip..).unwrap_or_default())?);
    }

    let mut out = BTreeMap::new();
    out.insert(LEGACY_SYNTHETIC_ID.to_string(), payload);
    Ok(out)
}
