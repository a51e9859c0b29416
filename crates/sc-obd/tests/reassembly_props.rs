//! Property tests for frame reassembly.

use proptest::prelude::*;
use sc_obd::formatter::reassemble;
use sc_protocol::{FrameLayout, RawRecord};

/// Longest message that fits a first frame plus 15 continuation frames.
const MAX_MULTI_FRAME: usize = 6 + 15 * 7;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

/// Split `payload` into ISO-TP frames as printed by the adapter with headers on.
fn can_frames(ecu: &str, payload: &[u8]) -> Vec<String> {
    let len = payload.len();
    let mut lines = vec![format!(
        "{ecu} {:02X} {:02X} {}",
        0x10 | (len >> 8),
        len & 0xFF,
        hex(&payload[..6])
    )];
    for (i, chunk) in payload[6..].chunks(7).enumerate() {
        let mut frame = chunk.to_vec();
        frame.resize(7, 0xAA);
        lines.push(format!("{ecu} {:02X} {}", 0x20 | ((i + 1) & 0x0F), hex(&frame)));
    }
    lines
}

fn record(command: &str, lines: &[String]) -> RawRecord {
    let mut text = format!("{command}\r");
    for line in lines {
        text.push_str(line);
        text.push('\r');
    }
    RawRecord::from_text(&text)
}

fn shuffled_frames() -> impl Strategy<Value = (Vec<u8>, Vec<String>)> {
    prop::collection::vec(any::<u8>(), 8..=MAX_MULTI_FRAME).prop_flat_map(|payload| {
        let lines = can_frames("7E8", &payload);
        (Just(payload), Just(lines).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn multi_frame_order_does_not_matter((payload, lines) in shuffled_frames()) {
        let rec = reassemble(&record("0902", &lines), FrameLayout::CanHeaders).unwrap();
        prop_assert_eq!(rec.payload("7E8"), Some(payload.as_slice()));
    }

    #[test]
    fn single_frame_is_truncated_to_declared_count(
        data in prop::collection::vec(any::<u8>(), 1..=7),
        padding in prop::collection::vec(any::<u8>(), 7),
    ) {
        let mut frame = data.clone();
        frame.extend_from_slice(&padding[..7 - data.len()]);
        let line = format!("7E8 {:02X} {}", data.len(), hex(&frame));

        let rec = reassemble(&record("010C", &[line]), FrameLayout::CanHeaders).unwrap();
        prop_assert_eq!(rec.payload("7E8"), Some(data.as_slice()));
    }

    #[test]
    fn legacy_header_and_checksum_are_stripped(
        header in (any::<u8>(), any::<u8>(), any::<u8>()),
        pid in any::<u8>(),
        data in prop::collection::vec(any::<u8>(), 1..=4),
        checksum in any::<u8>(),
    ) {
        let (priority, receiver, sender) = header;
        let mut body = vec![0x41, pid];
        body.extend_from_slice(&data);
        let line = format!(
            "{priority:02X} {receiver:02X} {sender:02X} {} {checksum:02X}",
            hex(&body)
        );

        let rec = reassemble(&record("01", &[line]), FrameLayout::LegacyHeaders).unwrap();
        prop_assert_eq!(rec.payload(&format!("{sender:02X}")), Some(body.as_slice()));
    }
}
