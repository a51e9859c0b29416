//! E2E tests driving the scan tool runner: a live scan against the mock
//! adapter is recorded, then replayed from the trace file.

use std::sync::Arc;

use sc_obd::{Catalog, MockChannel, Session, StaticCatalog};
use sc_scan::config::ScanConfig;
use sc_scan::runner;
use serde_json::Value;

fn events(out: Vec<u8>) -> Vec<Value> {
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn e2e_live_scan_then_replay() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("drive.trace");
    let catalog: Arc<dyn Catalog> = Arc::new(StaticCatalog::with_defaults());

    // ── Live scan, recorded ─────────────────────────────────────
    let live: ScanConfig = toml::from_str(&format!(
        r#"
record_trace = "{}"

[channel]
type = "serial"
path = "/dev/ttyUSB0"

[scan]
info = false
status = false
sensors = false
pids = ["010C", "010D"]
"#,
        trace.display()
    ))
    .unwrap();
    let sink = sc_obd::FileTraceSink::open(&trace).await.unwrap();
    let session = Session::new(&live.device)
        .unwrap()
        .with_headers(live.headers.into())
        .with_trace_sink(Box::new(sink))
        .with_channel(Box::new(MockChannel::elm327()));

    let mut out = Vec::new();
    runner::run(&live, session, catalog.clone(), &mut out).await.unwrap();
    let live_events = events(out);
    let live_readings: Vec<&Value> = live_events.iter().filter(|e| e["event"] == "reading").collect();
    assert_eq!(live_readings.len(), 2);
    assert_eq!(live_readings[0]["key"], "010C");

    // ── Replay of the recording ─────────────────────────────────
    let replay: ScanConfig = toml::from_str(&format!(
        "[channel]\ntype = \"trace\"\npath = \"{}\"\n",
        trace.display()
    ))
    .unwrap();
    let session = runner::open_session(&replay).await.unwrap();
    let mut out = Vec::new();
    runner::run(&replay, session, catalog, &mut out).await.unwrap();
    let replay_events = events(out);

    // Every live reading shows up again with identical ECU readings.
    for expected in &live_readings {
        let again = replay_events
            .iter()
            .find(|e| e["event"] == "reading" && e["key"] == expected["key"])
            .unwrap_or_else(|| panic!("{} missing from replay", expected["key"]));
        assert_eq!(again["ecus"], expected["ecus"]);
    }
    let adapter = replay_events.last().unwrap();
    assert_eq!(adapter["event"], "adapter");
    assert_eq!(adapter["attrs"]["Firmware"], "ELM327 v1.5");
}

/// A request the adapter never completes is recorded as an empty answer,
/// so the replay lines up with the live scan for every later request.
#[tokio::test]
async fn e2e_timed_out_request_replays_identically() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("stalled.trace");
    let catalog: Arc<dyn Catalog> = Arc::new(StaticCatalog::with_defaults());

    let live: ScanConfig = toml::from_str(
        r#"
[channel]
type = "serial"
path = "/dev/ttyUSB0"

[scan]
info = false
status = false
dtcs = false
sensors = false
pids = ["0105", "010D", "010C"]
"#,
    )
    .unwrap();
    let sink = sc_obd::FileTraceSink::open(&trace).await.unwrap();
    let session = Session::new(&live.device)
        .unwrap()
        .with_headers(live.headers.into())
        .with_trace_sink(Box::new(sink))
        .with_channel(Box::new(MockChannel::elm327().silence("0105")));

    let mut out = Vec::new();
    runner::run(&live, session, catalog.clone(), &mut out).await.unwrap();
    let live_readings: Vec<Value> = events(out)
        .into_iter()
        .filter(|e| e["event"] == "reading")
        .collect();
    let keys: Vec<&str> = live_readings.iter().map(|e| e["key"].as_str().unwrap()).collect();
    assert_eq!(keys, ["0105", "010D", "010C"]);
    assert_eq!(live_readings[0]["ecus"], serde_json::json!({}));

    let replay: ScanConfig = toml::from_str(&format!(
        "[channel]\ntype = \"trace\"\npath = \"{}\"\n",
        trace.display()
    ))
    .unwrap();
    let session = runner::open_session(&replay).await.unwrap();
    let mut out = Vec::new();
    runner::run(&replay, session, catalog, &mut out).await.unwrap();
    let replayed: Vec<Value> = events(out)
        .into_iter()
        .filter(|e| e["event"] == "reading" && keys.contains(&e["key"].as_str().unwrap_or_default()))
        .collect();

    assert_eq!(replayed.len(), live_readings.len());
    for (again, expected) in replayed.iter().zip(&live_readings) {
        assert_eq!(again["key"], expected["key"]);
        assert_eq!(again["ecus"], expected["ecus"]);
    }
}
