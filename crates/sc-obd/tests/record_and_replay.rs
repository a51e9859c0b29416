//! A live session recorded through a file sink replays to the same records.

use std::sync::Arc;

use sc_obd::{
    FileTraceSink, MockChannel, Session, StaticCatalog, TraceChannel, decode_record,
};
use sc_protocol::Headers;

const QUERIES: &[&str] = &["0101", "010C", "0902", "03"];

#[tokio::test]
async fn recorded_session_replays_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drive.trace");

    let mock = MockChannel::elm327();
    let sink = FileTraceSink::open(&path).await.unwrap();
    let mut live = Session::new("ELM327")
        .unwrap()
        .with_channel(Box::new(mock))
        .with_headers(Headers::On)
        .with_trace_sink(Box::new(sink));
    live.connect().await.unwrap();

    let mut recorded = Vec::new();
    for q in QUERIES {
        recorded.push(live.issue(q).await.unwrap());
    }
    live.disconnect().await.unwrap();

    let mut replay = Session::new("ELM327")
        .unwrap()
        .with_channel(Box::new(TraceChannel::from_file(&path)));
    replay.connect().await.unwrap();

    // The connect-time protocol search went out before ATH1.
    let support = replay.next_record().await.unwrap().unwrap();
    assert_eq!(support.command, "0100");
    assert_eq!(support.payload("7E8").map(<[u8]>::len), Some(6));

    let catalog = Arc::new(StaticCatalog::with_defaults());
    for expected in &recorded {
        let got = replay.next_record().await.unwrap().unwrap();
        assert_eq!(got.command, expected.command);
        assert_eq!(got.responses, expected.responses);
        assert_eq!(
            decode_record(&got, catalog.as_ref()),
            decode_record(expected, catalog.as_ref())
        );
    }
    assert_eq!(replay.headers(), Headers::On);
    assert_eq!(replay.attr("Voltage"), "12.6V");

    assert!(replay.next_record().await.unwrap().is_none());
    assert_eq!(replay.headers(), Headers::Off, "final ATZ resets headers");
}

#[tokio::test]
async fn replay_of_missing_file_fails_to_connect() {
    let dir = tempfile::tempdir().unwrap();
    let mut replay = Session::new("ELM327")
        .unwrap()
        .with_channel(Box::new(TraceChannel::from_file(dir.path().join("nope.trace"))));
    assert!(matches!(
        replay.connect().await,
        Err(sc_obd::SessionError::Connect(_))
    ));
}
