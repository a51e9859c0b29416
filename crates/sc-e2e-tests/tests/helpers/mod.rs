//! Shared harness for end-to-end trace tests.
//!
//! Writes a recorded adapter session to a temp file and replays it through
//! a real `TraceChannel`, so every test crosses the channel, session,
//! formatter and decoder boundaries.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use sc_obd::{Catalog, DecodedRecord, Session, StaticCatalog, TraceChannel, decode_record};
use sc_protocol::CanonicalRecord;
use tempfile::TempDir;

pub struct TraceHarness {
    /// Keeps the trace file alive for the duration of the test.
    _dir: TempDir,
    pub path: PathBuf,
    pub session: Session,
    pub catalog: Arc<dyn Catalog>,
}

impl TraceHarness {
    /// Connected replay session over `trace`.
    pub async fn replay(trace: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.trace");
        std::fs::write(&path, trace).unwrap();

        let mut session = Session::new("ELM327")
            .unwrap()
            .with_channel(Box::new(TraceChannel::from_file(path.clone())));
        session.connect().await.unwrap();

        Self {
            _dir: dir,
            path,
            session,
            catalog: Arc::new(StaticCatalog::with_defaults()),
        }
    }

    /// Next application record; panics at end of trace.
    pub async fn next(&mut self) -> CanonicalRecord {
        self.session
            .next_record()
            .await
            .unwrap()
            .expect("trace ended early")
    }

    pub fn decode(&self, record: &CanonicalRecord) -> DecodedRecord {
        decode_record(record, self.catalog.as_ref())
    }

    pub async fn assert_exhausted(&mut self) {
        assert!(self.session.next_record().await.unwrap().is_none());
    }
}
