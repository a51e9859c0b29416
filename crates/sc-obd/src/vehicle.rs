//! Vehicle aggregator: drives one session through feature discovery,
//! identity and diagnostic scans and keeps the latest time-stamped
//! readings per PID.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sc_protocol::{CanonicalRecord, DecodedReading, EcuReadings, Value};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::decode::decode_record;
use crate::error::{SessionError, SessionResult};
use crate::session::Session;

/// PIDs whose response is a support bitmap for the next 32 PIDs.
pub const FEATURE_PIDS: &[&str] = &[
    "0100", "0120", "0140", "0160", "0180", "01A0", "01C0", "01E0", //
    "0200", "0220", "0240", "0260", "0280", "02A0", "02C0", "02E0", //
    "0600", "0620", "0640", "0660", "0680", "06A0", "06C0", "06E0", //
    "0900",
];

/// Mandatory PIDs assumed supported before discovery runs.
pub const INITIAL_SUPPORTED: &[&str] = &[
    "0100", "0101", "0104", "0105", "010C", "010D", "0111", //
    "0200", "0202", "0204", "0205", "020C", "020D", "0211", //
    "0600", "0900",
];

/// Readiness and trouble-code history PIDs.
pub const DIAGNOSTIC_PIDS: &[&str] = &["0101", "0102", "0130", "0131", "014E", "0121", "014D", "0141"];

const STORED_DTCS: &str = "03";

/// Decoded response to one request, per ECU.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub key: String,
    pub taken_at: DateTime<Utc>,
    pub ecus: BTreeMap<String, EcuReadings>,
}

impl Snapshot {
    /// Decode `record` now. Undecodable ECU payloads are logged and left out.
    pub fn decode(record: &CanonicalRecord, catalog: &dyn Catalog) -> Self {
        let mut ecus = BTreeMap::new();
        for (ecu, decoded) in decode_record(record, catalog) {
            match decoded {
                Ok(readings) => {
                    ecus.insert(ecu, readings);
                }
                Err(e) => warn!(command = %record.command, ecu = %ecu, error = %e, "undecodable payload"),
            }
        }
        Self {
            key: record.command.clone(),
            taken_at: Utc::now(),
            ecus,
        }
    }

    /// All readings across ECUs, in ECU id order.
    pub fn readings(&self) -> impl Iterator<Item = &DecodedReading> {
        self.ecus.values().flat_map(|e| e.readings.iter())
    }

    pub fn find(&self, label: &str) -> Option<&DecodedReading> {
        self.readings().find(|r| r.label == label)
    }

    pub fn is_empty(&self) -> bool {
        self.ecus.is_empty()
    }
}

/// General vehicle identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleInfo {
    pub obd_standard: String,
    pub fuel_type: String,
    pub vin: String,
    pub calibration: String,
}

impl Default for VehicleInfo {
    fn default() -> Self {
        let unknown = || "Unknown".to_string();
        Self {
            obd_standard: unknown(),
            fuel_type: unknown(),
            vin: unknown(),
            calibration: unknown(),
        }
    }
}

/// MIL state, stored trouble codes and monitor readiness.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticStatus {
    pub mil: Option<bool>,
    pub dtc_count: Option<i64>,
    pub monitors: Vec<DecodedReading>,
    pub dtcs: Vec<DecodedReading>,
}

pub struct Vehicle {
    session: Session,
    catalog: Arc<dyn Catalog>,
    supported: BTreeSet<String>,
    info: VehicleInfo,
    status: DiagnosticStatus,
    latest: HashMap<String, Snapshot>,
}

impl Vehicle {
    pub fn new(session: Session, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            session,
            catalog,
            supported: INITIAL_SUPPORTED.iter().map(|p| (*p).to_string()).collect(),
            info: VehicleInfo::default(),
            status: DiagnosticStatus::default(),
            latest: HashMap::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn info(&self) -> &VehicleInfo {
        &self.info
    }

    pub fn status(&self) -> &DiagnosticStatus {
        &self.status
    }

    /// Supported PIDs in ascending order.
    pub fn supported(&self) -> impl Iterator<Item = &str> {
        self.supported.iter().map(String::as_str)
    }

    pub fn is_supported(&self, key: &str) -> bool {
        self.supported.contains(key)
    }

    /// Most recent snapshot for `key`, if it was ever read.
    pub fn last_reading(&self, key: &str) -> Option<&Snapshot> {
        self.latest.get(key)
    }

    /// Issue `key`, decode it and remember the result.
    pub async fn scan_pid(&mut self, key: &str) -> SessionResult<Snapshot> {
        let record = self.session.issue(key).await?;
        let snapshot = Snapshot::decode(&record, self.catalog.as_ref());
        debug!(key, ecus = snapshot.ecus.len(), "scanned");
        self.latest.insert(key.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    /// `scan_pid`, with a malformed response logged and skipped.
    async fn try_scan(&mut self, key: &str) -> SessionResult<Option<Snapshot>> {
        match self.scan_pid(key).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(SessionError::Format(e)) => {
                warn!(key, error = %e, "malformed response skipped");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Query every supported feature PID and grow the supported set. A
    /// feature PID nobody answers is dropped from the set.
    ///
    /// Returns the number of PIDs added.
    pub async fn scan_features(&mut self) -> SessionResult<usize> {
        let before = self.supported.len();
        for fpid in FEATURE_PIDS {
            if !self.supported.contains(*fpid) {
                continue;
            }
            let Some(snapshot) = self.try_scan(fpid).await? else {
                continue;
            };
            let found: Vec<String> = snapshot.ecus.values().flat_map(EcuReadings::supported_pids).collect();
            if found.is_empty() {
                debug!(feature = fpid, "feature query unanswered");
                self.supported.remove(*fpid);
                continue;
            }
            self.supported.extend(found);
        }
        let added = self.supported.len().saturating_sub(before);
        info!(supported = self.supported.len(), added, "feature scan complete");
        Ok(added)
    }

    /// OBD standard, fuel type, VIN and calibration id.
    pub async fn scan_info(&mut self) -> SessionResult<&VehicleInfo> {
        if let Some(s) = self.try_scan("011C").await? {
            if let Some(r) = s.readings().next() {
                self.info.obd_standard = r.unit.clone();
            }
        }
        if let Some(s) = self.try_scan("0151").await? {
            if let Some(r) = s.readings().next() {
                self.info.fuel_type = r.unit.clone();
            }
        }
        if let Some(s) = self.try_scan("0902").await? {
            if let Some(r) = s.readings().find(|r| !r.is_error()) {
                self.info.vin = r.value.to_string();
            }
        }
        if let Some(s) = self.try_scan("0904").await? {
            if let Some(r) = s.readings().find(|r| !r.is_error()) {
                self.info.calibration = r.value.to_string();
            }
        }
        info!(vin = %self.info.vin, standard = %self.info.obd_standard, "vehicle info");
        Ok(&self.info)
    }

    /// MIL, DTC count, monitor readiness and the other supported
    /// diagnostic PIDs.
    pub async fn scan_status(&mut self) -> SessionResult<&DiagnosticStatus> {
        let monitor = self.try_scan("0101").await?;
        self.status.mil = None;
        self.status.dtc_count = None;
        self.status.monitors.clear();
        for reading in monitor.iter().flat_map(Snapshot::readings) {
            match (reading.label.as_str(), &reading.value) {
                ("MIL", Value::Text(v)) => self.status.mil = Some(v == "ON"),
                ("DTC count", Value::Int(n)) => self.status.dtc_count = Some(*n),
                _ => self.status.monitors.push(reading.clone()),
            }
        }

        for dpid in DIAGNOSTIC_PIDS.iter().filter(|p| **p != "0101") {
            if self.supported.contains(*dpid) {
                self.try_scan(dpid).await?;
            }
        }

        if self.status.mil == Some(true) {
            warn!(dtc_count = ?self.status.dtc_count, "malfunction indicator lamp on");
        }
        Ok(&self.status)
    }

    /// Stored trouble codes from every ECU.
    pub async fn scan_dtcs(&mut self) -> SessionResult<&[DecodedReading]> {
        let snapshot = self.try_scan(STORED_DTCS).await?;
        self.status.dtcs = snapshot
            .iter()
            .flat_map(Snapshot::readings)
            .filter(|r| !r.is_error())
            .cloned()
            .collect();
        info!(count = self.status.dtcs.len(), "stored trouble codes");
        Ok(&self.status.dtcs)
    }

    /// One pass over every supported mode 01 sensor that is neither a
    /// feature nor a diagnostic PID.
    pub async fn curr_sensors(&mut self) -> SessionResult<Vec<Snapshot>> {
        let pids: Vec<String> = self
            .supported
            .iter()
            .filter(|p| p.starts_with("01"))
            .filter(|p| !FEATURE_PIDS.contains(&p.as_str()) && !DIAGNOSTIC_PIDS.contains(&p.as_str()))
            .cloned()
            .collect();
        let mut out = Vec::with_capacity(pids.len());
        for pid in pids {
            out.extend(self.try_scan(&pid).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::mock::MockChannel;
    use crate::tables;
    use sc_protocol::Headers;

    async fn vehicle(mock: &MockChannel) -> Vehicle {
        let mut session = Session::new("ELM327")
            .unwrap()
            .with_channel(Box::new(mock.clone()))
            .with_headers(Headers::On);
        session.connect().await.unwrap();
        Vehicle::new(session, Arc::new(StaticCatalog::with_defaults()))
    }

    #[tokio::test]
    async fn feature_scan_grows_supported_set() {
        let mock = MockChannel::elm327();
        let mut v = vehicle(&mock).await;
        let added = v.scan_features().await.unwrap();

        assert!(added > 0);
        for pid in ["0101", "0103", "0105", "0120", "0121"] {
            assert!(v.is_supported(pid), "{pid} missing");
        }
        // 0120 was answered but marks nothing past 0121; 0140 never queried.
        assert!(!v.is_supported("0140"));
        // Mode 02, 06 and 09 bitmaps got "?" and were dropped.
        assert!(!v.is_supported("0200"));
        assert!(!v.is_supported("0900"));
        assert!(mock.written().contains(&"0120".to_string()));
    }

    #[tokio::test]
    async fn info_scan_fills_identity() {
        let mock = MockChannel::elm327();
        let mut v = vehicle(&mock).await;
        let info = v.scan_info().await.unwrap().clone();

        assert_eq!(info.obd_standard, tables::lookup(tables::OBD_STANDARDS, 1));
        assert_eq!(info.fuel_type, tables::lookup(tables::FUEL_TYPES, 1));
        assert_eq!(info.vin, "1G1JC5444R7252367");
        assert_eq!(info.calibration, "JMB*36761500");
    }

    #[tokio::test]
    async fn status_scan_reads_mil_and_dtcs() {
        let mock = MockChannel::elm327();
        let mut v = vehicle(&mock).await;
        let status = v.scan_status().await.unwrap().clone();

        assert_eq!(status.mil, Some(true));
        assert_eq!(status.dtc_count, Some(1));
        assert!(!status.monitors.is_empty());
        assert!(status.dtcs.is_empty());

        let codes: Vec<String> = v.scan_dtcs().await.unwrap().iter().map(|r| r.value.to_string()).collect();
        assert_eq!(codes, ["P0133", "P0300"]);
        assert_eq!(v.status().dtcs.len(), 2);
    }

    #[tokio::test]
    async fn scan_pid_keeps_latest_snapshot() {
        let mock = MockChannel::elm327();
        let mut v = vehicle(&mock).await;
        assert!(v.last_reading("010D").is_none());

        let first = v.scan_pid("010D").await.unwrap();
        let speed = first.find("Vehicle speed").unwrap();
        assert_eq!(speed.value, Value::Int(60));

        let second = v.scan_pid("010D").await.unwrap();
        assert!(second.taken_at >= first.taken_at);
        assert_eq!(v.last_reading("010D"), Some(&second));
    }

    #[tokio::test]
    async fn current_sensors_skip_features_and_diagnostics() {
        let mock = MockChannel::elm327();
        let mut v = vehicle(&mock).await;
        let snapshots = v.curr_sensors().await.unwrap();
        let keys: Vec<&str> = snapshots.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["0104", "0105", "010C", "010D", "0111"]);
        assert!(snapshots[2].find("Engine RPM").is_some());
        // Unscripted PIDs answered "?" and decode to nothing.
        assert!(snapshots[0].is_empty());
    }

    #[tokio::test]
    async fn malformed_response_is_skipped() {
        let mock = MockChannel::elm327().respond_with_headers("0105", "7E8 03 41 05 ZZ");
        let mut v = vehicle(&mock).await;

        assert!(matches!(v.scan_pid("0105").await, Err(SessionError::Format(_))));
        let keys: Vec<String> = v.curr_sensors().await.unwrap().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, ["0104", "010C", "010D", "0111"]);
    }

    #[tokio::test]
    async fn snapshot_serializes_to_json() {
        let mock = MockChannel::elm327();
        let mut v = vehicle(&mock).await;
        let snapshot = v.scan_pid("010C").await.unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["key"], "010C");
        let ecu = &json["ecus"]["7E8"];
        assert_eq!(ecu["mode"], 1);
        assert_eq!(ecu["readings"][0]["label"], "Engine RPM");
        assert_eq!(ecu["readings"][0]["value"]["value"], 1726.0);
        assert_eq!(ecu["readings"][0]["unit"], "rpm");
    }
}
