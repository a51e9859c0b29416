//! Scan and replay runner. Readings are written as JSON lines.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use sc_obd::vehicle::{DiagnosticStatus, VehicleInfo};
use sc_obd::{
    Catalog, FileTraceSink, SerialChannel, Session, SessionError, Snapshot, StaticCatalog, TraceChannel, Vehicle,
};
use sc_protocol::{DecodedReading, Headers, Style};

use crate::config::{ChannelConfig, ScanConfig, ScanPlan};

/// One line of output.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent<'a> {
    Adapter {
        device: String,
        style: Style,
        headers: Headers,
        attrs: &'a BTreeMap<String, String>,
    },
    Supported {
        pids: Vec<&'a str>,
    },
    Info(&'a VehicleInfo),
    Status(&'a DiagnosticStatus),
    Dtcs {
        codes: &'a [DecodedReading],
    },
    Reading(&'a Snapshot),
}

/// Writes events as newline-delimited JSON.
pub struct Emitter<W> {
    out: W,
    count: usize,
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W) -> Self {
        Self { out, count: 0 }
    }

    pub fn emit(&mut self, event: &ScanEvent<'_>) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Built-in catalog, overlaid with the configured file if any.
pub fn load_catalog(config: &ScanConfig) -> anyhow::Result<StaticCatalog> {
    let catalog = match &config.catalog {
        Some(path) => StaticCatalog::load(path)?,
        None => StaticCatalog::with_defaults(),
    };
    info!(
        pids = catalog.pid_count(),
        dtcs = catalog.dtc_count(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Session over the configured channel, not yet connected.
pub async fn open_session(config: &ScanConfig) -> anyhow::Result<Session> {
    let mut session = Session::new(&config.device)?
        .with_headers(Headers::from(config.headers))
        .with_timeout(Duration::from_millis(config.timeout_ms))
        .with_max_wait(Duration::from_millis(config.max_wait_ms));

    session = match &config.channel {
        ChannelConfig::Serial { path, baud } => session.with_channel(Box::new(SerialChannel::new(path.as_str(), *baud))),
        ChannelConfig::Trace { path } => session.with_channel(Box::new(TraceChannel::from_file(path.clone()))),
    };

    if let Some(path) = &config.record_trace {
        if config.is_replay() {
            warn!(path = %path.display(), "record_trace ignored while replaying");
        } else {
            let sink = FileTraceSink::open(path).await?;
            info!(path = %path.display(), "recording trace");
            session = session.with_trace_sink(Box::new(sink));
        }
    }
    Ok(session)
}

/// Run a live scan or a trace replay, depending on the channel.
///
/// Returns the number of events written.
pub async fn run<W: Write>(
    config: &ScanConfig,
    session: Session,
    catalog: Arc<dyn Catalog>,
    out: W,
) -> anyhow::Result<usize> {
    let mut emitter = Emitter::new(out);
    if config.is_replay() {
        replay(session, catalog.as_ref(), &mut emitter).await?;
    } else {
        let mut vehicle = Vehicle::new(session, catalog);
        scan(&config.scan, &mut vehicle, &mut emitter).await?;
        vehicle.session_mut().disconnect().await?;
    }
    Ok(emitter.count())
}

/// Connect and run every scan the plan asks for.
pub async fn scan<W: Write>(plan: &ScanPlan, vehicle: &mut Vehicle, emitter: &mut Emitter<W>) -> anyhow::Result<()> {
    vehicle.session_mut().connect().await?;
    emit_adapter(vehicle.session(), emitter)?;

    vehicle.scan_features().await?;
    emitter.emit(&ScanEvent::Supported {
        pids: vehicle.supported().collect(),
    })?;

    if plan.info {
        let info = vehicle.scan_info().await?;
        emitter.emit(&ScanEvent::Info(info))?;
    }
    if plan.status {
        let status = vehicle.scan_status().await?;
        emitter.emit(&ScanEvent::Status(status))?;
    }
    if plan.dtcs {
        let codes = vehicle.scan_dtcs().await?;
        emitter.emit(&ScanEvent::Dtcs { codes })?;
    }
    if plan.sensors {
        for pass in 0..plan.passes {
            let snapshots = vehicle.curr_sensors().await?;
            info!(pass, readings = snapshots.len(), "sensor pass complete");
            for snapshot in &snapshots {
                emitter.emit(&ScanEvent::Reading(snapshot))?;
            }
        }
    }
    for pid in &plan.pids {
        match vehicle.scan_pid(pid).await {
            Ok(snapshot) => emitter.emit(&ScanEvent::Reading(&snapshot))?,
            Err(SessionError::Format(e)) => warn!(pid = %pid, error = %e, "malformed response skipped"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Decode every application record of a recorded session.
pub async fn replay<W: Write>(mut session: Session, catalog: &dyn Catalog, emitter: &mut Emitter<W>) -> anyhow::Result<()> {
    session.connect().await?;
    let mut records = 0usize;
    loop {
        match session.next_record().await {
            Ok(Some(record)) => {
                records += 1;
                emitter.emit(&ScanEvent::Reading(&Snapshot::decode(&record, catalog)))?;
            }
            Ok(None) => break,
            Err(SessionError::Format(e)) => warn!(error = %e, "malformed record skipped"),
            Err(e) => return Err(e.into()),
        }
    }
    emit_adapter(&session, emitter)?;
    session.disconnect().await?;
    info!(records, "replay complete");
    Ok(())
}

fn emit_adapter<W: Write>(session: &Session, emitter: &mut Emitter<W>) -> anyhow::Result<()> {
    emitter.emit(&ScanEvent::Adapter {
        device: session.device().to_string(),
        style: session.style(),
        headers: session.headers(),
        attrs: session.attrs(),
    })
}
