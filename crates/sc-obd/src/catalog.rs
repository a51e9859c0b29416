//! Parameter and trouble-code catalog.
//!
//! The decoder only sees the [`Catalog`] trait. [`StaticCatalog`] starts
//! from the built-in tables in [`crate::pid_db`] and [`crate::dtc_db`] and
//! can be overlaid with entries from a TOML file:
//!
//! ```toml
//! [[pid]]
//! mode = "01"
//! pid = "0C"
//! bytes = 2
//!
//! [[pid.sensor]]
//! label = "Engine RPM"
//! min = 0.0
//! max = 16383.75
//! unit = "rpm"
//! formula = "((A*256)+B)/4.0"
//!
//! [dtc]
//! P0300 = "Random/Multiple Cylinder Misfire Detected"
//! ```

use std::collections::HashMap;
use std::path::Path;

use sc_protocol::normalize_key;
use serde::Deserialize;

use crate::dtc_db;
use crate::error::CatalogError;
use crate::formula::Formula;
use crate::pid_db;

/// Read-only lookup service injected into the decoder.
pub trait Catalog: Send + Sync {
    /// Definition for a normalized mode+pid key (`"010C"`).
    fn lookup_pid(&self, key: &str) -> Option<&PidDefinition>;

    /// Description for a five-character trouble code (`"P0300"`).
    fn lookup_dtc(&self, code: &str) -> Option<&str>;
}

/// One sensor carried by a PID.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDefinition {
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    /// `None` when the catalog has no formula for this sensor.
    pub formula: Option<Formula>,
}

/// Expected data length and sensors for one mode+pid.
#[derive(Debug, Clone, PartialEq)]
pub struct PidDefinition {
    pub key: String,
    pub bytes: usize,
    pub sensors: Vec<SensorDefinition>,
}

impl PidDefinition {
    /// Label of the first sensor, or the key when there is none.
    pub fn label(&self) -> &str {
        self.sensors
            .first()
            .map(|s| s.label.as_str())
            .unwrap_or(&self.key)
    }
}

// ── TOML file shape ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    pid: Vec<PidEntry>,
    #[serde(default)]
    dtc: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PidEntry {
    mode: String,
    pid: String,
    bytes: usize,
    #[serde(default)]
    sensor: Vec<SensorEntry>,
}

#[derive(Debug, Deserialize)]
struct SensorEntry {
    label: String,
    #[serde(default)]
    min: f64,
    #[serde(default)]
    max: f64,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    formula: String,
}

// ── Static catalog ──────────────────────────────────────────────

/// In-memory catalog. Immutable once handed to a decoder.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pids: HashMap<String, PidDefinition>,
    dtcs: HashMap<String, String>,
}

impl StaticCatalog {
    /// A catalog with no entries at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in PID and DTC tables.
    pub fn with_defaults() -> Self {
        let pids = pid_db::DEFAULT_PIDS
            .iter()
            .map(|(key, bytes, sensors)| {
                let sensors = sensors
                    .iter()
                    .map(|(label, min, max, unit, formula)| SensorDefinition {
                        label: (*label).to_string(),
                        min: *min,
                        max: *max,
                        unit: (*unit).to_string(),
                        formula: compile_builtin(key, formula),
                    })
                    .collect();
                let def = PidDefinition {
                    key: (*key).to_string(),
                    bytes: *bytes,
                    sensors,
                };
                ((*key).to_string(), def)
            })
            .collect();

        let dtcs = dtc_db::DEFAULT_DTCS
            .iter()
            .map(|(code, desc)| ((*code).to_string(), (*desc).to_string()))
            .collect();

        Self { pids, dtcs }
    }

    /// Parse a catalog file on its own, without the built-in tables.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let mut catalog = Self::empty();
        catalog.overlay_toml_str(content)?;
        Ok(catalog)
    }

    /// Built-in tables overlaid with the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let mut catalog = Self::with_defaults();
        catalog.overlay_file(path)?;
        Ok(catalog)
    }

    pub fn overlay_file(&mut self, path: impl AsRef<Path>) -> Result<usize, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.overlay_toml_str(&content)
    }

    /// Merge entries from TOML text, replacing same-keyed entries. Returns
    /// the number of entries merged. Nothing is merged if any formula fails
    /// to compile.
    pub fn overlay_toml_str(&mut self, content: &str) -> Result<usize, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;

        let mut pids = Vec::with_capacity(file.pid.len());
        for entry in file.pid {
            let key = normalize_key(&entry.mode, &entry.pid);
            let mut sensors = Vec::with_capacity(entry.sensor.len());
            for s in entry.sensor {
                let formula = match s.formula.trim() {
                    "" => None,
                    src => Some(Formula::compile(src).map_err(|source| CatalogError::Formula {
                        key: key.clone(),
                        formula: src.to_string(),
                        source,
                    })?),
                };
                sensors.push(SensorDefinition {
                    label: s.label,
                    min: s.min,
                    max: s.max,
                    unit: s.unit,
                    formula,
                });
            }
            pids.push(PidDefinition {
                key,
                bytes: entry.bytes,
                sensors,
            });
        }

        let merged = pids.len() + file.dtc.len();
        for def in pids {
            self.pids.insert(def.key.clone(), def);
        }
        for (code, desc) in file.dtc {
            self.dtcs.insert(code.trim().to_uppercase(), desc);
        }
        tracing::debug!(merged, total_pids = self.pids.len(), total_dtcs = self.dtcs.len(), "catalog overlay applied");
        Ok(merged)
    }

    pub fn pid_count(&self) -> usize {
        self.pids.len()
    }

    pub fn dtc_count(&self) -> usize {
        self.dtcs.len()
    }
}

/// Empty means the PID is decoded without a formula. A built-in formula
/// that does not compile is logged and left out.
fn compile_builtin(key: &str, src: &str) -> Option<Formula> {
    match src.trim() {
        "" => None,
        src => match Formula::compile(src) {
            Ok(formula) => Some(formula),
            Err(e) => {
                tracing::error!(key, formula = src, error = %e, "built-in formula does not compile");
                None
            }
        },
    }
}

impl Catalog for StaticCatalog {
    fn lookup_pid(&self, key: &str) -> Option<&PidDefinition> {
        self.pids.get(key)
    }

    fn lookup_dtc(&self, code: &str) -> Option<&str> {
        self.dtcs.get(code).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Number;

    const OVERLAY: &str = r#"
[[pid]]
mode = "1"
pid = "c"
bytes = 2

[[pid.sensor]]
label = "Engine speed"
min = 0.0
max = 8000.0
unit = "rpm"
formula = "((A*256)+B)/4"

[[pid]]
mode = "01"
pid = "FE"
bytes = 1

[[pid.sensor]]
label = "Mystery"

[dtc]
p1234 = "Vendor specific fault"
"#;

    #[test]
    fn defaults_cover_common_pids() {
        let cat = StaticCatalog::with_defaults();
        let rpm = cat.lookup_pid("010C").unwrap();
        assert_eq!(rpm.bytes, 2);
        assert_eq!(rpm.label(), "Engine RPM");
        let f = rpm.sensors[0].formula.as_ref().unwrap();
        assert_eq!(f.eval(&[0x1A, 0xF8]).unwrap(), Number::Float(1726.0));

        // Special-cased PIDs carry no formula.
        assert!(cat.lookup_pid("0101").unwrap().sensors[0].formula.is_none());
        assert!(cat.lookup_dtc("P0300").is_some());
    }

    #[test]
    fn every_builtin_formula_compiles() {
        let cat = StaticCatalog::with_defaults();
        for (key, _, sensors) in pid_db::DEFAULT_PIDS {
            let def = cat.lookup_pid(key).unwrap();
            for (row, sensor) in sensors.iter().zip(&def.sensors) {
                let src = row.4;
                assert_eq!(sensor.formula.is_some(), !src.is_empty(), "{key} {src:?}");
                if !src.is_empty() {
                    assert!(Formula::compile(src).is_ok(), "{key} {src:?}");
                }
            }
        }
        assert!(compile_builtin("01FF", "").is_none());
        assert!(compile_builtin("01FF", "A +").is_none());
    }

    #[test]
    fn overlay_replaces_and_adds() {
        let mut cat = StaticCatalog::with_defaults();
        let before = cat.pid_count();
        let merged = cat.overlay_toml_str(OVERLAY).unwrap();
        assert_eq!(merged, 3);
        assert_eq!(cat.pid_count(), before + 1);

        let rpm = cat.lookup_pid("010C").unwrap();
        assert_eq!(rpm.sensors[0].label, "Engine speed");
        assert_eq!(rpm.sensors[0].max, 8000.0);

        let mystery = cat.lookup_pid("01FE").unwrap();
        assert!(mystery.sensors[0].formula.is_none());
        assert_eq!(cat.lookup_dtc("P1234"), Some("Vendor specific fault"));
    }

    #[test]
    fn bad_formula_rejects_whole_file() {
        let mut cat = StaticCatalog::empty();
        let err = cat
            .overlay_toml_str(
                r#"
[[pid]]
mode = "01"
pid = "05"
bytes = 1

[[pid.sensor]]
label = "Coolant"
formula = "exec(A)"
"#,
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Formula { ref key, .. } if key == "0105"));
        assert_eq!(cat.pid_count(), 0);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = StaticCatalog::from_toml_str("[[pid]]\nmode = ").unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn load_reads_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, OVERLAY).unwrap();

        let cat = StaticCatalog::load(&path).unwrap();
        assert!(cat.lookup_pid("0105").is_some());
        assert!(cat.lookup_pid("01FE").is_some());

        let missing = StaticCatalog::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, CatalogError::Io { .. }));
    }
}
