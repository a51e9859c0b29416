//! Scan tool configuration, loadable from TOML.

use std::path::PathBuf;

use serde::Deserialize;

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/scantool/scan.toml";

/// Top-level configuration for the scan tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Reader chip type. Only `ELM327` is supported.
    #[serde(default = "default_device")]
    pub device: String,
    /// Ask the adapter to print frame headers (`ATH1`).
    #[serde(default = "default_headers")]
    pub headers: bool,
    /// Idle time allowed between two bytes of one response.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Upper bound on one whole response.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Emit logs as JSON instead of text.
    #[serde(default)]
    pub json_logs: bool,
    /// Extra PID/DTC definitions layered over the built-in catalog.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Append every byte read from a live adapter to this file.
    #[serde(default)]
    pub record_trace: Option<PathBuf>,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub scan: ScanPlan,
}

/// Where the adapter bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Serial {
        path: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
    Trace {
        path: PathBuf,
    },
}

/// Which scans a live run performs. Ignored for trace replay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanPlan {
    #[serde(default = "default_true")]
    pub info: bool,
    #[serde(default = "default_true")]
    pub status: bool,
    #[serde(default = "default_true")]
    pub dtcs: bool,
    #[serde(default = "default_true")]
    pub sensors: bool,
    /// Passes over the current sensors.
    #[serde(default = "default_passes")]
    pub passes: u32,
    /// Additional PIDs read once, e.g. `["0902", "0906"]`.
    #[serde(default)]
    pub pids: Vec<String>,
}

impl Default for ScanPlan {
    fn default() -> Self {
        Self {
            info: true,
            status: true,
            dtcs: true,
            sensors: true,
            passes: default_passes(),
            pids: Vec::new(),
        }
    }
}

fn default_device() -> String {
    "ELM327".to_string()
}

fn default_headers() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_max_wait_ms() -> u64 {
    10_000
}

fn default_baud() -> u32 {
    sc_obd::channel::DEFAULT_BAUD
}

fn default_passes() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ScanConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn is_replay(&self) -> bool {
        matches!(self.channel, ChannelConfig::Trace { .. })
    }
}
