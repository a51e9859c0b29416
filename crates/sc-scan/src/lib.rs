//! OBD-II scan tool: library crate for the `sc-scan` binary.
//!
//! Exposes the config loader and the scan/replay runner so integration
//! tests can drive them against a mock adapter or a trace file.

pub mod config;
pub mod runner;
