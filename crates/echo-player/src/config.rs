//! Configuration loading and parsing.
//!
//! Defines the engine config schema and resolves defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Engine configuration as written in TOML. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfigFile {
    /// Maximum number of history entries kept.
    pub history_cap: Option<usize>,
    /// Maximum upcoming context entries exposed in a snapshot.
    pub upcoming_window: Option<usize>,
    /// Shuffle new contexts on start.
    pub default_shuffle: Option<bool>,
    /// Refill when fewer than this many context entries remain (shuffle only, 0 disables).
    pub refill_low_water: Option<usize>,
    /// `previous` restarts the current track past this elapsed time.
    pub previous_restart_ms: Option<u64>,
    /// Near-end window for the end-of-track watchdog.
    pub watchdog_epsilon_ms: Option<u64>,
    /// How long playback must dwell near the end before the watchdog fires.
    pub watchdog_grace_ms: Option<u64>,
    /// Default relative seek step.
    pub seek_step_ms: Option<u64>,
    /// Advance automatically when a track fails to resolve or load.
    pub skip_on_failure: Option<bool>,
    /// Stop auto-skipping after this many failures in a row.
    pub max_consecutive_failures: Option<u32>,
}

/// Resolved engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub history_cap: usize,
    pub upcoming_window: usize,
    pub default_shuffle: bool,
    pub refill_low_water: usize,
    pub previous_restart_ms: u64,
    pub watchdog_epsilon_ms: u64,
    pub watchdog_grace_ms: u64,
    pub seek_step_ms: u64,
    pub skip_on_failure: bool,
    pub max_consecutive_failures: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_cap: 20,
            upcoming_window: 20,
            default_shuffle: false,
            refill_low_water: 3,
            previous_restart_ms: 5_000,
            watchdog_epsilon_ms: 250,
            watchdog_grace_ms: 500,
            seek_step_ms: 10_000,
            skip_on_failure: true,
            max_consecutive_failures: 5,
        }
    }
}

impl EngineConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(raw: &str) -> Result<Self> {
        let file = toml::from_str::<EngineConfigFile>(raw)?;
        Ok(Self::from_file(file))
    }

    /// Resolve optional file values against the defaults.
    pub fn from_file(file: EngineConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            history_cap: file.history_cap.unwrap_or(defaults.history_cap).max(1),
            upcoming_window: file.upcoming_window.unwrap_or(defaults.upcoming_window),
            default_shuffle: file.default_shuffle.unwrap_or(defaults.default_shuffle),
            refill_low_water: file.refill_low_water.unwrap_or(defaults.refill_low_water),
            previous_restart_ms: file
                .previous_restart_ms
                .unwrap_or(defaults.previous_restart_ms),
            watchdog_epsilon_ms: file
                .watchdog_epsilon_ms
                .unwrap_or(defaults.watchdog_epsilon_ms),
            watchdog_grace_ms: file.watchdog_grace_ms.unwrap_or(defaults.watchdog_grace_ms),
            seek_step_ms: file.seek_step_ms.unwrap_or(defaults.seek_step_ms),
            skip_on_failure: file.skip_on_failure.unwrap_or(defaults.skip_on_failure),
            max_consecutive_failures: file
                .max_consecutive_failures
                .unwrap_or(defaults.max_consecutive_failures),
        }
    }

    pub fn watchdog_grace(&self) -> Duration {
        Duration::from_millis(self.watchdog_grace_ms)
    }
}
