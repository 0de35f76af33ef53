//! Benchmark configuration
//!
//! The config document is YAML key–value. Unknown keys are ignored and
//! every key has a documented default, so an empty file is a valid run.
//! Validation happens at load time, before any core object is built; a
//! bad document surfaces as a context-carrying error and exit code 1.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_duration_sec() -> u64 {
    10
}
fn default_mode() -> String {
    "single_thread".to_string()
}
fn default_pipeline_stages() -> u32 {
    2
}
fn default_message_rate() -> u64 {
    100_000
}
fn default_message_pattern() -> String {
    "uniform".to_string()
}
fn default_strategy() -> String {
    "pass_through".to_string()
}
fn default_trade_signal_ratio() -> f64 {
    1.0
}
fn default_num_symbols() -> usize {
    1
}
fn default_symbol_prefix() -> String {
    "SYM".to_string()
}
fn default_book_depth_levels() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> String {
    "./logs".to_string()
}
fn default_log_output() -> String {
    "hftperf.log".to_string()
}
fn default_rotation() -> String {
    "never".to_string()
}

/// Full benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "default_duration_sec")]
    pub duration_sec: u64,

    /// `single_thread`, `pipeline`, `strategy`, or `exchange`
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_pipeline_stages")]
    pub pipeline_stages: u32,

    /// Target ticks per second
    #[serde(default = "default_message_rate")]
    pub message_rate: u64,

    /// `uniform` or `poisson`
    #[serde(default = "default_message_pattern")]
    pub message_pattern: String,

    /// `pass_through`, `momentum`, `market_making`, or `user`
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Core IDs for the pipeline stages, in stage order
    #[serde(default)]
    pub affinity: Vec<usize>,

    /// Busy-poll empty queues instead of yielding
    #[serde(default)]
    pub use_polling: bool,

    /// Per-order CSV result log; empty = disabled
    #[serde(default)]
    pub log_file: String,

    // Generator options
    #[serde(default)]
    pub gap_pause_ms: u64,
    #[serde(default)]
    pub gap_burst_count: u32,
    #[serde(default)]
    pub gap_interval_sec: u64,
    #[serde(default = "default_trade_signal_ratio")]
    pub trade_signal_ratio: f64,
    #[serde(default = "default_num_symbols")]
    pub num_symbols: usize,
    #[serde(default = "default_symbol_prefix")]
    pub symbol_prefix: String,
    #[serde(default)]
    pub jitter_min_ns: u64,
    #[serde(default)]
    pub jitter_max_ns: u64,
    /// Initial window excluded from statistics
    #[serde(default)]
    pub warmup_sec: u64,
    #[serde(default = "default_book_depth_levels")]
    pub book_depth_levels: usize,
    #[serde(default = "default_true")]
    pub simulate_fills: bool,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_output")]
    pub log_output: String,
    /// `hourly`, `daily`, or `never`
    #[serde(default = "default_rotation")]
    pub rotation: String,
    /// Enable high-frequency per-order tracing targets
    #[serde(default)]
    pub enable_tracing: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        // An empty document deserializes to all defaults
        serde_yaml::from_str("{}").expect("default config must parse")
    }
}

impl BenchConfig {
    /// Read, parse, and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config yaml: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the harness cannot run
    pub fn validate(&self) -> Result<()> {
        if self.duration_sec == 0 {
            bail!("duration_sec must be > 0");
        }
        if self.message_rate == 0 {
            bail!("message_rate must be > 0");
        }

        let valid_modes = ["single_thread", "pipeline", "strategy", "exchange"];
        if !valid_modes.contains(&self.mode.as_str()) {
            bail!("unknown mode '{}': expected one of {:?}", self.mode, valid_modes);
        }

        let valid_patterns = ["uniform", "poisson"];
        if !valid_patterns.contains(&self.message_pattern.as_str()) {
            bail!(
                "unknown message_pattern '{}': expected one of {:?}",
                self.message_pattern,
                valid_patterns
            );
        }

        let valid_strategies = ["pass_through", "momentum", "market_making", "user"];
        if !valid_strategies.contains(&self.strategy.as_str()) {
            bail!(
                "unknown strategy '{}': expected one of {:?}",
                self.strategy,
                valid_strategies
            );
        }

        if !(0.0..=1.0).contains(&self.trade_signal_ratio) {
            bail!(
                "trade_signal_ratio {} out of range [0, 1]",
                self.trade_signal_ratio
            );
        }
        if self.jitter_min_ns > self.jitter_max_ns {
            bail!(
                "jitter_min_ns {} exceeds jitter_max_ns {}",
                self.jitter_min_ns,
                self.jitter_max_ns
            );
        }
        if self.num_symbols == 0 {
            bail!("num_symbols must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            bail!(
                "invalid log_level '{}': expected one of {:?}",
                self.log_level,
                valid_levels
            );
        }

        let valid_rotations = ["hourly", "daily", "never"];
        if !valid_rotations.contains(&self.rotation.as_str()) {
            bail!(
                "invalid rotation '{}': expected one of {:?}",
                self.rotation,
                valid_rotations
            );
        }

        Ok(())
    }
}
