//! Logging initialization
//!
//! Structured logs via tracing: a non-blocking rolling file layer plus an
//! ANSI stdout layer. High-frequency per-order logs go to hierarchical
//! targets under "HFTPERF" (e.g. "HFTPERF::EXCH"); they are off unless
//! `enable_tracing` is set, so the hot path stays quiet by default.

use crate::config::BenchConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Per-order log target prefix (toggled by `enable_tracing`)
pub const HF_TARGET: &str = "HFTPERF";

pub fn init_logging(config: &BenchConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_output),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_output),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_output),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter_str = if config.enable_tracing {
        config.log_level.clone()
    } else {
        format!("{},{}=off", config.log_level, HF_TARGET)
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    let file_layer = fmt::layer()
        .with_target(false)
        .with_writer(non_blocking)
        .with_ansi(false);
    let stdout_layer = fmt::layer().with_target(false).with_ansi(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}
