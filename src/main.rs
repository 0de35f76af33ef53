//! hftperf - tick-to-trade benchmark driver
//!
//! Two invocations:
//!   hftperf --selftest        run the built-in suite, exit 0/1
//!   hftperf --config <path>   run a benchmark described by a YAML file
//!
//! Exit codes: 0 success, 1 configuration error or self-test failure,
//! 2 runtime failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use hftperf::config::BenchConfig;
use hftperf::logging::init_logging;
use hftperf::pipeline;
use hftperf::selftest;

#[derive(Parser, Debug)]
#[command(
    name = "hftperf",
    version,
    about = "Low-latency matching engine and tick-to-trade benchmark harness"
)]
struct Cli {
    /// Run the built-in self-test suite and exit
    #[arg(long)]
    selftest: bool,

    /// Benchmark configuration file (YAML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Accept the historical single-dash spellings (-selftest, -config)
fn normalize_args() -> Vec<String> {
    std::env::args()
        .map(|arg| match arg.as_str() {
            "-selftest" => "--selftest".to_string(),
            "-config" => "--config".to_string(),
            _ => arg,
        })
        .collect()
}

fn main() -> ExitCode {
    println!(
        "hftperf {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let cli = Cli::parse_from(normalize_args());

    if cli.selftest {
        return if selftest::run_selftest() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        };
    }

    let Some(config_path) = cli.config else {
        eprintln!("Usage: hftperf --config <config.yaml>");
        eprintln!("       hftperf --selftest");
        return ExitCode::from(1);
    };

    let config = match BenchConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {:#}", err);
            return ExitCode::from(1);
        }
    };

    let _log_guard = init_logging(&config);

    match pipeline::run(&config) {
        Ok(report) => {
            println!("\n{}", report.render());
            println!("{}", report.summary_line());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("benchmark failed: {:#}", err);
            ExitCode::from(2)
        }
    }
}
