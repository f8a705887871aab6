//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "tuner", version, about = "SRF cavity tuner landing CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/tuner_config.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Which cavities a landing command acts on.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Cryomodule name (e.g. 02, H1); repeat for several
    #[arg(long = "cm", value_name = "CM", required = true)]
    pub cms: Vec<String>,
    /// Single cavity number (1..=8); all eight when omitted
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=8))]
    pub cavity: Option<u8>,
    /// Credit steps already travelled instead of resetting the signed count
    #[arg(long = "count-current", action = ArgAction::SetTrue)]
    pub count_current: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Move tuners to the cold landing position
    Cold(Target),
    /// Detune cavities to the park position
    Park(Target),
    /// Print the recorded calibration of every cavity
    Report {
        /// Restrict to these cryomodules (default: whole machine)
        #[arg(long = "cm", value_name = "CM")]
        cms: Vec<String>,
        /// Also write the report as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Record cold-landing detunes averaged from an archive export
    Import {
        /// Archive CSV (channel,timestamp_s,value)
        #[arg(long, value_name = "FILE")]
        archive: PathBuf,
        /// Window start, unix seconds
        #[arg(long, value_name = "SECS")]
        start: f64,
        /// Window end, unix seconds
        #[arg(long, value_name = "SECS")]
        end: f64,
        /// Restrict to these cryomodules (default: whole machine)
        #[arg(long = "cm", value_name = "CM")]
        cms: Vec<String>,
    },
    /// Copy legacy park step counts into the cold-landing step counts
    MigrateParkSteps {
        /// Restrict to these cryomodules (default: whole machine)
        #[arg(long = "cm", value_name = "CM")]
        cms: Vec<String>,
    },
    /// Quick health check (config valid, every cavity reachable)
    SelfCheck,
}
