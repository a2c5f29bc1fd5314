//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "belay", version, about = "Belay secondary extruder sync")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/belay.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the config and list the configured belays
    Check,
    /// Run a simulated print with the configured belays
    Simulate {
        /// Override simulation.duration_s
        #[arg(long, value_name = "SECONDS")]
        duration: Option<f64>,
        /// Only print scripted command replies and the summary
        #[arg(long, action = ArgAction::SetTrue)]
        quiet: bool,
    },
    /// Build every belay against simulated actuators and report its status
    SelfCheck,
    /// Log slider switch edges read from GPIO (needs the `hardware` feature)
    Watch {
        /// Belay whose switches to watch (default: the first one)
        #[arg(long)]
        belay: Option<String>,
        /// How long to watch
        #[arg(long, value_name = "SECONDS", default_value_t = 10.0)]
        seconds: f64,
        /// Polling rate of each switch
        #[arg(long, value_name = "HZ", default_value_t = 500)]
        hz: u32,
        /// Treat a high pin as triggered (default: switches pull to ground)
        #[arg(long, action = ArgAction::SetTrue)]
        active_high: bool,
    },
}
