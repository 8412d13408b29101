//! CLI argument definitions for testdeck-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Testdeck live test dashboard daemon.
///
/// Hosts the broadcast hub observers connect to, routes inbound
/// `run_tests` commands to the external test runner, and manages
/// service lifecycles.
#[derive(Parser, Debug)]
#[command(name = "testdeck-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to testdeck.toml configuration file.
    #[arg(short, long, default_value = "/etc/testdeck/testdeck.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override hub bind address (takes precedence over config file).
    #[arg(long)]
    pub bind: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
