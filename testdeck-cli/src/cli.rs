//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's
//! derive macros. It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Testdeck -- live test dashboard tooling.
///
/// Use `testdeck <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "testdeck", version, about, long_about = None)]
pub struct Cli {
    /// Path to the testdeck.toml configuration file.
    #[arg(short, long, default_value = "testdeck.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration file.
    Check(CheckArgs),

    /// Classify a test identifier into its (group, case) pair.
    Classify(ClassifyArgs),

    /// Connect to the hub as an observer and render the live test tree.
    Watch(WatchArgs),

    /// Ask the hub to run a test command and stream its output.
    Run(RunArgs),
}

// ---- check ----

/// Validate the configuration file and print the effective settings.
#[derive(Args, Debug)]
pub struct CheckArgs {}

// ---- classify ----

/// Run the classification heuristic on a single identifier.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Test identifier (e.g. "LoginTest#test_redirect" or "test_user_can_login").
    pub identifier: String,
}

// ---- watch ----

/// Observe the hub and render the aggregated tree per event.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Hub address (defaults to hub.bind_addr from the configuration).
    #[arg(long)]
    pub addr: Option<String>,
}

// ---- run ----

/// Send a run_tests command to the hub.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Hub address (defaults to hub.bind_addr from the configuration).
    #[arg(long)]
    pub addr: Option<String>,

    /// Command argv (defaults to runner.default_args on the hub side).
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}
