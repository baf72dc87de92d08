//! Command-line interface definitions for bcmtest-sim.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Simulated PCI host for the BCM43A0 test driver.
#[derive(Parser)]
#[command(name = "bcmtest-sim", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Only print warnings and errors from the driver.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Raise driver log verbosity (`-v` debug, `-vv` trace).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Load a scenario and run the full driver lifecycle against it.
    Run(RunArgs),
    /// Ask the driver whether it would claim a vendor/device pair.
    Probe(ProbeArgs),
    /// Parse and validate a scenario without running it.
    Check(CheckArgs),
}

/// Arguments for `bcmtest-sim run`.
#[derive(Args)]
pub struct RunArgs {
    /// Scenario file (TOML).
    pub scenario: PathBuf,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Number of bytes each node is asked to read.
    #[arg(long, default_value_t = 64)]
    pub read_len: usize,

    /// Skip the suspend/resume cycle.
    #[arg(long)]
    pub no_power_cycle: bool,
}

/// Arguments for `bcmtest-sim probe`.
#[derive(Args)]
pub struct ProbeArgs {
    /// Vendor id, decimal or `0x` hex.
    #[arg(long, value_parser = parse_id)]
    pub vendor: u16,

    /// Device id, decimal or `0x` hex.
    #[arg(long, value_parser = parse_id)]
    pub device: u16,
}

/// Arguments for `bcmtest-sim check`.
#[derive(Args)]
pub struct CheckArgs {
    /// Scenario file (TOML).
    pub scenario: PathBuf,
}

fn parse_id(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid id `{s}`: {e}"))
}
