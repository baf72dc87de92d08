//! Host harness for the BCM43A0 test driver.
//!
//! Stands in for the kernel's PCI framework: plugs the functions a scenario
//! describes into a simulated bus, registers the driver, and drives probe,
//! attach, node I/O, power transitions and detach while the driver logs to
//! stderr.

mod cli;
mod logger;
mod run;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;

use bcmtest_bus::{SimBus, SimConfigSpace};
use bcmtest_driver::DriverConfig;
use bcmtest_driver_api::diag::LogSink;
use bcmtest_driver_api::driver::ProbeResult;
use bcmtest_driver_api::pci::PciAddress;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logger::init(cli.quiet, cli.verbose);

    match cli.command {
        cli::Command::Run(ref args) => run::cmd_run(args),
        cli::Command::Probe(ref args) => cmd_probe(args),
        cli::Command::Check(ref args) => cmd_check(args),
    }
}

/// Offers a bare function with the given ids to the driver's probe.
fn cmd_probe(args: &cli::ProbeArgs) -> Result<()> {
    let bus = SimBus::new();
    let info = bus
        .plug(PciAddress::new(0, 0, 0), SimConfigSpace::new(args.vendor, args.device))
        .context("cannot plug probe candidate")?;
    match bcmtest_driver::probe(&DriverConfig::default(), &info, &LogSink) {
        ProbeResult::Match(desc) => println!("match: {desc}"),
        ProbeResult::NoMatch => println!("no match"),
    }
    Ok(())
}

/// Parses a scenario and builds everything short of probing.
fn cmd_check(args: &cli::CheckArgs) -> Result<()> {
    let scenario = scenario::load(&args.scenario)?;
    let config = scenario.driver_config()?;
    let bus = SimBus::new();
    scenario.populate(&bus)?;
    println!(
        "{}: {} device(s), {} candidate(s), claiming BARs {:?}",
        args.scenario.display(),
        bus.devices().len(),
        bus.devices()
            .iter()
            .filter(|d| config.id().matches(d))
            .count(),
        config.bars
    );
    Ok(())
}
