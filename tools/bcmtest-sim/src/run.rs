//! `bcmtest-sim run`: the whole lifecycle against one scenario.
//!
//! Order of play: probe and attach everything, drive each published node
//! through open/read/write/close, cycle power, then shut down and detach.
//! The run fails if any BAR reservation or device node survives teardown.

use std::sync::Arc;

use anyhow::{Result, bail};
use serde::Serialize;

use bcmtest_bus::{CdevSwitch, DeviceManager, DriverEntry, SimBus};
use bcmtest_core::{kinfo, kwarn};
use bcmtest_driver::{DRIVER_NAME, DriverConfig, LifecycleController};
use bcmtest_driver_api::chardev::CdevHandle;
use bcmtest_driver_api::diag::LogSink;
use bcmtest_driver_api::driver::DeviceMethods;
use bcmtest_driver_api::error::{DriverError, IoError};
use bcmtest_driver_api::pci::PciAddress;

use crate::cli::RunArgs;
use crate::scenario;

/// Payload written to every node.
const WRITE_PAYLOAD: &[u8] = b"bcmtest";

/// Outcome of one run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub driver: String,
    pub probed: usize,
    pub matched: usize,
    pub declined: Vec<String>,
    pub attached: Vec<AttachedDevice>,
    pub failed: Vec<Failure>,
    pub io: Vec<NodeIo>,
    pub power: Vec<Failure>,
    pub teardown: Vec<Failure>,
    pub leaked_reservations: usize,
    pub leftover_nodes: Vec<String>,
}

/// A function the driver attached to.
#[derive(Debug, Serialize)]
pub struct AttachedDevice {
    pub address: String,
    pub unit: u32,
    pub node: Option<String>,
    pub state: String,
    pub bars: usize,
}

/// A lifecycle call that returned an error.
#[derive(Debug, Serialize)]
pub struct Failure {
    pub address: String,
    pub error: String,
}

impl Failure {
    fn new(address: PciAddress, error: DriverError) -> Self {
        Self {
            address: address.to_string(),
            error: error.to_string(),
        }
    }
}

/// Result of driving one device node.
#[derive(Debug, Serialize)]
pub struct NodeIo {
    pub node: String,
    pub requested_read: usize,
    pub read: Option<usize>,
    pub requested_write: usize,
    pub written: Option<usize>,
    pub error: Option<String>,
}

impl Report {
    /// Returns `true` if teardown left nothing behind.
    pub fn is_clean(&self) -> bool {
        self.leaked_reservations == 0 && self.leftover_nodes.is_empty()
    }
}

/// Builds the manager for `config` over fresh bus and switch instances.
pub fn manager(config: DriverConfig, bus: Arc<SimBus>) -> DeviceManager {
    let config = Arc::new(config);
    let driver = DriverEntry::new(DRIVER_NAME, move |ctx| -> Box<dyn DeviceMethods> {
        Box::new(LifecycleController::new(
            Arc::clone(&config),
            ctx.info,
            ctx.unit,
            ctx.bus,
            ctx.cdevsw,
            Arc::new(LogSink),
        ))
    });
    DeviceManager::new(bus, Arc::new(CdevSwitch::new()), driver)
}

/// Entry point for `bcmtest-sim run`.
pub fn cmd_run(args: &RunArgs) -> Result<()> {
    let scenario = scenario::load(&args.scenario)?;
    let config = scenario.driver_config()?;
    let bus = Arc::new(SimBus::new());
    scenario.populate(&bus)?;

    let report = execute(config, bus, args.read_len, !args.no_power_cycle);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_clean() {
        bail!(
            "teardown left {} reservation(s) and {} node(s) behind",
            report.leaked_reservations,
            report.leftover_nodes.len()
        );
    }
    Ok(())
}

/// Plays every lifecycle phase and collects the outcome.
pub fn execute(config: DriverConfig, bus: Arc<SimBus>, read_len: usize, power_cycle: bool) -> Report {
    let driver = config.description.to_owned();
    let mut mgr = manager(config, Arc::clone(&bus));

    let probe = mgr.probe_all();
    kinfo!(
        "probe pass: {} probed, {} matched, {} attached",
        probe.probed,
        probe.matched,
        probe.attached.len()
    );
    let attached = mgr
        .bindings()
        .into_iter()
        .map(|b| AttachedDevice {
            address: b.address.to_string(),
            unit: b.unit,
            node: b.node,
            state: b.state.to_string(),
            bars: bus.outstanding_for(b.address),
        })
        .collect();
    let failed = probe
        .failed
        .into_iter()
        .map(|(addr, e)| Failure::new(addr, e))
        .collect();

    let cdevsw = Arc::clone(mgr.cdevsw());
    let io = cdevsw
        .names()
        .into_iter()
        .map(|name| exercise(&cdevsw, name, read_len))
        .collect();

    let mut power = Vec::new();
    if power_cycle {
        power.extend(mgr.suspend_all());
        power.extend(mgr.resume_all());
    }
    let mut teardown = mgr.shutdown_all();
    teardown.extend(mgr.detach_all());

    let leaked_reservations = bus.outstanding();
    if leaked_reservations != 0 {
        kwarn!("{} reservation(s) outstanding after teardown", leaked_reservations);
    }

    Report {
        driver,
        probed: probe.probed,
        matched: probe.matched,
        declined: probe.declined.iter().map(ToString::to_string).collect(),
        attached,
        failed,
        io,
        power: power.into_iter().map(|(a, e)| Failure::new(a, e)).collect(),
        teardown: teardown.into_iter().map(|(a, e)| Failure::new(a, e)).collect(),
        leaked_reservations,
        leftover_nodes: cdevsw.names(),
    }
}

fn exercise(cdevsw: &CdevSwitch, node: String, read_len: usize) -> NodeIo {
    let mut io = NodeIo {
        node,
        requested_read: read_len,
        read: None,
        requested_write: WRITE_PAYLOAD.len(),
        written: None,
        error: None,
    };
    let Some(handle) = cdevsw.lookup(&io.node) else {
        io.error = Some(IoError::NoSuchDevice.to_string());
        return io;
    };
    if let Err(e) = drive_node(cdevsw, handle, &mut io) {
        io.error = Some(e.to_string());
    }
    io
}

fn drive_node(cdevsw: &CdevSwitch, handle: CdevHandle, io: &mut NodeIo) -> Result<(), IoError> {
    cdevsw.open(handle)?;
    let mut buf = vec![0u8; io.requested_read];
    io.read = Some(cdevsw.read(handle, &mut buf)?);
    io.written = Some(cdevsw.write(handle, WRITE_PAYLOAD)?);
    cdevsw.close(handle)
}

fn print_report(report: &Report) {
    println!(
        "{}: probed {}, matched {}, attached {}, failed {}",
        report.driver,
        report.probed,
        report.matched,
        report.attached.len(),
        report.failed.len()
    );
    for dev in &report.attached {
        println!(
            "  {}  {}  {}  {} BAR(s)",
            dev.address,
            dev.node.as_deref().unwrap_or("-"),
            dev.state,
            dev.bars
        );
    }
    for f in &report.failed {
        println!("  {}  attach failed: {}", f.address, f.error);
    }
    for io in &report.io {
        match &io.error {
            None => println!(
                "  {}: read {} of {} bytes, wrote {} of {} bytes",
                io.node,
                io.read.unwrap_or(0),
                io.requested_read,
                io.written.unwrap_or(0),
                io.requested_write
            ),
            Some(e) => println!("  {}: {}", io.node, e),
        }
    }
    for f in report.power.iter().chain(&report.teardown) {
        println!("  {}  {}", f.address, f.error);
    }
    if report.is_clean() {
        println!("teardown clean");
    } else {
        println!(
            "teardown leaked {} reservation(s), nodes left: {}",
            report.leaked_reservations,
            report.leftover_nodes.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcmtest_bus::SimConfigSpace;

    /// A card whose BAR `i` sits at `base + i * 1 MiB`.
    fn bcm(bars: &[usize], base: u64) -> SimConfigSpace {
        let mut cfg = SimConfigSpace::new(0x14e4, 0x43a0).with_class(0x02, 0x80, 0, 1);
        for &i in bars {
            cfg = cfg
                .with_memory_bar(i, base + (i as u64) * 0x10_0000, 0x4000, false, false)
                .unwrap();
        }
        cfg
    }

    #[test]
    fn two_cards_and_a_stranger() {
        let bus = Arc::new(SimBus::new());
        bus.plug(PciAddress::new(0, 3, 0), bcm(&[0], 0xF000_0000)).unwrap();
        bus.plug(PciAddress::new(0, 4, 0), SimConfigSpace::new(0x8086, 0x100e)).unwrap();
        bus.plug(PciAddress::new(0, 5, 0), bcm(&[0], 0xF100_0000)).unwrap();

        let report = execute(DriverConfig::default(), Arc::clone(&bus), 64, true);
        assert_eq!(report.probed, 3);
        assert_eq!(report.matched, 2);
        assert_eq!(report.declined, vec!["00:04.0"]);
        let nodes: Vec<_> = report.attached.iter().filter_map(|d| d.node.clone()).collect();
        assert_eq!(nodes, vec!["test0", "test1"]);
        assert!(report.attached.iter().all(|d| d.bars == 1));
        assert_eq!(report.io.len(), 2);
        for io in &report.io {
            assert_eq!(io.read, Some(0));
            assert_eq!(io.written, Some(0));
            assert!(io.error.is_none());
        }
        assert!(report.power.is_empty());
        assert!(report.teardown.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn overlapping_cards_attach_once() {
        let bus = Arc::new(SimBus::new());
        bus.plug(PciAddress::new(0, 3, 0), bcm(&[0], 0xF000_0000)).unwrap();
        bus.plug(PciAddress::new(0, 5, 0), bcm(&[0], 0xF000_0000)).unwrap();

        let report = execute(DriverConfig::default(), Arc::clone(&bus), 64, true);
        assert_eq!(report.matched, 2);
        assert_eq!(report.attached.len(), 1);
        assert_eq!(report.attached[0].address, "00:03.0");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].address, "00:05.0");
        assert_eq!(report.failed[0].error, DriverError::ResourceUnavailable.to_string());
        assert_eq!(report.io.len(), 1);
        assert!(report.is_clean());
    }

    #[test]
    fn bar_failure_is_reported_and_nothing_leaks() {
        let bus = Arc::new(SimBus::new());
        let addr = PciAddress::new(0, 3, 0);
        bus.plug(addr, bcm(&[0, 1], 0xF000_0000)).unwrap();
        bus.inject_failure(addr, 1);

        let report = execute(DriverConfig { bars: vec![0, 1], ..DriverConfig::default() }, bus, 64, true);
        assert_eq!(report.matched, 1);
        assert!(report.attached.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].error, "resource unavailable");
        assert!(report.io.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn report_serializes() {
        let bus = Arc::new(SimBus::new());
        bus.plug(PciAddress::new(0, 3, 0), bcm(&[0], 0xF000_0000)).unwrap();
        let report = execute(DriverConfig::default(), bus, 16, false);
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["driver"], "bcm43a0");
        assert_eq!(json["attached"][0]["node"], "test0");
        assert_eq!(json["attached"][0]["state"], "attached");
        assert_eq!(json["io"][0]["requested_read"], 16);
        assert_eq!(json["leaked_reservations"], 0);
    }
}
