//! Device manager.
//!
//! Plays the host framework: walks the bus, creates one binding per
//! function through the registered driver's factory, probes it, attaches on
//! a match, and later drives power transitions and teardown. Unit numbers are
//! per driver and reused lowest-first once freed.
//!
//! Attached bindings are kept in attach order. Shutdown, suspend and detach
//! walk them in reverse; resume walks them forward.

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bcmtest_core::{kerr, kinfo, ktrace, kwarn};
use bcmtest_driver_api::bus::BusResources;
use bcmtest_driver_api::chardev::CdevRegistry;
use bcmtest_driver_api::driver::{DeviceMethods, LifecycleState};
use bcmtest_driver_api::error::DriverError;
use bcmtest_driver_api::pci::{PciAddress, PciDeviceInfo};

use crate::cdevsw::CdevSwitch;
use crate::sim::SimBus;

/// Everything a driver needs to build one binding.
pub struct BindContext {
    /// The function being bound.
    pub info: PciDeviceInfo,
    /// Unit number assigned to this binding.
    pub unit: u32,
    /// Resource allocator for the function's BARs.
    pub bus: Arc<dyn BusResources>,
    /// Table to publish device nodes in.
    pub cdevsw: Arc<dyn CdevRegistry>,
}

/// Factory creating one binding for a candidate function.
pub type BindFn = dyn Fn(BindContext) -> Box<dyn DeviceMethods> + Send + Sync;

/// A registered driver.
pub struct DriverEntry {
    /// Driver name, used for logging.
    pub name: &'static str,
    /// Creates a fresh binding for a candidate.
    pub bind: Box<BindFn>,
}

impl DriverEntry {
    /// Creates a driver entry.
    pub fn new(
        name: &'static str,
        bind: impl Fn(BindContext) -> Box<dyn DeviceMethods> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            bind: Box::new(bind),
        }
    }
}

struct Binding {
    address: PciAddress,
    unit: u32,
    methods: Box<dyn DeviceMethods>,
}

/// Snapshot of one attached binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSummary {
    /// Function address.
    pub address: PciAddress,
    /// Assigned unit.
    pub unit: u32,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Published node name, if any.
    pub node: Option<String>,
}

/// Outcome of one [`DeviceManager::probe_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Functions offered to the driver.
    pub probed: usize,
    /// Functions the driver claimed in probe.
    pub matched: usize,
    /// Functions the driver declined in probe.
    pub declined: Vec<PciAddress>,
    /// Functions successfully attached.
    pub attached: Vec<PciAddress>,
    /// Functions whose attach failed, with the reason.
    pub failed: Vec<(PciAddress, DriverError)>,
}

/// Drives the lifecycle of every binding of one driver on one bus.
pub struct DeviceManager {
    bus: Arc<SimBus>,
    cdevsw: Arc<CdevSwitch>,
    driver: DriverEntry,
    units: BTreeSet<u32>,
    bindings: Vec<Binding>,
}

impl DeviceManager {
    /// Creates a manager for `driver` over `bus` and `cdevsw`.
    pub fn new(bus: Arc<SimBus>, cdevsw: Arc<CdevSwitch>, driver: DriverEntry) -> Self {
        Self {
            bus,
            cdevsw,
            driver,
            units: BTreeSet::new(),
            bindings: Vec::new(),
        }
    }

    /// The bus this manager enumerates.
    #[must_use]
    pub fn bus(&self) -> &Arc<SimBus> {
        &self.bus
    }

    /// The device-node table bindings publish into.
    #[must_use]
    pub fn cdevsw(&self) -> &Arc<CdevSwitch> {
        &self.cdevsw
    }

    fn alloc_unit(&mut self) -> u32 {
        let unit = (0..).find(|u| !self.units.contains(u)).unwrap_or(u32::MAX);
        self.units.insert(unit);
        unit
    }

    fn is_bound(&self, address: PciAddress) -> bool {
        self.bindings.iter().any(|b| b.address == address)
    }

    /// Offers every unbound function on the bus to the driver.
    pub fn probe_all(&mut self) -> ProbeReport {
        let mut report = ProbeReport::default();
        for info in self.bus.devices() {
            if self.is_bound(info.address) {
                continue;
            }
            report.probed += 1;

            let unit = self.alloc_unit();
            let bus: Arc<dyn BusResources> = self.bus.clone();
            let cdevsw: Arc<dyn CdevRegistry> = self.cdevsw.clone();
            let mut methods = (self.driver.bind)(BindContext {
                info,
                unit,
                bus,
                cdevsw,
            });

            if let Err(e) = methods.probe().into_result() {
                ktrace!("{}: pci {}: {}", self.driver.name, info.address, e);
                self.units.remove(&unit);
                report.declined.push(info.address);
                continue;
            }
            report.matched += 1;

            match methods.attach() {
                Ok(()) => {
                    kinfo!(
                        "{}{}: attached at pci {}",
                        self.driver.name,
                        unit,
                        info.address
                    );
                    self.bindings.push(Binding {
                        address: info.address,
                        unit,
                        methods,
                    });
                    report.attached.push(info.address);
                }
                Err(e) => {
                    kwarn!(
                        "{}: attach failed at pci {}: {}",
                        self.driver.name,
                        info.address,
                        e
                    );
                    self.units.remove(&unit);
                    report.failed.push((info.address, e));
                }
            }
        }
        report
    }

    /// Detaches the binding at `address`.
    ///
    /// # Errors
    ///
    /// [`DriverError::DetachInconsistency`] if nothing is bound there, or
    /// whatever the driver's detach reports (the binding is kept in that case).
    pub fn detach(&mut self, address: PciAddress) -> Result<(), DriverError> {
        let idx = self
            .bindings
            .iter()
            .position(|b| b.address == address)
            .ok_or(DriverError::DetachInconsistency)?;
        self.bindings[idx].methods.detach()?;
        let binding = self.bindings.remove(idx);
        self.units.remove(&binding.unit);
        kinfo!("{}{}: detached", self.driver.name, binding.unit);
        Ok(())
    }

    /// Detaches every binding, most recently attached first.
    ///
    /// Returns the bindings whose detach failed.
    pub fn detach_all(&mut self) -> Vec<(PciAddress, DriverError)> {
        let mut failed = Vec::new();
        let addresses: Vec<PciAddress> = self.bindings.iter().rev().map(|b| b.address).collect();
        for address in addresses {
            if let Err(e) = self.detach(address) {
                kerr!("{}: detach of pci {} failed: {}", self.driver.name, address, e);
                failed.push((address, e));
            }
        }
        failed
    }

    /// Runs `op` over the bindings, in reverse if `reverse` is set.
    fn for_each_binding(
        &mut self,
        what: &str,
        reverse: bool,
        op: impl Fn(&mut dyn DeviceMethods) -> Result<(), DriverError>,
    ) -> Vec<(PciAddress, DriverError)> {
        let name = self.driver.name;
        let mut failed = Vec::new();
        let mut visit = |b: &mut Binding| {
            kinfo!("{}{}: {}", name, b.unit, what);
            if let Err(e) = op(b.methods.as_mut()) {
                kwarn!("{}{}: {} failed: {}", name, b.unit, what, e);
                failed.push((b.address, e));
            }
        };
        if reverse {
            self.bindings.iter_mut().rev().for_each(&mut visit);
        } else {
            self.bindings.iter_mut().for_each(&mut visit);
        }
        failed
    }

    /// Delivers a shutdown notification to every binding, in reverse order.
    pub fn shutdown_all(&mut self) -> Vec<(PciAddress, DriverError)> {
        self.for_each_binding("shutdown", true, |m| m.shutdown())
    }

    /// Suspends every binding, in reverse order.
    pub fn suspend_all(&mut self) -> Vec<(PciAddress, DriverError)> {
        self.for_each_binding("suspend", true, |m| m.suspend())
    }

    /// Resumes every binding, in attach order.
    pub fn resume_all(&mut self) -> Vec<(PciAddress, DriverError)> {
        self.for_each_binding("resume", false, |m| m.resume())
    }

    /// Summaries of the attached bindings, in attach order.
    #[must_use]
    pub fn bindings(&self) -> Vec<BindingSummary> {
        self.bindings
            .iter()
            .map(|b| BindingSummary {
                address: b.address,
                unit: b.unit,
                state: b.methods.state(),
                node: b.methods.node_name().map(String::from),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfigSpace;
    use bcmtest_driver_api::driver::{PowerState, ProbeResult};
    use bcmtest_driver_api::resource::{ResourceFlags, ResourceHandle};
    use std::sync::Mutex;

    /// Minimal driver: claims BAR0 of every 0x14e4 function.
    struct StubBinding {
        ctx: BindContext,
        state: LifecycleState,
        node: String,
        bar: Option<ResourceHandle>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl DeviceMethods for StubBinding {
        fn probe(&mut self) -> ProbeResult {
            if self.ctx.info.vendor_id == 0x14e4 {
                self.state = LifecycleState::Probed;
                ProbeResult::Match("stub")
            } else {
                ProbeResult::NoMatch
            }
        }

        fn attach(&mut self) -> Result<(), DriverError> {
            let bar = self
                .ctx
                .bus
                .reserve_memory_bar(self.ctx.info.address, 0, ResourceFlags::ACTIVE)?;
            self.bar = Some(bar);
            self.state = LifecycleState::Attached(PowerState::Running);
            Ok(())
        }

        fn detach(&mut self) -> Result<(), DriverError> {
            let bar = self.bar.take().ok_or(DriverError::DetachInconsistency)?;
            self.ctx.bus.release(bar)?;
            self.state = LifecycleState::Detached;
            self.log.lock().unwrap().push(format!("detach {}", self.node));
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), DriverError> {
            self.log.lock().unwrap().push(format!("shutdown {}", self.node));
            Ok(())
        }

        fn suspend(&mut self) -> Result<(), DriverError> {
            self.log.lock().unwrap().push(format!("suspend {}", self.node));
            self.state = LifecycleState::Attached(PowerState::Suspended);
            Ok(())
        }

        fn resume(&mut self) -> Result<(), DriverError> {
            self.log.lock().unwrap().push(format!("resume {}", self.node));
            self.state = LifecycleState::Attached(PowerState::Running);
            Ok(())
        }

        fn state(&self) -> LifecycleState {
            self.state
        }

        fn node_name(&self) -> Option<&str> {
            self.bar.as_ref().map(|_| self.node.as_str())
        }
    }

    fn plug(bus: &SimBus, slot: u8, vendor: u16, base: u64) {
        let cfg = SimConfigSpace::new(vendor, 0x43a0)
            .with_memory_bar(0, base, 4096, false, false)
            .unwrap();
        bus.plug(PciAddress::new(0, slot, 0), cfg).unwrap();
    }

    fn manager(log: &Arc<Mutex<Vec<String>>>) -> DeviceManager {
        let log = log.clone();
        DeviceManager::new(
            Arc::new(SimBus::new()),
            Arc::new(CdevSwitch::new()),
            DriverEntry::new("stub", move |ctx| {
                Box::new(StubBinding {
                    node: format!("stub{}", ctx.unit),
                    ctx,
                    state: LifecycleState::Unbound,
                    bar: None,
                    log: log.clone(),
                })
            }),
        )
    }

    #[test]
    fn probe_all_attaches_matching_functions_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager(&log);
        plug(mgr.bus(), 1, 0x14e4, 0xF000_0000);
        plug(mgr.bus(), 2, 0x8086, 0xF001_0000);
        plug(mgr.bus(), 3, 0x14e4, 0xF002_0000);

        let report = mgr.probe_all();
        assert_eq!(report.probed, 3);
        assert_eq!(report.matched, 2);
        assert_eq!(report.declined, vec![PciAddress::new(0, 2, 0)]);
        assert_eq!(
            report.attached,
            vec![PciAddress::new(0, 1, 0), PciAddress::new(0, 3, 0)]
        );
        let units: Vec<u32> = mgr.bindings().iter().map(|b| b.unit).collect();
        assert_eq!(units, vec![0, 1]);
        assert_eq!(mgr.bus().outstanding(), 2);

        // A second pass does not rebind.
        assert_eq!(mgr.probe_all().probed, 1);
    }

    #[test]
    fn failed_attach_frees_its_unit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager(&log);
        plug(mgr.bus(), 1, 0x14e4, 0xF000_0000);
        plug(mgr.bus(), 2, 0x14e4, 0xF001_0000);
        mgr.bus().inject_failure(PciAddress::new(0, 1, 0), 0);

        let report = mgr.probe_all();
        assert_eq!(
            report.failed,
            vec![(PciAddress::new(0, 1, 0), DriverError::ResourceUnavailable)]
        );
        assert_eq!(mgr.bindings()[0].unit, 0);
        assert_eq!(mgr.bindings()[0].node.as_deref(), Some("stub0"));
    }

    #[test]
    fn teardown_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager(&log);
        plug(mgr.bus(), 1, 0x14e4, 0xF000_0000);
        plug(mgr.bus(), 2, 0x14e4, 0xF001_0000);
        mgr.probe_all();

        assert!(mgr.suspend_all().is_empty());
        assert!(mgr.resume_all().is_empty());
        assert!(mgr.shutdown_all().is_empty());
        assert!(mgr.detach_all().is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "suspend stub1",
                "suspend stub0",
                "resume stub0",
                "resume stub1",
                "shutdown stub1",
                "shutdown stub0",
                "detach stub1",
                "detach stub0",
            ]
        );
        assert_eq!(mgr.bus().outstanding(), 0);
        assert!(mgr.bindings().is_empty());
    }

    #[test]
    fn detach_unknown_address_is_inconsistent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager(&log);
        assert_eq!(
            mgr.detach(PciAddress::new(0, 1, 0)),
            Err(DriverError::DetachInconsistency)
        );
    }

    #[test]
    fn detached_unit_is_reused() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mgr = manager(&log);
        plug(mgr.bus(), 1, 0x14e4, 0xF000_0000);
        mgr.probe_all();
        mgr.detach(PciAddress::new(0, 1, 0)).unwrap();
        mgr.probe_all();
        assert_eq!(mgr.bindings()[0].unit, 0);
    }
}
