//! Lifecycle controller for one device binding.
//!
//! Attach builds the instance in three steps (claim BARs, create the
//! [`Softc`], publish the node) and undoes whatever was done if a later step
//! fails. Detach runs the reverse: withdraw the node first so no new I/O can
//! reach the instance, then release the BARs newest first, then drop the
//! instance.

use alloc::sync::Arc;

use bcmtest_core::{kerr, kwarn};
use bcmtest_driver_api::bus::BusResources;
use bcmtest_driver_api::chardev::{CdevHandle, CdevRegistry, CharDevice};
use bcmtest_driver_api::diag::{DiagEvent, DiagSink};
use bcmtest_driver_api::driver::{DeviceMethods, LifecycleState, PowerState, ProbeResult};
use bcmtest_driver_api::error::{DriverError, IoError, ResourceError};
use bcmtest_driver_api::pci::PciDeviceInfo;

use crate::bars::BarSet;
use crate::cdev::TestCdev;
use crate::config::DriverConfig;
use crate::softc::Softc;

/// A live device instance and its published node.
struct Instance {
    softc: Arc<Softc>,
    cdev: CdevHandle,
}

/// Drives probe, attach, detach and the power hooks for one function.
pub struct LifecycleController {
    config: Arc<DriverConfig>,
    info: PciDeviceInfo,
    unit: u32,
    bus: Arc<dyn BusResources>,
    cdevsw: Arc<dyn CdevRegistry>,
    sink: Arc<dyn DiagSink>,
    state: LifecycleState,
    instance: Option<Instance>,
}

impl LifecycleController {
    /// Creates an unbound controller for the function described by `info`.
    #[must_use]
    pub fn new(
        config: Arc<DriverConfig>,
        info: PciDeviceInfo,
        unit: u32,
        bus: Arc<dyn BusResources>,
        cdevsw: Arc<dyn CdevRegistry>,
        sink: Arc<dyn DiagSink>,
    ) -> Self {
        Self {
            config,
            info,
            unit,
            bus,
            cdevsw,
            sink,
            state: LifecycleState::Unbound,
            instance: None,
        }
    }

    /// The bound function.
    #[must_use]
    pub fn info(&self) -> &PciDeviceInfo {
        &self.info
    }

    /// The unit number assigned by the framework.
    #[must_use]
    pub fn unit(&self) -> u32 {
        self.unit
    }

    /// The live instance, while attached.
    #[must_use]
    pub fn softc(&self) -> Option<&Arc<Softc>> {
        self.instance.as_ref().map(|i| &i.softc)
    }

    /// Handle of the published node, while attached.
    #[must_use]
    pub fn cdev_handle(&self) -> Option<CdevHandle> {
        self.instance.as_ref().map(|i| i.cdev)
    }

    /// Reads a 16-bit device register through a claimed BAR.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Unavailable`] unless attached; otherwise as
    /// [`Softc::dev_read`].
    pub fn read_register(&self, bar: u8, offset: u64) -> Result<u16, ResourceError> {
        self.softc()
            .ok_or(ResourceError::Unavailable)?
            .dev_read(bar, offset)
    }

    /// Writes a 16-bit device register through a claimed BAR.
    ///
    /// # Errors
    ///
    /// Same as [`read_register`](Self::read_register).
    pub fn write_register(&self, bar: u8, offset: u64, value: u16) -> Result<(), ResourceError> {
        self.softc()
            .ok_or(ResourceError::Unavailable)?
            .dev_write(bar, offset, value)
    }

    fn release_bars(&self, bars: BarSet) {
        if let Err(e) = bars.release_all(self.bus.as_ref(), self.sink.as_ref()) {
            kerr!("{}: BAR release failed: {}", self.config.node_name(self.unit), e);
        }
    }

    fn require_attached(&self) -> Result<PowerState, DriverError> {
        match self.state {
            LifecycleState::Attached(power) => Ok(power),
            _ => Err(DriverError::InvalidState),
        }
    }
}

impl DeviceMethods for LifecycleController {
    fn probe(&mut self) -> ProbeResult {
        let result = crate::probe::probe(&self.config, &self.info, self.sink.as_ref());
        if result.is_match() && self.state == LifecycleState::Unbound {
            self.state = LifecycleState::Probed;
        }
        result
    }

    fn attach(&mut self) -> Result<(), DriverError> {
        if self.state != LifecycleState::Probed {
            return Err(DriverError::InvalidState);
        }
        self.sink.emit(DiagEvent::Attaching {
            devid: self.info.devid(),
        });

        let bars = BarSet::acquire(
            self.bus.as_ref(),
            self.info.address,
            &self.config.bars,
            self.config.flags,
            self.sink.as_ref(),
        )?;

        let node = self.config.node_name(self.unit);
        let softc = Arc::new(Softc::new(self.info, self.unit, node, bars));
        let cdev: Arc<dyn CharDevice> =
            Arc::new(TestCdev::new(&softc, self.config.node_mode, self.sink.clone()));

        let handle = match self.cdevsw.make_dev(cdev) {
            Ok(handle) => handle,
            Err(e) => {
                kwarn!("{}: cannot create device node: {}", softc.node(), e);
                self.release_bars(softc.take_bars());
                return Err(match e {
                    IoError::NameInUse => DriverError::NodeNameInUse,
                    IoError::NoSuchDevice => DriverError::InvalidState,
                });
            }
        };

        self.sink.emit(DiagEvent::Attached {
            node: softc.node().into(),
        });
        self.instance = Some(Instance {
            softc,
            cdev: handle,
        });
        self.state = LifecycleState::Attached(PowerState::Running);
        Ok(())
    }

    fn detach(&mut self) -> Result<(), DriverError> {
        let Some(Instance { softc, cdev }) = self.instance.take() else {
            return Err(DriverError::DetachInconsistency);
        };

        // Withdraw the node before touching resources.
        if let Err(e) = self.cdevsw.destroy_dev(cdev) {
            kerr!("{}: device node {} already gone: {}", softc.node(), cdev, e);
        }
        self.release_bars(softc.take_bars());

        let node = softc.node().into();
        drop(softc);
        self.state = LifecycleState::Detached;
        self.sink.emit(DiagEvent::Detached { node });
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.require_attached()?;
        self.sink.emit(DiagEvent::Shutdown);
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), DriverError> {
        self.require_attached()?;
        self.state = LifecycleState::Attached(PowerState::Suspended);
        self.sink.emit(DiagEvent::Suspended);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), DriverError> {
        self.require_attached()?;
        self.state = LifecycleState::Attached(PowerState::Running);
        self.sink.emit(DiagEvent::Resumed);
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.state
    }

    fn node_name(&self) -> Option<&str> {
        self.softc().map(|sc| sc.node())
    }
}
