//! Per-device instance state.

use alloc::string::String;

use bcmtest_core::sync::SpinLock;
use bcmtest_driver_api::error::ResourceError;
use bcmtest_driver_api::pci::{MAX_BARS, PciDeviceInfo};
use bcmtest_driver_api::resource::ResourceHandle;

use crate::bars::BarSet;

/// One attached BCM43A0.
///
/// Exists from the end of a successful attach until detach drops it. The
/// device node only holds a weak reference.
#[derive(Debug)]
pub struct Softc {
    info: PciDeviceInfo,
    unit: u32,
    node: String,
    bars: SpinLock<BarSet>,
}

impl Softc {
    /// Creates an instance owning `bars`.
    #[must_use]
    pub fn new(info: PciDeviceInfo, unit: u32, node: String, bars: BarSet) -> Self {
        Self {
            info,
            unit,
            node,
            bars: SpinLock::named("softc_bars", bars),
        }
    }

    /// Vendor id of the bound device.
    #[must_use]
    pub fn vendor_id(&self) -> u16 {
        self.info.vendor_id
    }

    /// Device id of the bound device.
    #[must_use]
    pub fn device_id(&self) -> u16 {
        self.info.device_id
    }

    /// Identity and BAR layout of the bound device.
    #[must_use]
    pub fn info(&self) -> &PciDeviceInfo {
        &self.info
    }

    /// Unit number.
    #[must_use]
    pub fn unit(&self) -> u32 {
        self.unit
    }

    /// Device node name.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Number of claimed BARs.
    #[must_use]
    pub fn bar_count(&self) -> usize {
        self.bars.lock().len()
    }

    /// Moves the claimed BARs out, leaving the instance with none.
    pub fn take_bars(&self) -> BarSet {
        core::mem::take(&mut *self.bars.lock())
    }

    fn with_bar<R>(
        &self,
        bar: u8,
        f: impl FnOnce(&ResourceHandle) -> Result<R, ResourceError>,
    ) -> Result<R, ResourceError> {
        if usize::from(bar) >= MAX_BARS {
            return Err(ResourceError::InvalidBar);
        }
        let bars = self.bars.lock();
        let handle = bars.get(bar).ok_or(ResourceError::Unavailable)?;
        f(handle)
    }

    /// Reads the 16-bit register at `offset` in BAR `bar`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidBar`] for an index above 5,
    /// [`ResourceError::Unavailable`] if the BAR is not claimed, and the
    /// bounds and alignment errors of [`ResourceHandle::read_u16`].
    pub fn dev_read(&self, bar: u8, offset: u64) -> Result<u16, ResourceError> {
        self.with_bar(bar, |h| h.read_u16(offset))
    }

    /// Writes the 16-bit register at `offset` in BAR `bar`.
    ///
    /// # Errors
    ///
    /// Same as [`dev_read`](Self::dev_read).
    pub fn dev_write(&self, bar: u8, offset: u64, value: u16) -> Result<(), ResourceError> {
        self.with_bar(bar, |h| h.write_u16(offset, value))
    }
}
