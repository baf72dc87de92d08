//! Simulated PCI bus and memory-resource allocator.
//!
//! [`SimBus`] owns a set of plugged-in functions, each with its own
//! [`SimConfigSpace`] and device memory, and implements [`BusResources`] on
//! top of them. Every reservation is recorded in one table guarded by a
//! [`SpinLock`]; a range can be held by at most one reservation unless both
//! sides ask for [`ResourceFlags::SHAREABLE`].

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use bcmtest_core::sync::SpinLock;
use bcmtest_core::{PhysAddr, VirtAddr, kdebug, kinfo};
use bcmtest_driver_api::bus::BusResources;
use bcmtest_driver_api::error::ResourceError;
use bcmtest_driver_api::pci::{MAX_BARS, PciAddress, PciBar, PciDeviceInfo};
use bcmtest_driver_api::resource::{
    MmioRegion, MmioWindow, ResourceFlags, ResourceHandle, ResourceId,
};

use crate::config::{ConfigSpace, SimConfigSpace, regs};
use crate::enumerate::{self, NO_DEVICE};

/// Base of the simulated direct map: physical `p` is mapped at `HHDM_BASE + p`.
pub const HHDM_BASE: u64 = 0xFFFF_8000_0000_0000;

/// Error returned when plugging a function into the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugError {
    /// Another function already sits at this address.
    AddressInUse(PciAddress),
    /// The configuration space reports vendor `0xFFFF`.
    NoDevice(PciAddress),
}

impl fmt::Display for PlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressInUse(addr) => write!(f, "{addr}: address already in use"),
            Self::NoDevice(addr) => write!(f, "{addr}: function does not respond"),
        }
    }
}

impl core::error::Error for PlugError {}

/// Device memory behind one BAR.
///
/// Sparse: halfwords never written read as zero. Contents outlive any single
/// reservation, as RAM on a real card would.
struct SimWindow {
    virt: VirtAddr,
    cells: SpinLock<BTreeMap<u64, u16>>,
}

impl SimWindow {
    fn new(phys: PhysAddr) -> Self {
        Self {
            virt: VirtAddr::new(HHDM_BASE + phys.as_u64()),
            cells: SpinLock::named("sim_window", BTreeMap::new()),
        }
    }
}

impl MmioWindow for SimWindow {
    fn virt_base(&self) -> VirtAddr {
        self.virt
    }

    fn read_u16(&self, offset: u64) -> u16 {
        self.cells.lock().get(&offset).copied().unwrap_or(0)
    }

    fn write_u16(&self, offset: u64, value: u16) {
        self.cells.lock().insert(offset, value);
    }
}

/// One plugged-in function.
struct SimDevice {
    config: SimConfigSpace,
    /// Device memory per BAR index, created on first reservation.
    memory: BTreeMap<u8, Arc<SimWindow>>,
}

/// One live reservation.
#[derive(Debug, Clone, Copy)]
struct Reservation {
    owner: PciAddress,
    bar: u8,
    base: PhysAddr,
    size: u64,
    flags: ResourceFlags,
}

impl Reservation {
    fn conflicts(&self, base: PhysAddr, size: u64, flags: ResourceFlags) -> bool {
        let shared = self.flags.contains(ResourceFlags::SHAREABLE)
            && flags.contains(ResourceFlags::SHAREABLE);
        !shared && self.base.range_overlaps(self.size, base, size)
    }
}

struct BusState {
    devices: BTreeMap<PciAddress, SimDevice>,
    reservations: BTreeMap<ResourceId, Reservation>,
    faults: BTreeSet<(PciAddress, u8)>,
    next_id: u32,
}

/// A simulated PCI bus.
pub struct SimBus {
    state: SpinLock<BusState>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SpinLock::named(
                "sim_bus",
                BusState {
                    devices: BTreeMap::new(),
                    reservations: BTreeMap::new(),
                    faults: BTreeSet::new(),
                    next_id: 1,
                },
            ),
        }
    }

    /// Plugs a function into the bus and returns what enumeration sees.
    ///
    /// # Errors
    ///
    /// [`PlugError::AddressInUse`] if the slot is taken and
    /// [`PlugError::NoDevice`] if `config` reports no vendor.
    pub fn plug(
        &self,
        address: PciAddress,
        config: SimConfigSpace,
    ) -> Result<PciDeviceInfo, PlugError> {
        let mut state = self.state.lock();
        if state.devices.contains_key(&address) {
            return Err(PlugError::AddressInUse(address));
        }
        let info = enumerate::read_device_info(address, &config)
            .ok_or(PlugError::NoDevice(address))?;
        state.devices.insert(
            address,
            SimDevice {
                config,
                memory: BTreeMap::new(),
            },
        );
        kinfo!(
            "pci {}: [{:04x}:{:04x}] {}",
            address,
            info.vendor_id,
            info.device_id,
            enumerate::class_name(info.class, info.subclass)
        );
        Ok(info)
    }

    /// Enumerates every function on the bus in address order.
    #[must_use]
    pub fn devices(&self) -> Vec<PciDeviceInfo> {
        let state = self.state.lock();
        state
            .devices
            .iter()
            .filter_map(|(addr, dev)| enumerate::read_device_info(*addr, &dev.config))
            .collect()
    }

    /// Reads the device information of one function.
    #[must_use]
    pub fn device_info(&self, address: PciAddress) -> Option<PciDeviceInfo> {
        let state = self.state.lock();
        let dev = state.devices.get(&address)?;
        enumerate::read_device_info(address, &dev.config)
    }

    /// Makes every future reservation of `bar` on `address` fail.
    pub fn inject_failure(&self, address: PciAddress, bar: u8) {
        self.state.lock().faults.insert((address, bar));
    }

    /// Removes a fault set by [`inject_failure`](Self::inject_failure).
    pub fn clear_failure(&self, address: PciAddress, bar: u8) {
        self.state.lock().faults.remove(&(address, bar));
    }

    /// Number of live reservations.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.lock().reservations.len()
    }

    /// Number of live reservations held by `address`.
    #[must_use]
    pub fn outstanding_for(&self, address: PciAddress) -> usize {
        self.state
            .lock()
            .reservations
            .values()
            .filter(|r| r.owner == address)
            .count()
    }
}

impl BusResources for SimBus {
    fn reserve_memory_bar(
        &self,
        device: PciAddress,
        bar: u8,
        flags: ResourceFlags,
    ) -> Result<ResourceHandle, ResourceError> {
        if usize::from(bar) >= MAX_BARS {
            return Err(ResourceError::InvalidBar);
        }
        let mut state = self.state.lock();
        if state.faults.contains(&(device, bar)) {
            kdebug!("pci {}: BAR{} reservation failed (injected)", device, bar);
            return Err(ResourceError::Unavailable);
        }
        let dev = state
            .devices
            .get(&device)
            .ok_or(ResourceError::Unavailable)?;
        if dev.config.read_u16(regs::VENDOR_ID) == NO_DEVICE {
            return Err(ResourceError::Unavailable);
        }
        let header_type = dev.config.read_u8(regs::HEADER_TYPE);
        let decoded = enumerate::decode_bars(&dev.config, header_type)[usize::from(bar)];

        let (base, size, prefetchable) = match decoded {
            PciBar::Memory {
                base,
                size,
                prefetchable,
                ..
            } if size > 0 => (PhysAddr::new(base), size, prefetchable),
            PciBar::Io { .. } => return Err(ResourceError::NotMemory),
            _ => return Err(ResourceError::Unavailable),
        };
        if state
            .reservations
            .values()
            .any(|r| r.conflicts(base, size, flags))
        {
            return Err(ResourceError::Unavailable);
        }

        let mut flags = flags;
        if !prefetchable {
            flags.remove(ResourceFlags::PREFETCHABLE);
        }

        let window: Arc<dyn MmioWindow> = match state.devices.get_mut(&device) {
            Some(dev) => dev
                .memory
                .entry(bar)
                .or_insert_with(|| Arc::new(SimWindow::new(base)))
                .clone(),
            None => return Err(ResourceError::Unavailable),
        };

        let id = ResourceId::new(state.next_id);
        state.next_id += 1;
        state.reservations.insert(
            id,
            Reservation {
                owner: device,
                bar,
                base,
                size,
                flags,
            },
        );
        drop(state);

        // SAFETY: `id` was just recorded as the only reservation covering
        // `[base, base + size)`, and the window stays alive as long as the
        // region holds its `Arc`.
        let region = unsafe { MmioRegion::new(base, size, window) };
        // SAFETY: this allocator created the reservation above.
        Ok(unsafe { ResourceHandle::new(id, device, bar, flags, region) })
    }

    fn release(&self, handle: ResourceHandle) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        match state.reservations.get(&handle.id()) {
            Some(r) if r.owner == handle.owner() && r.bar == handle.bar() => {
                state.reservations.remove(&handle.id());
                Ok(())
            }
            _ => Err(ResourceError::NotReserved),
        }
    }
}

impl fmt::Debug for SimBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimBus")
            .field("devices", &state.devices.len())
            .field("reservations", &state.reservations.len())
            .finish_non_exhaustive()
    }
}
