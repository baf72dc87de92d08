//! Character-device switch.
//!
//! Maps [`CdevHandle`]s to published [`CharDevice`]s. Every entry point
//! resolves its handle under the table lock, clones the device `Arc`, and
//! drops the lock before calling into the driver. A call therefore either
//! reaches a device that stays alive for the whole call, or fails with
//! [`IoError::NoSuchDevice`]. Handles are never reused.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bcmtest_core::sync::SpinLock;
use bcmtest_core::{kdebug, kinfo};
use bcmtest_driver_api::chardev::{CdevHandle, CdevRegistry, CharDevice};
use bcmtest_driver_api::error::IoError;

struct CdevTable {
    entries: BTreeMap<CdevHandle, Arc<dyn CharDevice>>,
    next: u32,
}

/// The device-node table.
pub struct CdevSwitch {
    table: SpinLock<CdevTable>,
}

impl Default for CdevSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl CdevSwitch {
    /// Creates an empty switch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: SpinLock::named(
                "cdevsw",
                CdevTable {
                    entries: BTreeMap::new(),
                    next: 0,
                },
            ),
        }
    }

    /// Looks up the handle of a published node by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<CdevHandle> {
        self.table
            .lock()
            .entries
            .iter()
            .find(|(_, dev)| dev.name() == name)
            .map(|(handle, _)| *handle)
    }

    /// Names of all published nodes, in publication order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.table
            .lock()
            .entries
            .values()
            .map(|dev| String::from(dev.name()))
            .collect()
    }

    /// Number of published nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Returns `true` if nothing is published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, handle: CdevHandle) -> Result<Arc<dyn CharDevice>, IoError> {
        self.table
            .lock()
            .entries
            .get(&handle)
            .cloned()
            .ok_or(IoError::NoSuchDevice)
    }

    /// Opens the node behind `handle`.
    ///
    /// # Errors
    ///
    /// [`IoError::NoSuchDevice`] if the node is gone, or whatever the device
    /// reports.
    pub fn open(&self, handle: CdevHandle) -> Result<(), IoError> {
        self.resolve(handle)?.open()
    }

    /// Closes the node behind `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn close(&self, handle: CdevHandle) -> Result<(), IoError> {
        self.resolve(handle)?.close()
    }

    /// Reads from the node behind `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn read(&self, handle: CdevHandle, buf: &mut [u8]) -> Result<usize, IoError> {
        self.resolve(handle)?.read(buf)
    }

    /// Writes to the node behind `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn write(&self, handle: CdevHandle, buf: &[u8]) -> Result<usize, IoError> {
        self.resolve(handle)?.write(buf)
    }
}

impl CdevRegistry for CdevSwitch {
    fn make_dev(&self, dev: Arc<dyn CharDevice>) -> Result<CdevHandle, IoError> {
        let mut table = self.table.lock();
        if table.entries.values().any(|d| d.name() == dev.name()) {
            return Err(IoError::NameInUse);
        }
        let handle = CdevHandle::new(table.next);
        table.next += 1;
        kinfo!("cdevsw: created /dev/{} ({})", dev.name(), handle);
        table.entries.insert(handle, dev);
        Ok(handle)
    }

    fn destroy_dev(&self, handle: CdevHandle) -> Result<(), IoError> {
        let removed = self.table.lock().entries.remove(&handle);
        // The device is dropped here, outside the lock.
        match removed {
            Some(dev) => {
                kdebug!("cdevsw: destroyed /dev/{} ({})", dev.name(), handle);
                Ok(())
            }
            None => Err(IoError::NoSuchDevice),
        }
    }
}
