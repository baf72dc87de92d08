//! Character-device entry points.
//!
//! A driver publishes a [`CharDevice`] under a node name; the host resolves
//! an opaque [`CdevHandle`] back to it for every open, close, read and write.

use alloc::sync::Arc;
use core::fmt;

use crate::error::IoError;

/// Opaque identifier of a published device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CdevHandle(u32);

impl CdevHandle {
    /// Creates a new `CdevHandle`.
    #[must_use]
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CdevHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cdev#{}", self.0)
    }
}

/// Entry points of a character device.
///
/// Calls may arrive concurrently from independent callers, including while
/// the owning device is being detached.
pub trait CharDevice: Send + Sync {
    /// Node name the device is published under (e.g. `test0`).
    fn name(&self) -> &str;

    /// Opens the device.
    ///
    /// # Errors
    ///
    /// [`IoError::NoSuchDevice`] once the backing instance is gone.
    fn open(&self) -> Result<(), IoError>;

    /// Closes the device.
    ///
    /// # Errors
    ///
    /// [`IoError::NoSuchDevice`] once the backing instance is gone.
    fn close(&self) -> Result<(), IoError>;

    /// Reads up to `buf.len()` bytes and returns the number transferred.
    ///
    /// # Errors
    ///
    /// [`IoError::NoSuchDevice`] once the backing instance is gone.
    fn read(&self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Writes from `buf` and returns the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// [`IoError::NoSuchDevice`] once the backing instance is gone.
    fn write(&self, buf: &[u8]) -> Result<usize, IoError>;
}

/// Table of published device nodes.
///
/// A driver publishes its [`CharDevice`] at attach time and removes it first
/// thing at detach; once [`destroy_dev`](Self::destroy_dev) returns, no new
/// call can resolve the handle.
pub trait CdevRegistry: Send + Sync {
    /// Publishes `dev` under [`CharDevice::name`].
    ///
    /// # Errors
    ///
    /// [`IoError::NameInUse`] if a node with that name already exists.
    fn make_dev(&self, dev: Arc<dyn CharDevice>) -> Result<CdevHandle, IoError>;

    /// Removes a published node.
    ///
    /// # Errors
    ///
    /// [`IoError::NoSuchDevice`] if the handle is not published.
    fn destroy_dev(&self, handle: CdevHandle) -> Result<(), IoError>;
}
