//! Driver, resource and I/O error types.

use core::fmt;

/// Errors reported by the lifecycle callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The candidate device is not one this driver supports.
    NoMatch,
    /// A BAR could not be reserved or mapped during attach.
    ResourceUnavailable,
    /// Detach was requested for a binding that holds no device instance.
    DetachInconsistency,
    /// The callback is not valid in the binding's current lifecycle state.
    InvalidState,
    /// The device node name is already published by another instance.
    NodeNameInUse,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch => f.write_str("device not supported by this driver"),
            Self::ResourceUnavailable => f.write_str("resource unavailable"),
            Self::DetachInconsistency => f.write_str("detach of a device that is not attached"),
            Self::InvalidState => f.write_str("invalid driver state"),
            Self::NodeNameInUse => f.write_str("device node name already in use"),
        }
    }
}

impl core::error::Error for DriverError {}

impl From<ResourceError> for DriverError {
    fn from(_: ResourceError) -> Self {
        Self::ResourceUnavailable
    }
}

/// Errors from the bus resource allocator and from mapped accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// The BAR describes no resource, or its range is already reserved.
    Unavailable,
    /// The BAR index is outside `0..MAX_BARS`.
    InvalidBar,
    /// The BAR describes an I/O port range, not memory.
    NotMemory,
    /// The access falls outside the mapped size.
    OutOfBounds,
    /// The offset is not aligned to the access width.
    Misaligned,
    /// The handle does not name a live reservation (double release).
    NotReserved,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => f.write_str("resource unavailable"),
            Self::InvalidBar => f.write_str("invalid BAR index"),
            Self::NotMemory => f.write_str("BAR is not a memory BAR"),
            Self::OutOfBounds => f.write_str("access outside mapped region"),
            Self::Misaligned => f.write_str("misaligned access"),
            Self::NotReserved => f.write_str("resource is not reserved"),
        }
    }
}

impl core::error::Error for ResourceError {}

/// Errors from character-device entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// The handle no longer resolves to a device instance.
    NoSuchDevice,
    /// A device node with the same name is already registered.
    NameInUse,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchDevice => f.write_str("no such device"),
            Self::NameInUse => f.write_str("device name already in use"),
        }
    }
}

impl core::error::Error for IoError {}
