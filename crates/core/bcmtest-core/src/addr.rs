//! Typed physical and virtual address wrappers.
//!
//! Keeps bus addresses reported by BAR decoding apart from the addresses a
//! mapping hands back to the driver.

use core::fmt;
use core::ops::Add;

/// A 64-bit physical (bus) address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u64);

/// A 64-bit virtual address produced by mapping a physical region.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl PhysAddr {
    /// Creates a new `PhysAddr`.
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if `[self, self + size)` intersects `[other, other + other_size)`.
    ///
    /// Empty ranges never overlap anything.
    #[must_use]
    pub const fn range_overlaps(self, size: u64, other: PhysAddr, other_size: u64) -> bool {
        if size == 0 || other_size == 0 {
            return false;
        }
        let a_end = self.0.saturating_add(size);
        let b_end = other.0.saturating_add(other_size);
        self.0 < b_end && other.0 < a_end
    }
}

impl VirtAddr {
    /// Creates a new `VirtAddr`.
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Add<u64> for PhysAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        Self(self.0 + rhs)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_hex() {
        assert_eq!(format!("{}", PhysAddr::new(0xF000_0000)), "0xf0000000");
        assert_eq!(format!("{:?}", VirtAddr::new(0x10)), "VirtAddr(0x10)");
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let a = PhysAddr::new(0x1000);
        assert!(!a.range_overlaps(0x1000, PhysAddr::new(0x2000), 0x1000));
        assert!(!PhysAddr::new(0x2000).range_overlaps(0x1000, a, 0x1000));
    }

    #[test]
    fn contained_and_partial_ranges_overlap() {
        let a = PhysAddr::new(0x1000);
        assert!(a.range_overlaps(0x1000, PhysAddr::new(0x1800), 0x10));
        assert!(a.range_overlaps(0x1000, PhysAddr::new(0x0800), 0x1000));
        assert!(a.range_overlaps(0x1000, a, 0x1000));
    }

    #[test]
    fn empty_range_never_overlaps() {
        let a = PhysAddr::new(0x1000);
        assert!(!a.range_overlaps(0, a, 0x1000));
    }
}
