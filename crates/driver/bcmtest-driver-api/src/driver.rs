//! Device lifecycle trait and state types.

use core::fmt;

use crate::error::DriverError;

/// Outcome of probing a candidate device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The driver supports the device; carries the device description.
    Match(&'static str),
    /// The driver does not support the device.
    NoMatch,
}

impl ProbeResult {
    /// Returns `true` for [`ProbeResult::Match`].
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }

    /// Converts to a `Result`, carrying the description on a match.
    ///
    /// # Errors
    ///
    /// [`DriverError::NoMatch`] if the driver declined the device.
    pub const fn into_result(self) -> Result<&'static str, DriverError> {
        match self {
            Self::Match(desc) => Ok(desc),
            Self::NoMatch => Err(DriverError::NoMatch),
        }
    }
}

/// Power sub-state of an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Normal operation.
    Running,
    /// Suspended; resources stay claimed.
    Suspended,
}

/// The lifecycle state of one device binding.
///
/// State machine: `Unbound → Probed → Attached(Running ↔ Suspended) → Detached`.
/// A failed attach leaves the binding `Probed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not yet probed, or probed without a match.
    Unbound,
    /// Probe matched; resources not yet claimed.
    Probed,
    /// Device instance exists, resources claimed, node published.
    Attached(PowerState),
    /// Torn down; terminal.
    Detached,
}

impl LifecycleState {
    /// Returns `true` while a device instance exists.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        matches!(self, Self::Attached(_))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => f.write_str("unbound"),
            Self::Probed => f.write_str("probed"),
            Self::Attached(PowerState::Running) => f.write_str("attached"),
            Self::Attached(PowerState::Suspended) => f.write_str("attached (suspended)"),
            Self::Detached => f.write_str("detached"),
        }
    }
}

/// Lifecycle callbacks a framework invokes on one device binding.
///
/// Callbacks for the same binding are never invoked concurrently, which is
/// expressed by `&mut self`.
pub trait DeviceMethods: Send {
    /// Asks whether the driver supports the bound device.
    fn probe(&mut self) -> ProbeResult;

    /// Builds the device instance, claims its resources and publishes its node.
    ///
    /// # Errors
    ///
    /// [`DriverError::ResourceUnavailable`] if any BAR cannot be claimed; no
    /// partial instance survives. [`DriverError::InvalidState`] unless the
    /// binding is `Probed`.
    fn attach(&mut self) -> Result<(), DriverError>;

    /// Unpublishes the node, releases resources and discards the instance.
    ///
    /// # Errors
    ///
    /// [`DriverError::DetachInconsistency`] unless the binding is attached.
    fn detach(&mut self) -> Result<(), DriverError>;

    /// System shutdown notification.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the binding is attached.
    fn shutdown(&mut self) -> Result<(), DriverError>;

    /// Moves an attached device to [`PowerState::Suspended`].
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the binding is attached.
    fn suspend(&mut self) -> Result<(), DriverError>;

    /// Moves an attached device back to [`PowerState::Running`].
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the binding is attached.
    fn resume(&mut self) -> Result<(), DriverError>;

    /// Current lifecycle state.
    fn state(&self) -> LifecycleState;

    /// Published node name while attached.
    fn node_name(&self) -> Option<&str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_attached_states_are_attached() {
        assert!(LifecycleState::Attached(PowerState::Running).is_attached());
        assert!(LifecycleState::Attached(PowerState::Suspended).is_attached());
        assert!(!LifecycleState::Probed.is_attached());
        assert!(!LifecycleState::Detached.is_attached());
    }

    #[test]
    fn display_states() {
        assert_eq!(LifecycleState::Unbound.to_string(), "unbound");
        assert_eq!(
            LifecycleState::Attached(PowerState::Suspended).to_string(),
            "attached (suspended)"
        );
    }

    #[test]
    fn probe_result_is_match() {
        assert!(ProbeResult::Match("bcm43a0").is_match());
        assert!(!ProbeResult::NoMatch.is_match());
    }

    #[test]
    fn declined_probe_is_no_match_error() {
        assert_eq!(ProbeResult::Match("bcm43a0").into_result(), Ok("bcm43a0"));
        assert_eq!(ProbeResult::NoMatch.into_result(), Err(DriverError::NoMatch));
    }
}
