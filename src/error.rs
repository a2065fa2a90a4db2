//! Error types for the heart-rate client.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data, and
//! all of them are `Copy` so they can travel inside `RadioEvent`s and
//! `Status` values.  Raw SoftDevice codes never reach this layer; the
//! firmware binding maps them onto these variants.

/// Why a connect attempt did not produce a subscribe-ready connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectError {
    /// The peer never answered the connection request.
    Unreachable,
    /// The link was refused or dropped during establishment.
    Rejected,
    /// No free connection slot in the radio stack.
    NoResources,
    /// The peer does not expose the target service.
    ServiceNotFound,
    /// The service lacks the measurement characteristic.
    CharacteristicNotFound,
    /// The characteristic exists but cannot notify.
    NotifyUnsupported,
}

/// Why enabling notifications failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscribeError {
    /// The peer rejected the CCCD write.
    Rejected,
    /// There was no subscribe-ready connection (or it went away).
    NotConnected,
}

/// A notification payload that could not be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    /// Buffer shorter than the flags byte says it should be.
    Truncated { len: usize, needed: usize },
    /// Zero-length notification.
    Empty,
}
