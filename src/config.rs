//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters, connection parameters and GATT identifiers live
//! here so they can be tuned in one place.  [`ClientConfig`] bundles the
//! subset the client state machine needs at runtime.

use crate::ble::Uuid;

// BLE discovery

/// Duration of a single BLE scan window (seconds).  An expired window
/// restarts immediately, so this only bounds how often we log a timeout.
pub const BLE_SCAN_DURATION_SECS: u64 = 5;

/// Send scan requests to get the scan response (local name).
pub const BLE_ACTIVE_SCAN: bool = true;

/// Fixed delay between a failed scan/connect/subscribe and the next scan (ms).
pub const BLE_RETRY_BACKOFF_MS: u64 = 2_000;

/// Give up on a connect attempt after this long (ms).
pub const BLE_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on `Connecting` / `Subscribing` before the client gives up
/// and backs off, whether or not the radio ever reports back (ms).  Covers
/// the radio's own connect timeout plus discovery and the CCCD write.
pub const BLE_LINK_SETUP_TIMEOUT_MS: u64 = 3 * BLE_CONNECT_TIMEOUT_MS;

/// Service UUIDs retained from one advertisement.  A legacy PDU carries at
/// most 31 bytes of AD data, which fits at most 14 16-bit UUIDs in a single
/// list structure, so nothing advertised is ever dropped.
pub const BLE_MAX_ADVERTISED_SERVICES: usize = 14;

/// Largest notification payload we buffer (ATT MTU 23 - 3).
pub const BLE_MAX_NOTIFY_LEN: usize = 20;

// BLE connection parameters

/// Connection interval range (in 1.25 ms units).  Heart rate arrives at
/// roughly 1 Hz, so there is no need for the tightest interval.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

// GATT identifiers

/// Heart Rate Service.
pub const HEART_RATE_SERVICE_UUID: u16 = 0x180D;

/// Heart Rate Measurement characteristic (notify).
pub const HEART_RATE_MEASUREMENT_UUID: u16 = 0x2A37;

// Display

/// Status lines shown on the OLED are truncated to this many bytes.
pub const DISPLAY_LINE_LEN: usize = 21;

/// Runtime configuration of the client state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientConfig {
    /// Service a peer must advertise to be selected.
    pub target_service: Uuid,
    /// Characteristic that must support notifications on the peer.
    pub measurement_characteristic: Uuid,
    /// Length of one scan window (ms).
    pub scan_duration_ms: u64,
    /// Solicit scan responses while scanning.
    pub active_scan: bool,
    /// Delay spent in `Backoff` before scanning again (ms).
    pub backoff_ms: u64,
    /// Deadline for each of `Connecting` and `Subscribing` (ms).
    pub setup_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target_service: Uuid::Short(HEART_RATE_SERVICE_UUID),
            measurement_characteristic: Uuid::Short(HEART_RATE_MEASUREMENT_UUID),
            scan_duration_ms: BLE_SCAN_DURATION_SECS * 1_000,
            active_scan: BLE_ACTIVE_SCAN,
            backoff_ms: BLE_RETRY_BACKOFF_MS,
            setup_timeout_ms: BLE_LINK_SETUP_TIMEOUT_MS,
        }
    }
}
