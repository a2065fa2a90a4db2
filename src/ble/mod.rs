//! Bluetooth Low Energy central-role logic.
//!
//! Everything in here is radio-agnostic and runs on the host:
//!
//! 1. **Advertisement parser / filter** - turns raw AD structures into an
//!    [`AdvertisementReport`] and decides whether it carries the target
//!    service.
//! 2. **Scanner** - owns the single scan session and stops it exactly once
//!    when a match arrives.
//! 3. **Connection Manager** - owns the single logical connection, from
//!    connect through subscribe to teardown.
//!
//! The actual SoftDevice calls sit behind the [`Radio`] trait.  Results come
//! back asynchronously as [`RadioEvent`] values, which the firmware posts into
//! a channel consumed by the client controller.

pub mod adv_parser;
pub mod connection;
pub mod filter;
pub mod scanner;

#[cfg(test)]
pub(crate) mod mock;

use crate::config::{BLE_MAX_ADVERTISED_SERVICES, BLE_MAX_NOTIFY_LEN};
use crate::error::{ConnectError, SubscribeError};
use heapless::{String, Vec};

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`, little-endian.
const BASE_UUID_LE: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// A GATT service or characteristic identifier.
///
/// `Long` holds the 128-bit value in over-the-air (little-endian) order.
/// Equality compares the expanded 128-bit form, so `Short(0x180D)` equals the
/// same UUID spelled out on the base UUID.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    Short(u16),
    Long([u8; 16]),
}

impl Uuid {
    /// Build from 16 little-endian bytes, collapsing base-UUID values to `Short`.
    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        if bytes[..12] == BASE_UUID_LE[..12] && bytes[14] == 0 && bytes[15] == 0 {
            Uuid::Short(u16::from_le_bytes([bytes[12], bytes[13]]))
        } else {
            Uuid::Long(bytes)
        }
    }

    /// Expanded 128-bit form, little-endian.
    pub fn to_le_bytes(self) -> [u8; 16] {
        match self {
            Uuid::Short(short) => {
                let mut bytes = BASE_UUID_LE;
                bytes[12..14].copy_from_slice(&short.to_le_bytes());
                bytes
            }
            Uuid::Long(bytes) => bytes,
        }
    }
}

impl PartialEq for Uuid {
    fn eq(&self, other: &Self) -> bool {
        self.to_le_bytes() == other.to_le_bytes()
    }
}

impl Eq for Uuid {}

/// Opaque BLE device address as reported by the radio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    /// GAP address type (public / random static / ...).
    pub addr_type: u8,
    /// Address bytes, little-endian as on air.
    pub bytes: [u8; 6],
}

/// One advertisement (or scan response) seen while scanning.
///
/// Lives only for the duration of the filter check.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisementReport {
    pub peer: PeerAddress,
    /// Advertised service identifiers (truncated to capacity).
    pub services: Vec<Uuid, BLE_MAX_ADVERTISED_SERVICES>,
    /// Received Signal Strength Indicator (dBm), if the radio reported one.
    pub rssi: Option<i8>,
    /// Local name, `"Unknown"` if absent.
    pub name: String<32>,
}

impl AdvertisementReport {
    /// Decode raw AD structures into a report.
    pub fn from_ad_data(peer: PeerAddress, rssi: Option<i8>, data: &[u8]) -> Self {
        Self {
            peer,
            services: adv_parser::extract_service_uuids(data),
            rssi,
            name: adv_parser::extract_device_name(data),
        }
    }

    pub fn advertises(&self, uuid: &Uuid) -> bool {
        self.services.iter().any(|s| s == uuid)
    }
}

/// The peer selected by the scanner.
///
/// Deliberately not `Clone`: the connection manager takes ownership on
/// match and either moves it into a [`connection::Connection`] or drops it.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerHandle {
    pub address: PeerAddress,
    pub name: String<32>,
    pub rssi: Option<i8>,
}

impl PeerHandle {
    pub fn from_report(report: &AdvertisementReport) -> Self {
        Self {
            address: report.peer,
            name: report.name.clone(),
            rssi: report.rssi,
        }
    }
}

/// Generation number of a connection attempt.
///
/// Every radio event about a link carries the id it was issued under, so
/// late events for an earlier link can be told apart from current ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionId(pub u32);

/// Resolved notification source on the connected peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicHandle {
    pub uuid: Uuid,
    /// ATT handle of the characteristic value.
    pub value_handle: u16,
    /// ATT handle of the Client Characteristic Configuration Descriptor.
    pub cccd_handle: Option<u16>,
    /// The characteristic properties include Notify.
    pub can_notify: bool,
    /// Notifications enabled on the current link ("subscription").
    pub notifications_enabled: bool,
}

impl CharacteristicHandle {
    /// A freshly discovered characteristic; never subscribed yet.
    pub fn discovered(uuid: Uuid, value_handle: u16, cccd_handle: Option<u16>, can_notify: bool) -> Self {
        Self {
            uuid,
            value_handle,
            cccd_handle,
            can_notify,
            notifications_enabled: false,
        }
    }

    pub fn supports_notify(&self) -> bool {
        self.can_notify && self.cccd_handle.is_some()
    }
}

/// Parameters of a scan request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    pub duration_ms: u64,
    /// Send scan requests to solicit scan-response data.
    pub active: bool,
}

/// Raw notification payload as delivered by the radio.
pub type NotifyPayload = Vec<u8, BLE_MAX_NOTIFY_LEN>;

/// Command side of the radio stack.
///
/// Every method only *submits* a request and must return without waiting
/// for the radio; completions come back as [`RadioEvent`]s.  Implementations
/// must tolerate redundant `stop_scan` / `disconnect` calls.
pub trait Radio {
    fn start_scan(&mut self, params: ScanParams);
    fn stop_scan(&mut self);
    /// Connect to `peer`, then discover `service` / `characteristic` on it.
    fn connect(&mut self, id: ConnectionId, peer: &PeerAddress, service: Uuid, characteristic: Uuid);
    fn enable_notifications(&mut self, id: ConnectionId, characteristic: &CharacteristicHandle);
    fn disconnect(&mut self, id: ConnectionId);
}

/// Everything the radio stack reports back, one value per callback.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// An advertisement was received during a scan.
    Advertisement(AdvertisementReport),
    /// The scan window elapsed with the scan still running.
    ScanTimeout,
    /// The radio could not start or keep running the scan.
    ScanFailed,
    /// Connect + discovery finished for attempt `id`.
    ConnectComplete {
        id: ConnectionId,
        result: Result<CharacteristicHandle, ConnectError>,
    },
    /// The CCCD write for attempt `id` finished.
    SubscribeComplete {
        id: ConnectionId,
        result: Result<(), SubscribeError>,
    },
    /// Link `id` went away (peer-initiated, link loss, or our own teardown).
    Disconnected { id: ConnectionId },
    /// A value notification arrived on link `id`.
    Notification { id: ConnectionId, data: NotifyPayload },
}
