//! Raw advertisement (AD structure) decoding.
//!
//! Each AD structure is `[len, type, payload...]` where `len` counts the
//! type byte plus payload.  A zero length or a length running past the end
//! of the buffer ends parsing; whatever was decoded so far is kept.

use super::Uuid;
use crate::config::BLE_MAX_ADVERTISED_SERVICES;
use heapless::{String, Vec};

const AD_INCOMPLETE_UUID16: u8 = 0x02;
const AD_COMPLETE_UUID16: u8 = 0x03;
const AD_INCOMPLETE_UUID128: u8 = 0x06;
const AD_COMPLETE_UUID128: u8 = 0x07;
const AD_SHORTENED_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;

/// Iterate over well-formed `(ad_type, payload)` pairs.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        if i >= data.len() {
            return None;
        }
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let item = (data[i + 1], &data[i + 2..i + 1 + len]);
        i += len + 1;
        Some(item)
    })
}

/// Every 16-bit and 128-bit service UUID listed in the advertisement, in order.
fn service_uuids(data: &[u8]) -> impl Iterator<Item = Uuid> + '_ {
    ad_structures(data).flat_map(|(ad_type, payload)| {
        let width = match ad_type {
            AD_INCOMPLETE_UUID16 | AD_COMPLETE_UUID16 => 2,
            AD_INCOMPLETE_UUID128 | AD_COMPLETE_UUID128 => 16,
            _ => payload.len() + 1,
        };
        payload.chunks_exact(width).map(|chunk| match chunk {
            [lo, hi] => Uuid::Short(u16::from_le_bytes([*lo, *hi])),
            _ => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(chunk);
                Uuid::from_le_bytes(bytes)
            }
        })
    })
}

/// Collect the service UUIDs listed in the advertisement.
///
/// Sized for a legacy advertising PDU; anything past
/// [`BLE_MAX_ADVERTISED_SERVICES`] is not retained.
pub fn extract_service_uuids(data: &[u8]) -> Vec<Uuid, BLE_MAX_ADVERTISED_SERVICES> {
    let mut services = Vec::new();
    for uuid in service_uuids(data) {
        if services.push(uuid).is_err() {
            break;
        }
    }
    services
}

/// Check if raw advertisement data lists `target` as a service.
///
/// Walks the whole buffer, independent of the retained-UUID capacity.
pub fn contains_service_uuid(data: &[u8], target: &Uuid) -> bool {
    service_uuids(data).any(|uuid| uuid == *target)
}

/// Extract complete/shortened local name from advertisement data.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    for (ad_type, payload) in ad_structures(data) {
        if ad_type == AD_SHORTENED_NAME || ad_type == AD_COMPLETE_NAME {
            let mut name = String::new();
            for &b in payload {
                if name.push(b as char).is_err() {
                    break;
                }
            }
            return name;
        }
    }

    let mut s = String::new();
    let _ = s.push_str("Unknown");
    s
}
