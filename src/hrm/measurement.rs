//! Heart Rate Measurement characteristic (0x2A37) payload.
//!
//! Layout:
//! ```text
//! Byte 0:    Flags
//!            Bit 0     = value format (0: u8, 1: u16 LE)
//!            Bits 1..2 = sensor contact status
//!            Bit 3     = Energy Expended present
//!            Bit 4     = RR-Interval(s) present
//! Byte 1..:  Heart rate value (u8 or u16 LE)
//!            Energy Expended (u16 LE, kJ), if flagged
//!            RR-Intervals (u16 LE each, 1/1024 s), if flagged
//! ```

use crate::error::PayloadError;
use heapless::Vec;

const FLAG_VALUE_U16: u8 = 1 << 0;
const FLAG_CONTACT_DETECTED: u8 = 1 << 1;
const FLAG_CONTACT_SUPPORTED: u8 = 1 << 2;
const FLAG_ENERGY_EXPENDED: u8 = 1 << 3;
const FLAG_RR_INTERVALS: u8 = 1 << 4;

/// Most RR intervals that fit a 20-byte notification (flags + u8 value).
pub const MAX_RR_INTERVALS: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorContact {
    NotSupported,
    NotDetected,
    Detected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartRateMeasurement {
    /// Beats per minute.
    pub bpm: u16,
    pub sensor_contact: SensorContact,
    /// Accumulated energy expended (kJ).
    pub energy_expended: Option<u16>,
    /// RR intervals in 1/1024 s units, oldest first.
    pub rr_intervals: Vec<u16, MAX_RR_INTERVALS>,
}

impl HeartRateMeasurement {
    /// Decode a raw notification.  Extra trailing bytes (including an odd
    /// byte in the RR list) are ignored; missing mandatory bytes are not.
    pub fn parse(data: &[u8]) -> Result<Self, PayloadError> {
        let Some(&flags) = data.first() else {
            return Err(PayloadError::Empty);
        };

        let value_len = if flags & FLAG_VALUE_U16 != 0 { 2 } else { 1 };
        let energy_len = if flags & FLAG_ENERGY_EXPENDED != 0 { 2 } else { 0 };
        let needed = 1 + value_len + energy_len;
        if data.len() < needed {
            return Err(PayloadError::Truncated {
                len: data.len(),
                needed,
            });
        }

        let bpm = if value_len == 2 {
            u16::from_le_bytes([data[1], data[2]])
        } else {
            u16::from(data[1])
        };

        let sensor_contact = match (flags & FLAG_CONTACT_SUPPORTED != 0, flags & FLAG_CONTACT_DETECTED != 0) {
            (false, _) => SensorContact::NotSupported,
            (true, false) => SensorContact::NotDetected,
            (true, true) => SensorContact::Detected,
        };

        let mut offset = 1 + value_len;
        let energy_expended = if energy_len != 0 {
            let energy = u16::from_le_bytes([data[offset], data[offset + 1]]);
            offset += 2;
            Some(energy)
        } else {
            None
        };

        let mut rr_intervals = Vec::new();
        if flags & FLAG_RR_INTERVALS != 0 {
            for chunk in data[offset..].chunks_exact(2) {
                if rr_intervals.push(u16::from_le_bytes([chunk[0], chunk[1]])).is_err() {
                    break;
                }
            }
        }

        Ok(Self {
            bpm,
            sensor_contact,
            energy_expended,
            rr_intervals,
        })
    }

    /// RR intervals converted to milliseconds.
    pub fn rr_intervals_ms(&self) -> impl Iterator<Item = u32> + '_ {
        self.rr_intervals
            .iter()
            .map(|&rr| u32::from(rr) * 1000 / 1024)
    }
}
