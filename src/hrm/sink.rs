//! Notification sink - decodes each notification and forwards it.
//!
//! A single corrupted notification must not disturb the link, so decode
//! failures are counted and handed back to the caller for logging, never
//! escalated.

use super::{HeartRateMeasurement, Render};
use crate::error::PayloadError;

pub struct NotificationSink<D> {
    display: D,
    delivered: u32,
    dropped: u32,
}

impl<D: Render> NotificationSink<D> {
    pub const fn new(display: D) -> Self {
        Self {
            display,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Decode `raw` and forward it to the display collaborator.
    pub fn on_notify(&mut self, raw: &[u8]) -> Result<HeartRateMeasurement, PayloadError> {
        match HeartRateMeasurement::parse(raw) {
            Ok(measurement) => {
                self.display.render(&measurement);
                self.delivered = self.delivered.wrapping_add(1);
                Ok(measurement)
            }
            Err(e) => {
                self.dropped = self.dropped.wrapping_add(1);
                Err(e)
            }
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Measurements forwarded to the display so far.
    pub fn delivered(&self) -> u32 {
        self.delivered
    }

    /// Payloads dropped because they failed to decode.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
