//! Heart Rate Measurement decoding and the notification sink.

pub mod measurement;
pub mod sink;


pub use measurement::{HeartRateMeasurement, SensorContact};
pub use sink::NotificationSink;

/// Display/log collaborator receiving every decoded measurement.
///
/// Must be synchronous, must not block, and must never call back into the
/// client controller.
pub trait Render {
    fn render(&mut self, measurement: &HeartRateMeasurement);
}
