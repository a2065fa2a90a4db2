//! SSD1306 OLED output and status logging.
//!
//! The controller runs in its own task, so it never touches the I²C bus.
//! [`OledRender`] and [`LogStatus`] hand the latest reading / status line to
//! [`display_loop`] through signals; only the newest value matters.

use core::fmt::Write as _;

use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10};
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use heapless::String;
use hrm_central::config::DISPLAY_LINE_LEN;
use hrm_central::hrm::{HeartRateMeasurement, Render, SensorContact};
use hrm_central::{Status, StatusSink};
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

pub static STATUS: Signal<CriticalSectionRawMutex, Status> = Signal::new();
pub static MEASUREMENT: Signal<CriticalSectionRawMutex, HeartRateMeasurement> = Signal::new();

/// Type alias for the concrete display driver.
pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// [`Render`] collaborator: forwards each reading to the OLED task.
pub struct OledRender;

impl Render for OledRender {
    fn render(&mut self, measurement: &HeartRateMeasurement) {
        debug!("HR {} bpm ({} RR values)", measurement.bpm, measurement.rr_intervals.len());
        MEASUREMENT.signal(measurement.clone());
    }
}

/// [`StatusSink`] collaborator: logs over RTT and mirrors the line on the OLED.
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn status(&mut self, status: Status) {
        match status {
            Status::ScanFailed
            | Status::ConnectFailed(_)
            | Status::SubscribeFailed(_)
            | Status::ConnectionLost
            | Status::PayloadDropped(_) => warn!("{}: {}", status.message(), status),
            _ => info!("{}: {}", status.message(), status),
        }
        STATUS.signal(status);
    }
}

/// Initialise the SSD1306 display and clear the screen.
pub fn init<I2C>(i2c: I2C) -> Display<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    let interface = I2CDisplayInterface::new(i2c);
    let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
        .into_buffered_graphics_mode();
    let _ = display.init();
    display.clear_buffer();
    let _ = display.flush();
    display
}

fn small() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build()
}

fn large() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_10X20)
        .text_color(BinaryColor::On)
        .build()
}

/// Redraw the whole screen: title, status line, BPM and contact/RR details.
pub fn draw<I2C>(display: &mut Display<I2C>, status: &str, reading: Option<&HeartRateMeasurement>)
where
    I2C: embedded_hal::i2c::I2c,
{
    display.clear_buffer();

    let _ = Text::new("hrm-central", Point::new(0, 10), small()).draw(display);
    let _ = Text::new(status, Point::new(0, 22), small()).draw(display);

    let mut line: String<DISPLAY_LINE_LEN> = String::new();
    match reading {
        Some(m) => {
            let _ = write!(line, "{} bpm", m.bpm);
        }
        None => {
            let _ = line.push_str("-- bpm");
        }
    }
    let _ = Text::new(line.as_str(), Point::new(0, 44), large()).draw(display);

    if let Some(m) = reading {
        line.clear();
        let contact = match m.sensor_contact {
            SensorContact::Detected => "contact",
            SensorContact::NotDetected => "no contact",
            SensorContact::NotSupported => "",
        };
        let _ = line.push_str(contact);
        if let Some(rr) = m.rr_intervals_ms().last() {
            let _ = write!(line, " RR {}ms", rr);
        }
        let _ = Text::new(line.as_str(), Point::new(0, 60), small()).draw(display);
    }

    let _ = display.flush();
}

/// Wait for status lines and readings and keep the screen current.
pub async fn display_loop<I2C>(i2c: I2C) -> !
where
    I2C: embedded_hal::i2c::I2c,
{
    let mut display = init(i2c);
    let mut status: &'static str = "starting";
    let mut reading: Option<HeartRateMeasurement> = None;
    draw(&mut display, status, None);

    loop {
        match select(STATUS.wait(), MEASUREMENT.wait()).await {
            Either::First(next) => {
                status = next.message();
                // A reading from a link that is gone would be misleading.
                if !matches!(next, Status::Subscribed(_) | Status::PayloadDropped(_)) {
                    reading = None;
                }
            }
            Either::Second(m) => reading = Some(m),
        }
        draw(&mut display, status, reading.as_ref());
    }
}
