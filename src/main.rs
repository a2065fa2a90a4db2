//! hrm-central firmware for nRF52840 + S140 SoftDevice.
//!
//! Tasks:
//! - `softdevice_task`: runs the SoftDevice event loop
//! - `radio_task`: executes scan / connect / subscribe commands
//! - `controller_task`: drives the reconnecting client state machine
//! - `display_task`: keeps the SSD1306 up to date
//!
//! DEFMT_LOG=info cargo run --release --features embedded

#![no_std]
#![no_main]

mod display;
mod radio;

use defmt::{info, unwrap};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::{bind_interrupts, peripherals, twim};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Instant, Timer};
use hrm_central::ble::RadioEvent;
use hrm_central::config::ClientConfig;
use hrm_central::Controller;
use nrf_softdevice::{raw, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

use crate::radio::{ChannelRadio, RadioCommand, COMMAND_DEPTH, EVENT_DEPTH};

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

static COMMANDS: Channel<CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH> = Channel::new();
static EVENTS: Channel<CriticalSectionRawMutex, RadioEvent, EVENT_DEPTH> = Channel::new();
static TWIM_BUF: StaticCell<[u8; 4]> = StaticCell::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn radio_task(sd: &'static Softdevice) -> ! {
    radio::radio_loop(sd, COMMANDS.receiver(), EVENTS.sender()).await
}

#[embassy_executor::task]
async fn display_task(i2c: twim::Twim<'static, peripherals::TWISPI0>) -> ! {
    display::display_loop(i2c).await
}

#[embassy_executor::task]
async fn controller_task(config: ClientConfig) -> ! {
    let radio = ChannelRadio::new(COMMANDS.sender(), EVENTS.sender());
    let mut controller = Controller::new(config, radio, display::OledRender, display::LogStatus);
    controller.start();

    loop {
        let event = match controller.deadline() {
            Some(at) => match select(EVENTS.receive(), Timer::at(Instant::from_millis(at))).await {
                Either::First(event) => Some(event),
                Either::Second(()) => None,
            },
            None => Some(EVENTS.receive().await),
        };

        let now = Instant::now().as_millis();
        match event {
            Some(event) => controller.handle(event, now),
            None => controller.poll(now),
        }
    }
}

/// SoftDevice configuration: one central link, no peripheral role.
fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("hrm-central starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    let sd = Softdevice::enable(&softdevice_config());
    unwrap!(spawner.spawn(softdevice_task(sd)));

    interrupt::TWISPI0.set_priority(Priority::P3);
    let twim_buf = TWIM_BUF.init([0; 4]);
    let i2c = twim::Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default(), twim_buf);
    unwrap!(spawner.spawn(display_task(i2c)));

    unwrap!(spawner.spawn(radio_task(sd)));
    unwrap!(spawner.spawn(controller_task(ClientConfig::default())));
}
