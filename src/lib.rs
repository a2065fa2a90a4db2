//! Heart-rate-monitor BLE central.
//!
//! This library holds the radio-agnostic part of the firmware: advertisement
//! filtering, the scanner, the connection manager, Heart Rate Measurement
//! decoding and the reconnecting client controller.  All of it runs on the
//! host (no embedded hardware required).
//!
//! Usage: `cargo test --lib` / `cargo test`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and plugs the SoftDevice in behind [`ble::Radio`].

#![cfg_attr(not(test), no_std)]

pub mod ble;
pub mod config;
pub mod controller;
pub mod error;
pub mod hrm;

pub use controller::{Controller, State, Status, StatusSink};
