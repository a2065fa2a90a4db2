//! Client controller - the top-level reconnecting state machine.
//!
//! ```text
//!   Idle ──start──► Scanning ──match──► Connecting ──ok──► Subscribing ──ok──► Active
//!                    ▲  │ timeout           │ err              │ err/lost          │
//!                    │  └──(restart)        ▼                  ▼                   │
//!                    └──────── delay ──── Backoff ◄────────────┘                   │
//!                    └──────────────────────── disconnect ◄────────────────────────┘
//! ```
//!
//! `Connecting` and `Subscribing` also fall through to `Backoff` when their
//! setup deadline passes, and a failed scan backs off instead of restarting.
//!
//! The controller is owned by a single task.  Radio callbacks never touch it
//! directly; they post [`RadioEvent`]s which that task feeds to
//! [`Controller::handle`].  Time is passed in as milliseconds since boot so
//! the whole machine runs unchanged on the host.

use crate::ble::connection::{Connection, ConnectionManager};
use crate::ble::filter::AdvertisementFilter;
use crate::ble::scanner::Scanner;
use crate::ble::{AdvertisementReport, ConnectionId, PeerAddress, Radio, RadioEvent};
use crate::config::ClientConfig;
use crate::error::{ConnectError, PayloadError, SubscribeError};
use crate::hrm::{NotificationSink, Render};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Idle,
    Scanning,
    Connecting,
    Subscribing,
    Active,
    Backoff,
}

/// Operator-facing progress report.  Informational only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Scanning,
    ScanTimeout,
    ScanFailed,
    PeerFound { address: PeerAddress, rssi: Option<i8> },
    Connected(ConnectionId),
    Subscribed(ConnectionId),
    ConnectFailed(ConnectError),
    SubscribeFailed(SubscribeError),
    ConnectionLost,
    BackingOff { retry_at_ms: u64 },
    PayloadDropped(PayloadError),
}

impl Status {
    /// Short human-readable line for the console / display.
    pub fn message(&self) -> &'static str {
        match self {
            Status::Scanning => "scanning",
            Status::ScanTimeout => "scan timeout, rescanning",
            Status::ScanFailed => "scan failed",
            Status::PeerFound { .. } => "found peer",
            Status::Connected(_) => "connected",
            Status::Subscribed(_) => "receiving",
            Status::ConnectFailed(_) => "connect failed",
            Status::SubscribeFailed(_) => "subscribe failed",
            Status::ConnectionLost => "lost connection, rescanning",
            Status::BackingOff { .. } => "retrying soon",
            Status::PayloadDropped(_) => "bad notification",
        }
    }
}

/// Console/status collaborator.
pub trait StatusSink {
    fn status(&mut self, status: Status);
}

/// Running counters, for the display and for tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    pub scans_started: u32,
    pub scan_timeouts: u32,
    pub scan_failures: u32,
    pub connections: u32,
    pub link_losses: u32,
    pub connect_failures: u32,
    pub subscribe_failures: u32,
    pub stray_notifications: u32,
}

pub struct Controller<R, D, S> {
    config: ClientConfig,
    radio: R,
    scanner: Scanner,
    connections: ConnectionManager,
    sink: NotificationSink<D>,
    status: S,
    state: State,
    /// Backoff expiry, or the give-up time for `Connecting` / `Subscribing`.
    deadline: Option<u64>,
    stats: Stats,
}

impl<R: Radio, D: Render, S: StatusSink> Controller<R, D, S> {
    pub fn new(config: ClientConfig, radio: R, display: D, status: S) -> Self {
        Self {
            scanner: Scanner::new(AdvertisementFilter::new(config.target_service)),
            connections: ConnectionManager::new(config.target_service, config.measurement_characteristic),
            sink: NotificationSink::new(display),
            config,
            radio,
            status,
            state: State::Idle,
            deadline: None,
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn sink(&self) -> &NotificationSink<D> {
        &self.sink
    }

    pub fn status_sink(&self) -> &S {
        &self.status
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connections.connection()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Time (ms) at which [`poll`](Self::poll) has work to do, if any.
    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// Leave `Idle` and begin scanning.  Ignored in any other state.
    pub fn start(&mut self) {
        if self.state == State::Idle {
            self.enter_scanning();
        }
    }

    /// Advance timers.  Leaves `Backoff` once the delay has elapsed, and
    /// abandons a connect or subscribe the radio never answered.
    pub fn poll(&mut self, now_ms: u64) {
        if !matches!(self.deadline, Some(at) if now_ms >= at) {
            return;
        }
        match self.state {
            State::Backoff => self.enter_scanning(),
            State::Connecting => {
                self.stats.connect_failures = self.stats.connect_failures.wrapping_add(1);
                self.status.status(Status::ConnectFailed(ConnectError::Unreachable));
                self.enter_backoff(now_ms);
            }
            State::Subscribing => self.subscribe_failed(SubscribeError::NotConnected, now_ms),
            _ => self.deadline = None,
        }
        self.check_invariants();
    }

    /// Consume one event posted by the radio stack.
    pub fn handle(&mut self, event: RadioEvent, now_ms: u64) {
        match event {
            RadioEvent::Advertisement(report) => self.on_advertisement(&report, now_ms),
            RadioEvent::ScanTimeout => self.on_scan_timeout(),
            RadioEvent::ScanFailed => self.on_scan_failed(now_ms),
            RadioEvent::ConnectComplete { id, result } => {
                let outcome = self.connections.on_connect_complete(&mut self.radio, id, result);
                match outcome {
                    Some(Ok(id)) if self.state == State::Connecting => self.on_connected(id, now_ms),
                    Some(Err(e)) if self.state == State::Connecting => {
                        self.stats.connect_failures = self.stats.connect_failures.wrapping_add(1);
                        self.status.status(Status::ConnectFailed(e));
                        self.enter_backoff(now_ms);
                    }
                    _ => {}
                }
            }
            RadioEvent::SubscribeComplete { id, result } => {
                let outcome = self.connections.on_subscribe_complete(&mut self.radio, id, result);
                match outcome {
                    Some(Ok(id)) if self.state == State::Subscribing => {
                        self.state = State::Active;
                        self.deadline = None;
                        self.status.status(Status::Subscribed(id));
                    }
                    Some(Err(e)) if self.state == State::Subscribing => self.subscribe_failed(e, now_ms),
                    _ => {}
                }
            }
            RadioEvent::Disconnected { id } => self.on_disconnected(id, now_ms),
            RadioEvent::Notification { id, data } => {
                if self.state != State::Active || !self.connections.accepts_notification(id) {
                    self.stats.stray_notifications = self.stats.stray_notifications.wrapping_add(1);
                } else if let Err(e) = self.sink.on_notify(&data) {
                    self.status.status(Status::PayloadDropped(e));
                }
            }
        }
        self.check_invariants();
    }

    fn on_advertisement(&mut self, report: &AdvertisementReport, now_ms: u64) {
        if self.state != State::Scanning {
            return;
        }
        let Some(peer) = self.scanner.on_report(&mut self.radio, report) else {
            return;
        };
        self.status.status(Status::PeerFound {
            address: peer.address,
            rssi: peer.rssi,
        });
        match self.connections.connect(&mut self.radio, peer) {
            Ok(_) => {
                self.state = State::Connecting;
                self.deadline = Some(now_ms.saturating_add(self.config.setup_timeout_ms));
            }
            Err(e) => {
                self.stats.connect_failures = self.stats.connect_failures.wrapping_add(1);
                self.status.status(Status::ConnectFailed(e));
                self.enter_backoff(now_ms);
            }
        }
    }

    fn on_scan_timeout(&mut self) {
        if !self.scanner.on_timeout() || self.state != State::Scanning {
            return;
        }
        self.stats.scan_timeouts = self.stats.scan_timeouts.wrapping_add(1);
        self.status.status(Status::ScanTimeout);
        self.enter_scanning();
    }

    /// The radio could not run the scan at all; rescanning at once would spin.
    fn on_scan_failed(&mut self, now_ms: u64) {
        if !self.scanner.on_timeout() || self.state != State::Scanning {
            return;
        }
        self.stats.scan_failures = self.stats.scan_failures.wrapping_add(1);
        self.status.status(Status::ScanFailed);
        self.enter_backoff(now_ms);
    }

    fn on_connected(&mut self, id: ConnectionId, now_ms: u64) {
        self.stats.connections = self.stats.connections.wrapping_add(1);
        self.state = State::Subscribing;
        self.deadline = Some(now_ms.saturating_add(self.config.setup_timeout_ms));
        self.status.status(Status::Connected(id));
        if let Err(e) = self.connections.subscribe(&mut self.radio) {
            self.subscribe_failed(e, now_ms);
        }
    }

    fn on_disconnected(&mut self, id: ConnectionId, now_ms: u64) {
        if !self.connections.on_disconnected(id) {
            return;
        }
        match self.state {
            State::Active => {
                self.stats.link_losses = self.stats.link_losses.wrapping_add(1);
                self.status.status(Status::ConnectionLost);
                self.enter_scanning();
            }
            State::Subscribing => self.subscribe_failed(SubscribeError::NotConnected, now_ms),
            State::Connecting => {
                self.stats.connect_failures = self.stats.connect_failures.wrapping_add(1);
                self.status.status(Status::ConnectFailed(ConnectError::Rejected));
                self.enter_backoff(now_ms);
            }
            _ => {}
        }
    }

    fn subscribe_failed(&mut self, e: SubscribeError, now_ms: u64) {
        self.stats.subscribe_failures = self.stats.subscribe_failures.wrapping_add(1);
        self.connections.teardown(&mut self.radio);
        self.status.status(Status::SubscribeFailed(e));
        self.enter_backoff(now_ms);
    }

    fn enter_scanning(&mut self) {
        // Scan and connection share the radio; never hold both.
        self.connections.teardown(&mut self.radio);
        self.deadline = None;
        self.scanner
            .start(&mut self.radio, self.config.scan_duration_ms, self.config.active_scan);
        self.stats.scans_started = self.stats.scans_started.wrapping_add(1);
        self.state = State::Scanning;
        self.status.status(Status::Scanning);
    }

    fn enter_backoff(&mut self, now_ms: u64) {
        self.scanner.stop(&mut self.radio);
        self.connections.teardown(&mut self.radio);
        let retry_at_ms = now_ms.saturating_add(self.config.backoff_ms);
        self.deadline = Some(retry_at_ms);
        self.state = State::Backoff;
        self.status.status(Status::BackingOff { retry_at_ms });
    }

    fn check_invariants(&self) {
        debug_assert!(
            !(self.scanner.is_scanning() && !self.connections.is_idle()),
            "scan and connection active at the same time"
        );
    }
}
