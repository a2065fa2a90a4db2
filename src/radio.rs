//! SoftDevice binding for [`Radio`] - the only place that talks to the stack.
//!
//! The controller submits [`RadioCommand`]s through [`ChannelRadio`] without
//! ever waiting.  [`radio_loop`] owns the SoftDevice central role, executes
//! one command at a time, and reports every outcome back as a
//! [`RadioEvent`] on the event channel.
//!
//! One loop means one scan session or one connection at a time, which is
//! all the S140 is configured for.

use core::cell::Cell;

use defmt::{info, warn, Format};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{with_timeout, Duration};
use hrm_central::ble::{
    AdvertisementReport, CharacteristicHandle, ConnectionId, NotifyPayload, PeerAddress, Radio, RadioEvent,
    ScanParams, Uuid,
};
use hrm_central::config::{self, HEART_RATE_MEASUREMENT_UUID};
use hrm_central::error::{ConnectError, SubscribeError};
use nrf_softdevice::ble::{central, gatt_client, Address, AddressType};
use nrf_softdevice::{raw, Softdevice};

pub const COMMAND_DEPTH: usize = 8;
pub const EVENT_DEPTH: usize = 16;

pub type CommandSender = Sender<'static, CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>;
pub type CommandReceiver = Receiver<'static, CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>;
pub type EventSender = Sender<'static, CriticalSectionRawMutex, RadioEvent, EVENT_DEPTH>;

/// Requests from the controller to the radio task.
#[derive(Clone, Format)]
pub enum RadioCommand {
    StartScan(ScanParams),
    StopScan,
    Connect { id: ConnectionId, peer: PeerAddress },
    EnableNotifications { id: ConnectionId },
    Disconnect { id: ConnectionId },
}

/// GATT client for the Heart Rate service.
///
/// The `#[nrf_softdevice::gatt_client]` macro generates discovery and
/// CCCD/notify helpers for the listed characteristics.
#[nrf_softdevice::gatt_client(uuid = "180d")]
pub struct HeartRateServiceClient {
    /// Heart Rate Measurement - notifications carry flags + BPM + extras.
    #[characteristic(uuid = "2a37", notify)]
    pub measurement: NotifyPayload,
}

/// [`Radio`] implementation that forwards requests to [`radio_loop`].
pub struct ChannelRadio {
    commands: CommandSender,
    events: EventSender,
}

impl ChannelRadio {
    pub fn new(commands: CommandSender, events: EventSender) -> Self {
        Self { commands, events }
    }

    /// Queue `cmd` for the radio task.  A dropped request that expects a
    /// completion is answered with a failure right away.
    fn submit(&self, cmd: RadioCommand) {
        let Err(embassy_sync::channel::TrySendError::Full(cmd)) = self.commands.try_send(cmd) else {
            return;
        };
        warn!("radio command queue full - dropping {}", cmd);
        let failure = match cmd {
            RadioCommand::StartScan(_) => RadioEvent::ScanFailed,
            RadioCommand::Connect { id, .. } => RadioEvent::ConnectComplete {
                id,
                result: Err(ConnectError::NoResources),
            },
            RadioCommand::EnableNotifications { id } => RadioEvent::SubscribeComplete {
                id,
                result: Err(SubscribeError::NotConnected),
            },
            RadioCommand::StopScan | RadioCommand::Disconnect { .. } => return,
        };
        // Still full: the controller's setup deadline covers it.
        let _ = self.events.try_send(failure);
    }
}

impl Radio for ChannelRadio {
    fn start_scan(&mut self, params: ScanParams) {
        self.submit(RadioCommand::StartScan(params));
    }

    fn stop_scan(&mut self) {
        self.submit(RadioCommand::StopScan);
    }

    fn connect(&mut self, id: ConnectionId, peer: &PeerAddress, _service: Uuid, _characteristic: Uuid) {
        // Service and characteristic are fixed by `HeartRateServiceClient`.
        self.submit(RadioCommand::Connect { id, peer: *peer });
    }

    fn enable_notifications(&mut self, id: ConnectionId, _characteristic: &CharacteristicHandle) {
        self.submit(RadioCommand::EnableNotifications { id });
    }

    fn disconnect(&mut self, id: ConnectionId) {
        self.submit(RadioCommand::Disconnect { id });
    }
}

/// Execute radio commands forever.
pub async fn radio_loop(sd: &'static Softdevice, commands: CommandReceiver, events: EventSender) -> ! {
    let mut pending: Option<RadioCommand> = None;

    loop {
        let cmd = match pending.take() {
            Some(cmd) => cmd,
            None => commands.receive().await,
        };

        pending = match cmd {
            RadioCommand::StartScan(params) => scan(sd, params, &commands, &events).await,
            RadioCommand::Connect { id, peer } => connect_and_serve(sd, id, peer, &commands, &events).await,
            RadioCommand::EnableNotifications { id } => {
                events
                    .send(RadioEvent::SubscribeComplete {
                        id,
                        result: Err(SubscribeError::NotConnected),
                    })
                    .await;
                None
            }
            // Nothing running: redundant stop / disconnect requests are no-ops.
            RadioCommand::StopScan | RadioCommand::Disconnect { .. } => None,
        };
    }
}

/// Run one scan window.  Returns a command that arrived mid-scan and still
/// needs handling.
async fn scan(
    sd: &Softdevice,
    params: ScanParams,
    commands: &CommandReceiver,
    events: &EventSender,
) -> Option<RadioCommand> {
    info!("BLE scan starting ({} ms window, active={})", params.duration_ms, params.active);

    let config = central::ScanConfig {
        active: params.active,
        ..Default::default()
    };

    // The SoftDevice scan callback receives each advertisement.  We can't
    // await in here, so reports are dropped if the controller falls behind.
    let scan = central::scan(sd, &config, |report| {
        let data = unsafe { core::slice::from_raw_parts(report.data.p_data, report.data.len as usize) };
        let addr = Address::from_raw(report.peer_addr);
        let peer = PeerAddress {
            addr_type: addr.address_type() as u8,
            bytes: addr.bytes(),
        };
        let adv = AdvertisementReport::from_ad_data(peer, Some(report.rssi), data);
        let _ = events.try_send(RadioEvent::Advertisement(adv));
        None::<()>
    });

    let window = with_timeout(Duration::from_millis(params.duration_ms), scan);
    match select(window, commands.receive()).await {
        Either::First(Err(_)) => {
            events.send(RadioEvent::ScanTimeout).await;
            None
        }
        Either::First(Ok(Ok(()))) => {
            events.send(RadioEvent::ScanTimeout).await;
            None
        }
        Either::First(Ok(Err(e))) => {
            warn!("BLE scan ended with error: {}", e);
            events.send(RadioEvent::ScanFailed).await;
            None
        }
        // Dropping the scan future stops the SoftDevice scan.
        Either::Second(RadioCommand::StopScan) => {
            info!("BLE scan stopped");
            None
        }
        Either::Second(other) => Some(other),
    }
}

/// Connect, discover, then serve the link until it drops or the controller
/// tears it down.
async fn connect_and_serve(
    sd: &'static Softdevice,
    id: ConnectionId,
    peer: PeerAddress,
    commands: &CommandReceiver,
    events: &EventSender,
) -> Option<RadioCommand> {
    info!("connecting to {} (attempt {})", peer, id.0);

    let address = to_address(&peer);
    let whitelist = [&address];
    let conn_cfg = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            ..Default::default()
        },
        conn_params: raw::ble_gap_conn_params_t {
            min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
            max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
            slave_latency: config::BLE_SLAVE_LATENCY,
            conn_sup_timeout: config::BLE_SUP_TIMEOUT,
        },
        ..Default::default()
    };

    let connect = with_timeout(
        Duration::from_millis(config::BLE_CONNECT_TIMEOUT_MS),
        central::connect(sd, &conn_cfg),
    );
    let conn = match select(connect, commands.receive()).await {
        Either::First(Ok(Ok(conn))) => conn,
        Either::First(Ok(Err(e))) => {
            warn!("connect failed: {}", e);
            let result = Err(map_connect_error(e));
            events.send(RadioEvent::ConnectComplete { id, result }).await;
            return None;
        }
        Either::First(Err(_)) => {
            warn!("connect timed out");
            let result = Err(ConnectError::Unreachable);
            events.send(RadioEvent::ConnectComplete { id, result }).await;
            return None;
        }
        // The controller abandoned this attempt.
        Either::Second(RadioCommand::Disconnect { .. }) => return None,
        Either::Second(other) => {
            warn!("connect to {} interrupted by {}", peer, other);
            let result = Err(ConnectError::Rejected);
            events.send(RadioEvent::ConnectComplete { id, result }).await;
            return Some(other);
        }
    };

    let client: HeartRateServiceClient = match gatt_client::discover(&conn).await {
        Ok(client) => client,
        Err(e) => {
            warn!("Heart Rate discovery failed: {}", e);
            let _ = conn.disconnect();
            let result = Err(map_discover_error(e));
            events.send(RadioEvent::ConnectComplete { id, result }).await;
            return None;
        }
    };

    info!("Heart Rate service discovered");
    let characteristic = CharacteristicHandle::discovered(
        Uuid::Short(HEART_RATE_MEASUREMENT_UUID),
        client.measurement_value_handle,
        Some(client.measurement_cccd_handle),
        true,
    );
    events
        .send(RadioEvent::ConnectComplete {
            id,
            result: Ok(characteristic),
        })
        .await;

    // The listener runs from the start and returns when the link closes.
    // A notification that beats `SubscribeComplete` to the queue would be
    // rejected, so the newest early one is held back until after it.
    let subscribed = Cell::new(false);
    let early: Cell<Option<NotifyPayload>> = Cell::new(None);
    let forward = |data: NotifyPayload| {
        if events.try_send(RadioEvent::Notification { id, data }).is_err() {
            warn!("event queue full - dropping notification");
        }
    };

    let listen = gatt_client::run(&conn, &client, |event| match event {
        HeartRateServiceClientEvent::MeasurementNotification(data) => {
            if subscribed.get() {
                forward(data);
            } else {
                early.set(Some(data));
            }
        }
    });

    let control = async {
        loop {
            match commands.receive().await {
                RadioCommand::EnableNotifications { id: target } if target == id => {
                    let result = client.measurement_cccd_write(true).await.map_err(|e| {
                        warn!("CCCD write rejected: {}", e);
                        SubscribeError::Rejected
                    });
                    let ok = result.is_ok();
                    events.send(RadioEvent::SubscribeComplete { id, result }).await;
                    if ok {
                        info!("Subscribed to Heart Rate notifications");
                        subscribed.set(true);
                        if let Some(data) = early.take() {
                            forward(data);
                        }
                    }
                }
                RadioCommand::EnableNotifications { id: stale } => {
                    let result = Err(SubscribeError::NotConnected);
                    events.send(RadioEvent::SubscribeComplete { id: stale, result }).await;
                }
                RadioCommand::Disconnect { id: target } if target == id => {
                    let _ = conn.disconnect();
                    return None;
                }
                RadioCommand::Disconnect { .. } | RadioCommand::StopScan => {}
                other => {
                    warn!("dropping link for {}", other);
                    let _ = conn.disconnect();
                    return Some(other);
                }
            }
        }
    };

    let next = match select(listen, control).await {
        Either::First(_) => {
            info!("link {} closed", id.0);
            None
        }
        Either::Second(next) => next,
    };
    events.send(RadioEvent::Disconnected { id }).await;
    next
}

fn to_address(peer: &PeerAddress) -> Address {
    let kind = match peer.addr_type {
        0 => AddressType::Public,
        1 => AddressType::RandomStatic,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        _ => AddressType::Anonymous,
    };
    Address::new(kind, peer.bytes)
}

fn map_connect_error(e: central::ConnectError) -> ConnectError {
    match e {
        central::ConnectError::Timeout => ConnectError::Unreachable,
        central::ConnectError::NoFreeConn => ConnectError::NoResources,
        _ => ConnectError::Rejected,
    }
}

fn map_discover_error(e: gatt_client::DiscoverError) -> ConnectError {
    match e {
        gatt_client::DiscoverError::ServiceNotFound => ConnectError::ServiceNotFound,
        gatt_client::DiscoverError::ServiceIncomplete => ConnectError::CharacteristicNotFound,
        _ => ConnectError::Rejected,
    }
}
