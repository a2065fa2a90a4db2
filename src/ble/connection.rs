//! Connection manager - lifecycle of the single link to the selected peer.
//!
//! The manager is mechanism only: it issues radio requests, validates what
//! discovery returned, and keeps track of which [`ConnectionId`] is current.
//! It never retries; that decision belongs to the client controller.
//!
//! ```text
//!   Empty --connect--> Pending --ConnectComplete(ok)--> Live(Ready)
//!                                                         |
//!                               subscribe + SubscribeComplete(ok)
//!                                                         v
//!                                                   Live(Subscribed)
//! ```
//!
//! Any failure, teardown or disconnect returns the slot to `Empty`.

use super::{CharacteristicHandle, ConnectionId, PeerHandle, Radio, Uuid};
use crate::error::{ConnectError, SubscribeError};

/// Progress of a live connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Discovery done, notifications not requested yet.
    Ready,
    /// CCCD write in flight.
    Subscribing,
    /// Notifications enabled.
    Subscribed,
}

/// An established link with its resolved notification characteristic.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Connection {
    id: ConnectionId,
    peer: PeerHandle,
    state: LinkState,
    characteristic: CharacteristicHandle,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn characteristic(&self) -> &CharacteristicHandle {
        &self.characteristic
    }
}

#[derive(Debug)]
enum Slot {
    Empty,
    Pending { id: ConnectionId, peer: PeerHandle },
    Live(Connection),
}

impl Slot {
    fn id(&self) -> Option<ConnectionId> {
        match self {
            Slot::Empty => None,
            Slot::Pending { id, .. } => Some(*id),
            Slot::Live(conn) => Some(conn.id),
        }
    }
}

pub struct ConnectionManager {
    service: Uuid,
    characteristic: Uuid,
    next_id: u32,
    slot: Slot,
}

impl ConnectionManager {
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
            next_id: 0,
            slot: Slot::Empty,
        }
    }

    /// No connect in flight and no live link.
    pub fn is_idle(&self) -> bool {
        matches!(self.slot, Slot::Empty)
    }

    pub fn connection(&self) -> Option<&Connection> {
        match &self.slot {
            Slot::Live(conn) => Some(conn),
            _ => None,
        }
    }

    /// Id of the pending or live link, if any.
    pub fn current_id(&self) -> Option<ConnectionId> {
        self.slot.id()
    }

    /// Start connecting to `peer`.  Takes ownership of the handle; it is
    /// dropped again if the attempt fails.
    ///
    /// Only one link is supported, so a second attempt while one is pending
    /// or live is refused with [`ConnectError::NoResources`].
    pub fn connect<R: Radio>(&mut self, radio: &mut R, peer: PeerHandle) -> Result<ConnectionId, ConnectError> {
        if !self.is_idle() {
            return Err(ConnectError::NoResources);
        }
        let id = ConnectionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        radio.connect(id, &peer.address, self.service, self.characteristic);
        self.slot = Slot::Pending { id, peer };
        Ok(id)
    }

    /// Handle the outcome of connect + discovery.
    ///
    /// Returns `None` for a stale attempt.  A connection is only kept when it
    /// is subscribe-ready; otherwise the link is torn down and the error
    /// returned.
    pub fn on_connect_complete<R: Radio>(
        &mut self,
        radio: &mut R,
        id: ConnectionId,
        result: Result<CharacteristicHandle, ConnectError>,
    ) -> Option<Result<ConnectionId, ConnectError>> {
        if self.current_id() != Some(id) {
            // A link we no longer track must not stay up.
            if result.is_ok() {
                radio.disconnect(id);
            }
            return None;
        }
        if !matches!(self.slot, Slot::Pending { .. }) {
            return None;
        }
        let Slot::Pending { peer, .. } = core::mem::replace(&mut self.slot, Slot::Empty) else {
            return None;
        };

        let mut characteristic = match result {
            Ok(characteristic) => characteristic,
            Err(e) => return Some(Err(e)),
        };

        let invalid = if characteristic.uuid != self.characteristic {
            Some(ConnectError::CharacteristicNotFound)
        } else if !characteristic.supports_notify() {
            Some(ConnectError::NotifyUnsupported)
        } else {
            None
        };
        if let Some(e) = invalid {
            radio.disconnect(id);
            return Some(Err(e));
        }

        characteristic.notifications_enabled = false;
        self.slot = Slot::Live(Connection {
            id,
            peer,
            state: LinkState::Ready,
            characteristic,
        });
        Some(Ok(id))
    }

    /// Ask the peer to start notifying.
    pub fn subscribe<R: Radio>(&mut self, radio: &mut R) -> Result<ConnectionId, SubscribeError> {
        match &mut self.slot {
            Slot::Live(conn) if conn.state == LinkState::Ready => {
                radio.enable_notifications(conn.id, &conn.characteristic);
                conn.state = LinkState::Subscribing;
                Ok(conn.id)
            }
            _ => Err(SubscribeError::NotConnected),
        }
    }

    /// Handle the CCCD write outcome.  On failure the link is torn down
    /// before the error is handed back.
    pub fn on_subscribe_complete<R: Radio>(
        &mut self,
        radio: &mut R,
        id: ConnectionId,
        result: Result<(), SubscribeError>,
    ) -> Option<Result<ConnectionId, SubscribeError>> {
        let conn = match &mut self.slot {
            Slot::Live(conn) if conn.id == id && conn.state == LinkState::Subscribing => conn,
            _ => return None,
        };
        match result {
            Ok(()) => {
                conn.characteristic.notifications_enabled = true;
                conn.state = LinkState::Subscribed;
                Some(Ok(id))
            }
            Err(e) => {
                self.teardown(radio);
                Some(Err(e))
            }
        }
    }

    /// Drop the pending or live link.  Returns `false` (and touches nothing)
    /// when there is nothing to tear down, so repeated calls are harmless.
    pub fn teardown<R: Radio>(&mut self, radio: &mut R) -> bool {
        match core::mem::replace(&mut self.slot, Slot::Empty).id() {
            Some(id) => {
                radio.disconnect(id);
                true
            }
            None => false,
        }
    }

    /// The radio reported link `id` gone.  Returns whether it was ours.
    pub fn on_disconnected(&mut self, id: ConnectionId) -> bool {
        if self.current_id() == Some(id) {
            self.slot = Slot::Empty;
            true
        } else {
            false
        }
    }

    /// Notifications are only accepted on the live, subscribed link.
    pub fn accepts_notification(&self, id: ConnectionId) -> bool {
        matches!(&self.slot, Slot::Live(conn) if conn.id == id && conn.state == LinkState::Subscribed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::{Call, MockRadio};
    use crate::ble::PeerAddress;
    use heapless::String;

    const HRS: Uuid = Uuid::Short(0x180D);
    const HRM: Uuid = Uuid::Short(0x2A37);

    fn peer() -> PeerHandle {
        PeerHandle {
            address: PeerAddress {
                addr_type: 1,
                bytes: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
            },
            name: String::new(),
            rssi: None,
        }
    }

    fn notifying() -> CharacteristicHandle {
        CharacteristicHandle::discovered(HRM, 0x000E, Some(0x000F), true)
    }

    fn connected(radio: &mut MockRadio) -> (ConnectionManager, ConnectionId) {
        let mut mgr = ConnectionManager::new(HRS, HRM);
        let id = mgr.connect(radio, peer()).unwrap();
        assert_eq!(mgr.on_connect_complete(radio, id, Ok(notifying())), Some(Ok(id)));
        (mgr, id)
    }

    #[test]
    fn connect_issues_radio_request() {
        let mut radio = MockRadio::default();
        let mut mgr = ConnectionManager::new(HRS, HRM);
        let id = mgr.connect(&mut radio, peer()).unwrap();
        assert_eq!(radio.calls, [Call::Connect(id, peer().address)]);
        assert!(!mgr.is_idle());
        assert!(mgr.connection().is_none());
    }

    #[test]
    fn second_connect_is_refused() {
        let mut radio = MockRadio::default();
        let mut mgr = ConnectionManager::new(HRS, HRM);
        mgr.connect(&mut radio, peer()).unwrap();
        assert_eq!(mgr.connect(&mut radio, peer()), Err(ConnectError::NoResources));
        assert_eq!(radio.count(|c| matches!(c, Call::Connect(..))), 1);
    }

    #[test]
    fn successful_connect_is_subscribe_ready() {
        let mut radio = MockRadio::default();
        let (mgr, id) = connected(&mut radio);
        let conn = mgr.connection().unwrap();
        assert_eq!(conn.id(), id);
        assert_eq!(conn.state(), LinkState::Ready);
        assert!(!conn.characteristic().notifications_enabled);
    }

    #[test]
    fn connect_error_frees_the_slot() {
        let mut radio = MockRadio::default();
        let mut mgr = ConnectionManager::new(HRS, HRM);
        let id = mgr.connect(&mut radio, peer()).unwrap();
        assert_eq!(
            mgr.on_connect_complete(&mut radio, id, Err(ConnectError::Unreachable)),
            Some(Err(ConnectError::Unreachable))
        );
        assert!(mgr.is_idle());
    }

    #[test]
    fn characteristic_without_notify_is_torn_down() {
        let mut radio = MockRadio::default();
        let mut mgr = ConnectionManager::new(HRS, HRM);
        let id = mgr.connect(&mut radio, peer()).unwrap();
        let read_only = CharacteristicHandle::discovered(HRM, 0x000E, None, false);
        assert_eq!(
            mgr.on_connect_complete(&mut radio, id, Ok(read_only)),
            Some(Err(ConnectError::NotifyUnsupported))
        );
        assert!(mgr.is_idle());
        assert_eq!(radio.calls.last(), Some(&Call::Disconnect(id)));
    }

    #[test]
    fn wrong_characteristic_is_torn_down() {
        let mut radio = MockRadio::default();
        let mut mgr = ConnectionManager::new(HRS, HRM);
        let id = mgr.connect(&mut radio, peer()).unwrap();
        let other = CharacteristicHandle::discovered(Uuid::Short(0x2A38), 0x0010, Some(0x0011), true);
        assert_eq!(
            mgr.on_connect_complete(&mut radio, id, Ok(other)),
            Some(Err(ConnectError::CharacteristicNotFound))
        );
        assert!(mgr.is_idle());
    }

    #[test]
    fn stale_connect_success_is_disconnected() {
        let mut radio = MockRadio::default();
        let mut mgr = ConnectionManager::new(HRS, HRM);
        let id = mgr.connect(&mut radio, peer()).unwrap();
        mgr.teardown(&mut radio);
        radio.calls.clear();

        assert_eq!(mgr.on_connect_complete(&mut radio, id, Ok(notifying())), None);
        assert_eq!(radio.calls, [Call::Disconnect(id)]);
        assert!(mgr.is_idle());
    }

    #[test]
    fn subscribe_then_accept_notifications() {
        let mut radio = MockRadio::default();
        let (mut mgr, id) = connected(&mut radio);
        assert!(!mgr.accepts_notification(id));

        assert_eq!(mgr.subscribe(&mut radio), Ok(id));
        assert_eq!(radio.calls.last(), Some(&Call::EnableNotifications(id)));
        assert_eq!(mgr.on_subscribe_complete(&mut radio, id, Ok(())), Some(Ok(id)));

        let conn = mgr.connection().unwrap();
        assert_eq!(conn.state(), LinkState::Subscribed);
        assert!(conn.characteristic().notifications_enabled);
        assert!(mgr.accepts_notification(id));
        assert!(!mgr.accepts_notification(ConnectionId(id.0 + 1)));
    }

    #[test]
    fn subscribe_without_connection_fails() {
        let mut radio = MockRadio::default();
        let mut mgr = ConnectionManager::new(HRS, HRM);
        assert_eq!(mgr.subscribe(&mut radio), Err(SubscribeError::NotConnected));
        assert!(radio.calls.is_empty());
    }

    #[test]
    fn rejected_subscribe_tears_down_first() {
        let mut radio = MockRadio::default();
        let (mut mgr, id) = connected(&mut radio);
        mgr.subscribe(&mut radio).unwrap();
        assert_eq!(
            mgr.on_subscribe_complete(&mut radio, id, Err(SubscribeError::Rejected)),
            Some(Err(SubscribeError::Rejected))
        );
        assert!(mgr.is_idle());
        assert_eq!(radio.calls.last(), Some(&Call::Disconnect(id)));
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut radio = MockRadio::default();
        let (mut mgr, id) = connected(&mut radio);
        assert!(mgr.teardown(&mut radio));
        assert!(!mgr.teardown(&mut radio));
        assert_eq!(radio.count(|c| *c == Call::Disconnect(id)), 1);
    }

    #[test]
    fn disconnect_invalidates_only_the_current_link() {
        let mut radio = MockRadio::default();
        let (mut mgr, id) = connected(&mut radio);
        assert!(!mgr.on_disconnected(ConnectionId(id.0.wrapping_add(5))));
        assert!(mgr.connection().is_some());
        assert!(mgr.on_disconnected(id));
        assert!(mgr.is_idle());
        assert!(!mgr.accepts_notification(id));
        assert!(!mgr.on_disconnected(id));
    }

    #[test]
    fn ids_are_fresh_per_attempt() {
        let mut radio = MockRadio::default();
        let (mut mgr, first) = connected(&mut radio);
        mgr.on_disconnected(first);
        let second = mgr.connect(&mut radio, peer()).unwrap();
        assert_ne!(first, second);
    }
}
