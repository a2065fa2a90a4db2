//! Recording [`Radio`] for unit tests.

use super::{CharacteristicHandle, ConnectionId, PeerAddress, Radio, ScanParams, Uuid};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    StartScan(ScanParams),
    StopScan,
    Connect(ConnectionId, PeerAddress),
    EnableNotifications(ConnectionId),
    Disconnect(ConnectionId),
}

#[derive(Default)]
pub struct MockRadio {
    pub calls: Vec<Call>,
}

impl MockRadio {
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl Radio for MockRadio {
    fn start_scan(&mut self, params: ScanParams) {
        self.calls.push(Call::StartScan(params));
    }

    fn stop_scan(&mut self) {
        self.calls.push(Call::StopScan);
    }

    fn connect(&mut self, id: ConnectionId, peer: &PeerAddress, _service: Uuid, _characteristic: Uuid) {
        self.calls.push(Call::Connect(id, *peer));
    }

    fn enable_notifications(&mut self, id: ConnectionId, _characteristic: &CharacteristicHandle) {
        self.calls.push(Call::EnableNotifications(id));
    }

    fn disconnect(&mut self, id: ConnectionId) {
        self.calls.push(Call::Disconnect(id));
    }
}
