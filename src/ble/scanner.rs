//! BLE scanner - owns the single discovery session.
//!
//! Reports are pushed in by the controller as they arrive.  The first one
//! that passes the [`AdvertisementFilter`] stops the scan and yields a
//! [`PeerHandle`]; duplicate reports for the same peer that were already in
//! flight when the stop was issued are ignored.

use super::filter::AdvertisementFilter;
use super::{AdvertisementReport, PeerHandle, Radio, ScanParams};

pub struct Scanner {
    filter: AdvertisementFilter,
    scanning: bool,
}

impl Scanner {
    pub const fn new(filter: AdvertisementFilter) -> Self {
        Self {
            filter,
            scanning: false,
        }
    }

    pub fn filter(&self) -> &AdvertisementFilter {
        &self.filter
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Put the radio into discovery mode.  Returns `false` if a scan was
    /// already running (the radio has a single scan session).
    pub fn start<R: Radio>(&mut self, radio: &mut R, duration_ms: u64, active: bool) -> bool {
        if self.scanning {
            return false;
        }
        radio.start_scan(ScanParams {
            duration_ms,
            active,
        });
        self.scanning = true;
        true
    }

    /// Stop discovery.  Safe to call at any time; only the first call after
    /// a `start` reaches the radio.
    pub fn stop<R: Radio>(&mut self, radio: &mut R) -> bool {
        if !self.scanning {
            return false;
        }
        self.scanning = false;
        radio.stop_scan();
        true
    }

    /// Feed one advertisement report.  On a match the scan is stopped and the
    /// peer handed back; reports seen while not scanning are dropped.
    pub fn on_report<R: Radio>(
        &mut self,
        radio: &mut R,
        report: &AdvertisementReport,
    ) -> Option<PeerHandle> {
        if !self.scanning || !self.filter.matches(report) {
            return None;
        }
        self.stop(radio);
        Some(PeerHandle::from_report(report))
    }

    /// The scan window elapsed.  Returns whether a session was actually
    /// running; a timeout racing a match-triggered stop reports `false`.
    pub fn on_timeout(&mut self) -> bool {
        core::mem::replace(&mut self.scanning, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::{Call, MockRadio};
    use crate::ble::{PeerAddress, Uuid};

    const HRS: Uuid = Uuid::Short(0x180D);

    fn scanner() -> Scanner {
        Scanner::new(AdvertisementFilter::new(HRS))
    }

    fn report(last: u8, ad: &[u8]) -> AdvertisementReport {
        AdvertisementReport::from_ad_data(
            PeerAddress {
                addr_type: 0,
                bytes: [last, 0, 0, 0, 0, 0],
            },
            Some(-70),
            ad,
        )
    }

    const HRM_AD: [u8; 9] = [0x03, 0x03, 0x0D, 0x18, 0x04, 0x09, b'H', b'R', b'M'];
    const OTHER_AD: [u8; 4] = [0x03, 0x03, 0x0F, 0x18];

    #[test]
    fn start_requests_scan_once() {
        let mut radio = MockRadio::default();
        let mut s = scanner();
        assert!(s.start(&mut radio, 5_000, true));
        assert!(!s.start(&mut radio, 5_000, true));
        assert_eq!(
            radio.calls,
            [Call::StartScan(ScanParams {
                duration_ms: 5_000,
                active: true
            })]
        );
    }

    #[test]
    fn stop_is_idempotent() {
        let mut radio = MockRadio::default();
        let mut s = scanner();
        assert!(!s.stop(&mut radio));
        s.start(&mut radio, 1_000, false);
        assert!(s.stop(&mut radio));
        assert!(!s.stop(&mut radio));
        assert_eq!(radio.count(|c| *c == Call::StopScan), 1);
    }

    #[test]
    fn non_matching_report_keeps_scanning() {
        let mut radio = MockRadio::default();
        let mut s = scanner();
        s.start(&mut radio, 1_000, true);
        assert!(s.on_report(&mut radio, &report(1, &OTHER_AD)).is_none());
        assert!(s.is_scanning());
        assert_eq!(radio.count(|c| *c == Call::StopScan), 0);
    }

    #[test]
    fn match_stops_exactly_once_despite_duplicates() {
        let mut radio = MockRadio::default();
        let mut s = scanner();
        s.start(&mut radio, 1_000, true);

        let peer = s.on_report(&mut radio, &report(7, &HRM_AD)).unwrap();
        assert_eq!(peer.address.bytes[0], 7);
        assert_eq!(peer.name.as_str(), "HRM");
        assert_eq!(peer.rssi, Some(-70));

        // Same peer again, already queued before the stop took effect.
        assert!(s.on_report(&mut radio, &report(7, &HRM_AD)).is_none());
        assert_eq!(radio.count(|c| *c == Call::StopScan), 1);
    }

    #[test]
    fn timeout_after_match_is_stale() {
        let mut radio = MockRadio::default();
        let mut s = scanner();
        s.start(&mut radio, 1_000, true);
        assert!(s.on_report(&mut radio, &report(7, &HRM_AD)).is_some());
        assert!(!s.is_scanning());

        // The window expiry raced the match; the session is already over.
        assert!(!s.on_timeout());
        assert_eq!(radio.count(|c| *c == Call::StopScan), 1);
    }

    #[test]
    fn second_timeout_is_stale() {
        let mut radio = MockRadio::default();
        let mut s = scanner();
        s.start(&mut radio, 1_000, true);
        assert!(s.on_timeout());
        assert!(!s.is_scanning());
        assert!(!s.on_timeout());
    }
}
