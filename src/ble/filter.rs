//! Advertisement filter - selects peers advertising the target service.

use super::{AdvertisementReport, Uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisementFilter {
    target: Uuid,
}

impl AdvertisementFilter {
    pub const fn new(target: Uuid) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Uuid {
        self.target
    }

    /// True iff the report's advertised services include the target.
    pub fn matches(&self, report: &AdvertisementReport) -> bool {
        report.advertises(&self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::PeerAddress;

    fn report_with(services: &[Uuid]) -> AdvertisementReport {
        let mut report = AdvertisementReport::from_ad_data(
            PeerAddress {
                addr_type: 1,
                bytes: [1, 2, 3, 4, 5, 6],
            },
            Some(-60),
            &[],
        );
        for s in services {
            report.services.push(*s).unwrap();
        }
        report
    }

    #[test]
    fn matches_iff_target_is_advertised() {
        let filter = AdvertisementFilter::new(Uuid::Short(0x180D));
        let cases: [(&[Uuid], bool); 5] = [
            (&[], false),
            (&[Uuid::Short(0x180D)], true),
            (&[Uuid::Short(0x180F)], false),
            (&[Uuid::Short(0x180F), Uuid::Short(0x180D)], true),
            (&[Uuid::Long([0xAB; 16])], false),
        ];
        for (services, expected) in cases {
            assert_eq!(filter.matches(&report_with(services)), expected, "{services:?}");
        }
    }

    #[test]
    fn target_late_in_a_full_advertisement_still_matches() {
        // Flags, then 13 16-bit UUIDs filling a 31-byte PDU.
        let mut ad_data = [0u8; 31];
        ad_data[..5].copy_from_slice(&[0x02, 0x01, 0x06, 27, 0x03]);
        for slot in 0..13u16 {
            let at = 5 + 2 * slot as usize;
            ad_data[at..at + 2].copy_from_slice(&(0x1800 + slot).to_le_bytes());
        }
        let filter = AdvertisementFilter::new(Uuid::Short(0x180D));
        for hrs_at in [8usize, 10, 12] {
            let mut data = ad_data;
            let at = 5 + 2 * hrs_at;
            data[at..at + 2].copy_from_slice(&0x180Du16.to_le_bytes());
            let report = AdvertisementReport::from_ad_data(
                PeerAddress {
                    addr_type: 0,
                    bytes: [9; 6],
                },
                None,
                &data,
            );
            assert!(filter.matches(&report), "target at position {}", hrs_at + 1);
        }
        // And without it, no match.
        let report = AdvertisementReport::from_ad_data(
            PeerAddress {
                addr_type: 0,
                bytes: [9; 6],
            },
            None,
            &ad_data,
        );
        assert!(!filter.matches(&report));
    }

    #[test]
    fn long_form_target_matches_short_advertisement() {
        let filter = AdvertisementFilter::new(Uuid::Long(Uuid::Short(0x180D).to_le_bytes()));
        assert!(filter.matches(&report_with(&[Uuid::Short(0x180D)])));
    }
}
