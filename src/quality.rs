//! Per-cadence quality flag assembly.
//!
//! Bits follow the archive's quality-flag layout. The assembler only decides
//! which conditions hold at a cadence and ORs their bits together; the result
//! is compared against the quality column decoded from the export.

use std::collections::BTreeSet;

use crate::cadence::CadenceRecord;
use crate::pixel::{CosmicRayMap, PixelKey};
use crate::task::{AnomalyCadences, PdcFlags};

pub mod bits {
    pub const ATTITUDE_TWEAK: i32 = 1 << 0;
    pub const SAFE_MODE: i32 = 1 << 1;
    pub const COARSE_POINT: i32 = 1 << 2;
    pub const EARTH_POINT: i32 = 1 << 3;
    pub const ZERO_CROSSING: i32 = 1 << 4;
    pub const DESATURATION: i32 = 1 << 5;
    /// Argabrightening seen on many channels.
    pub const ARGABRIGHTENING: i32 = 1 << 6;
    /// Cosmic ray in the optimal aperture.
    pub const APERTURE_COSMIC: i32 = 1 << 7;
    pub const MANUAL_EXCLUDE: i32 = 1 << 8;
    pub const DISCONTINUITY: i32 = 1 << 9;
    pub const IMPULSIVE_OUTLIER: i32 = 1 << 11;
    /// Argabrightening on this module/output.
    pub const MODOUT_ARGABRIGHTENING: i32 = 1 << 12;
    pub const COLLATERAL_COSMIC: i32 = 1 << 13;
    pub const DETECTOR_ANOMALY: i32 = 1 << 14;
    pub const NOT_FINE_POINT: i32 = 1 << 15;
    pub const DATA_GAP: i32 = 1 << 16;
}

/// Cadence-independent inputs for one target's quality flags.
#[derive(Debug, Clone, Default)]
pub struct QualityFlagAssembler {
    pub optimal_aperture: BTreeSet<PixelKey>,
    pub collateral_cosmic_ray_cadences: BTreeSet<i32>,
    pub anomalies: AnomalyCadences,
    pub pdc: PdcFlags,
}

impl QualityFlagAssembler {
    /// Packed flags at `cadence`, given its cadence record (if known) and the
    /// cosmic rays detected on the target's pixels at that cadence.
    pub fn assemble(
        &self,
        cadence: i32,
        record: Option<&CadenceRecord>,
        cosmic_rays: &CosmicRayMap,
    ) -> i32 {
        let mut flags = 0;
        let mut set = |cond: bool, bit: i32| {
            if cond {
                flags |= bit;
            }
        };

        let gapped = record.is_some_and(|r| r.gapped);
        if let Some(r) = record {
            let f = &r.flags;
            set(f.attitude_tweak, bits::ATTITUDE_TWEAK);
            set(f.safe_mode, bits::SAFE_MODE);
            set(f.coarse_point, bits::COARSE_POINT);
            set(f.earth_point, bits::EARTH_POINT);
            set(f.argabrightening, bits::ARGABRIGHTENING);
            set(f.manual_exclude, bits::MANUAL_EXCLUDE);
            set(f.momentum_dump, bits::DESATURATION);
            set(f.detector_anomaly, bits::DETECTOR_ANOMALY);
            set(!f.fine_point, bits::NOT_FINE_POINT);
            set(r.gapped, bits::DATA_GAP);
        }

        set(
            cosmic_rays
                .keys()
                .any(|k| self.optimal_aperture.contains(k)),
            bits::APERTURE_COSMIC,
        );
        set(
            self.collateral_cosmic_ray_cadences.contains(&cadence),
            bits::COLLATERAL_COSMIC,
        );
        set(
            self.anomalies.argabrightening.contains(&cadence),
            bits::MODOUT_ARGABRIGHTENING,
        );
        set(
            self.anomalies.zero_crossings.contains(&cadence),
            bits::ZERO_CROSSING,
        );
        set(
            !gapped && self.pdc.discontinuities.contains(&cadence),
            bits::DISCONTINUITY,
        );
        set(
            self.pdc.outliers.contains(&cadence),
            bits::IMPULSIVE_OUTLIER,
        );
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadenceFlags;

    fn record(cadence: i32, gapped: bool) -> CadenceRecord {
        CadenceRecord {
            cadence,
            mid_mjd: 55000.0,
            gapped,
            flags: CadenceFlags {
                fine_point: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_quiet_cadence_is_zero() {
        let a = QualityFlagAssembler::default();
        assert_eq!(a.assemble(10, Some(&record(10, false)), &CosmicRayMap::new()), 0);
    }

    #[test]
    fn test_cosmic_ray_only_counts_in_aperture() {
        let a = QualityFlagAssembler {
            optimal_aperture: [PixelKey::pixel(10, 20)].into_iter().collect(),
            ..Default::default()
        };
        let mut crs = CosmicRayMap::new();
        crs.insert(PixelKey::pixel(11, 20), 5.0);
        assert_eq!(a.assemble(1, Some(&record(1, false)), &crs), 0);
        crs.insert(PixelKey::pixel(10, 20), 5.0);
        assert_eq!(
            a.assemble(1, Some(&record(1, false)), &crs),
            bits::APERTURE_COSMIC
        );
    }

    #[test]
    fn test_combined_bits() {
        let mut a = QualityFlagAssembler::default();
        a.collateral_cosmic_ray_cadences.insert(5);
        a.anomalies.argabrightening.insert(5);
        a.anomalies.zero_crossings.insert(5);
        a.pdc.discontinuities.insert(5);
        a.pdc.outliers.insert(5);
        let mut r = record(5, false);
        r.flags.momentum_dump = true;
        r.flags.fine_point = false;
        let got = a.assemble(5, Some(&r), &CosmicRayMap::new());
        assert_eq!(
            got,
            bits::COLLATERAL_COSMIC
                | bits::MODOUT_ARGABRIGHTENING
                | bits::ZERO_CROSSING
                | bits::DISCONTINUITY
                | bits::IMPULSIVE_OUTLIER
                | bits::DESATURATION
                | bits::NOT_FINE_POINT
        );
    }

    #[test]
    fn test_gap_suppresses_discontinuity() {
        let mut a = QualityFlagAssembler::default();
        a.pdc.discontinuities.insert(7);
        let got = a.assemble(7, Some(&record(7, true)), &CosmicRayMap::new());
        assert_eq!(got, bits::DATA_GAP);
    }
}
