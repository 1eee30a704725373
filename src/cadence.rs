//! Externally supplied cadence timing: mid-exposure MJDs, gap indicators and the
//! spacecraft anomaly indicators that feed quality-flag assembly.

use std::path::Path;

use anyhow::{bail, Context};
use chrono::DateTime;

use crate::pixel::CadenceType;

/// Modified Julian Date of the Unix epoch.
const MJD_UNIX_EPOCH: f64 = 40587.0;
const SECONDS_PER_DAY: f64 = 86400.0;
/// Two MJDs closer than this identify the same cadence.
const MJD_MATCH_TOLERANCE: f64 = 1e-9;

/// Per-cadence spacecraft state indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CadenceFlags {
    pub attitude_tweak: bool,
    pub safe_mode: bool,
    pub coarse_point: bool,
    /// Multichannel argabrightening event.
    pub argabrightening: bool,
    pub manual_exclude: bool,
    pub earth_point: bool,
    pub momentum_dump: bool,
    /// SEFI, LDE or SCRC detector electronics event.
    pub detector_anomaly: bool,
    pub fine_point: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CadenceRecord {
    pub cadence: i32,
    pub mid_mjd: f64,
    pub gapped: bool,
    pub flags: CadenceFlags,
}

/// Contiguous run of cadence records.
#[derive(Debug, Clone)]
pub struct CadenceTimes {
    pub cadence_type: CadenceType,
    records: Vec<CadenceRecord>,
}

impl CadenceTimes {
    /// Records must be consecutive cadences in increasing order.
    pub fn new(cadence_type: CadenceType, records: Vec<CadenceRecord>) -> anyhow::Result<Self> {
        for w in records.windows(2) {
            if w[1].cadence != w[0].cadence + 1 {
                bail!(
                    "cadence times are not contiguous: {} follows {}",
                    w[1].cadence,
                    w[0].cadence
                );
            }
        }
        Ok(Self {
            cadence_type,
            records,
        })
    }

    /// Load cadence times from a CSV file with a header row:
    /// `cadence,mid_mjd,gap,attitude_tweak,safe_mode,coarse_point,argabrightening,
    /// exclude,earth_point,momentum_dump,detector_anomaly,fine_point`.
    pub fn load_csv<P: AsRef<Path>>(path: P, cadence_type: CadenceType) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("opening cadence times {}", path.display()))?;
        let mut records = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;
            let field = |i: usize| record.get(i).unwrap_or("").trim();
            let flag = |i: usize| matches!(field(i), "1" | "true" | "TRUE" | "T");
            let cadence: i32 = field(0)
                .parse()
                .with_context(|| format!("cadence times line {}: bad cadence", line + 2))?;
            let mid_mjd: f64 = field(1)
                .parse()
                .with_context(|| format!("cadence times line {}: bad mjd", line + 2))?;
            records.push(CadenceRecord {
                cadence,
                mid_mjd,
                gapped: flag(2),
                flags: CadenceFlags {
                    attitude_tweak: flag(3),
                    safe_mode: flag(4),
                    coarse_point: flag(5),
                    argabrightening: flag(6),
                    manual_exclude: flag(7),
                    earth_point: flag(8),
                    momentum_dump: flag(9),
                    detector_anomaly: flag(10),
                    fine_point: flag(11),
                },
            });
        }
        Self::new(cadence_type, records)
    }

    pub fn start_cadence(&self) -> Option<i32> {
        self.records.first().map(|r| r.cadence)
    }

    pub fn end_cadence(&self) -> Option<i32> {
        self.records.last().map(|r| r.cadence)
    }

    pub fn record(&self, cadence: i32) -> Option<&CadenceRecord> {
        let first = self.start_cadence()?;
        let idx = usize::try_from(cadence.checked_sub(first)?).ok()?;
        self.records.get(idx)
    }

    /// Cadences outside the table are treated as not gapped.
    pub fn is_gapped(&self, cadence: i32) -> bool {
        self.record(cadence).is_some_and(|r| r.gapped)
    }

    pub fn mid_mjd(&self, cadence: i32) -> Option<f64> {
        self.record(cadence).map(|r| r.mid_mjd)
    }

    /// Cadence whose mid-exposure MJD equals `mjd`.
    pub fn cadence_for_mjd(&self, mjd: f64) -> Option<i32> {
        let idx = self
            .records
            .partition_point(|r| r.mid_mjd < mjd - MJD_MATCH_TOLERANCE);
        self.records
            .get(idx)
            .filter(|r| (r.mid_mjd - mjd).abs() <= MJD_MATCH_TOLERANCE)
            .map(|r| r.cadence)
    }

    /// Approximate `yyyyDDDHHmmss` timestamp of a cadence, for diagnostics.
    pub fn timestamp(&self, cadence: i32) -> String {
        match self.mid_mjd(cadence) {
            Some(mjd) => mjd_to_timestamp(mjd),
            None => "unknown".to_string(),
        }
    }
}

/// Format an MJD as the `yyyyDDDHHmmss` UTC stamp used in export filenames.
pub fn mjd_to_timestamp(mjd: f64) -> String {
    let millis = ((mjd - MJD_UNIX_EPOCH) * SECONDS_PER_DAY * 1000.0).round() as i64;
    match DateTime::from_timestamp_millis(millis) {
        Some(t) => t.format("%Y%j%H%M%S").to_string(),
        None => format!("mjd {mjd}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times() -> CadenceTimes {
        let records = (0..5)
            .map(|i| CadenceRecord {
                cadence: 1000 + i,
                mid_mjd: 55000.0 + f64::from(i) * 0.02,
                gapped: i == 2,
                flags: CadenceFlags::default(),
            })
            .collect();
        CadenceTimes::new(CadenceType::Long, records).unwrap()
    }

    #[test]
    fn test_mjd_to_timestamp() {
        // MJD 55000.5 is 2009-06-18 12:00:00 UTC, day of year 169
        assert_eq!(mjd_to_timestamp(55000.5), "2009169120000");
        assert_eq!(mjd_to_timestamp(MJD_UNIX_EPOCH), "1970001000000");
    }

    #[test]
    fn test_lookup_and_gaps() {
        let t = times();
        assert_eq!(t.start_cadence(), Some(1000));
        assert_eq!(t.end_cadence(), Some(1004));
        assert!(t.is_gapped(1002));
        assert!(!t.is_gapped(1003));
        assert!(!t.is_gapped(999));
        assert_eq!(t.cadence_for_mjd(55000.04), Some(1002));
        assert_eq!(t.cadence_for_mjd(55000.05), None);
    }

    #[test]
    fn test_non_contiguous_rejected() {
        let records = vec![
            CadenceRecord {
                cadence: 1,
                mid_mjd: 1.0,
                gapped: false,
                flags: CadenceFlags::default(),
            },
            CadenceRecord {
                cadence: 3,
                mid_mjd: 2.0,
                gapped: false,
                flags: CadenceFlags::default(),
            },
        ];
        assert!(CadenceTimes::new(CadenceType::Short, records).is_err());
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("times.csv");
        std::fs::write(
            &path,
            "cadence,mid_mjd,gap,attitude_tweak,safe_mode,coarse_point,argabrightening,exclude,earth_point,momentum_dump,detector_anomaly,fine_point\n\
             10,55000.0,0,0,0,0,0,0,0,1,0,1\n\
             11,55000.02,1,0,0,0,0,0,0,0,0,0\n",
        )
        .unwrap();
        let t = CadenceTimes::load_csv(&path, CadenceType::Long).unwrap();
        let r = t.record(10).unwrap();
        assert!(r.flags.momentum_dump);
        assert!(r.flags.fine_point);
        assert!(t.is_gapped(11));
    }
}
