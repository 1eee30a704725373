//! Per-cadence ↔ per-second flux conversion.
//!
//! Task artifacts hold flux in counts per cadence; series exports hold counts
//! per second. The conversion is a pure scaling by the cadence exposure time,
//! which is derived from the spacecraft configuration valid at the cadence:
//!
//! ```text
//! seconds = integrations × (fgsFramesPerIntegration × msPerFgsFrame − msPerReadout) / 1000
//! ```
//!
//! where `integrations` is `integrationsPerShortCadence`, times
//! `shortCadencesPerLongCadence` for long cadence.

use std::path::Path;

use anyhow::Context;

use crate::error::{Error, Result};
use crate::pixel::CadenceType;

/// Spacecraft timing configuration in effect from `mjd` onward.
#[derive(Debug, Clone, PartialEq)]
pub struct SpacecraftConfig {
    pub mjd: f64,
    pub fgs_frames_per_integration: u32,
    pub millis_per_fgs_frame: f64,
    pub millis_per_readout: f64,
    pub integrations_per_short_cadence: u32,
    pub short_cadences_per_long_cadence: u32,
}

impl SpacecraftConfig {
    /// Exposure seconds of one cadence.
    pub fn seconds_per_cadence(&self, cadence_type: CadenceType) -> f64 {
        let integrations = match cadence_type {
            CadenceType::Short => self.integrations_per_short_cadence,
            CadenceType::Long => {
                self.integrations_per_short_cadence * self.short_cadences_per_long_cadence
            }
        };
        let millis_per_integration = f64::from(self.fgs_frames_per_integration)
            * self.millis_per_fgs_frame
            - self.millis_per_readout;
        f64::from(integrations) * millis_per_integration / 1000.0
    }
}

/// Configuration entries ordered by validity start.
#[derive(Debug, Clone, Default)]
pub struct SpacecraftConfigHistory {
    entries: Vec<SpacecraftConfig>,
}

impl SpacecraftConfigHistory {
    pub fn new(mut entries: Vec<SpacecraftConfig>) -> Self {
        entries.sort_by(|a, b| a.mjd.total_cmp(&b.mjd));
        Self { entries }
    }

    /// Load from a CSV file with a header row:
    /// `mjd,fgs_frames_per_integration,millis_per_fgs_frame,millis_per_readout,
    /// integrations_per_short_cadence,short_cadences_per_long_cadence`.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("opening spacecraft config {}", path.display()))?;
        let mut entries = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;
            let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();
            let ctx = || format!("spacecraft config line {}", line + 2);
            entries.push(SpacecraftConfig {
                mjd: field(0).parse().with_context(ctx)?,
                fgs_frames_per_integration: field(1).parse().with_context(ctx)?,
                millis_per_fgs_frame: field(2).parse().with_context(ctx)?,
                millis_per_readout: field(3).parse().with_context(ctx)?,
                integrations_per_short_cadence: field(4).parse().with_context(ctx)?,
                short_cadences_per_long_cadence: field(5).parse().with_context(ctx)?,
            });
        }
        Ok(Self::new(entries))
    }

    /// The latest entry starting at or before `mjd`.
    pub fn valid_at(&self, mjd: f64) -> Option<&SpacecraftConfig> {
        let idx = self.entries.partition_point(|e| e.mjd <= mjd);
        idx.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converter for a cadence at `mjd`.
    pub fn converter(&self, mjd: f64, cadence_type: CadenceType) -> Result<FluxConverter> {
        let config = self.valid_at(mjd).ok_or_else(|| {
            Error::Usage(format!("no spacecraft configuration valid at MJD {mjd}"))
        })?;
        FluxConverter::new(config.seconds_per_cadence(cadence_type))
    }
}

/// Exact linear scaling between per-cadence and per-second flux.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluxConverter {
    seconds_per_cadence: f64,
}

impl FluxConverter {
    pub fn new(seconds_per_cadence: f64) -> Result<Self> {
        if !(seconds_per_cadence.is_finite() && seconds_per_cadence > 0.0) {
            return Err(Error::Usage(format!(
                "cadence duration must be positive, got {seconds_per_cadence}"
            )));
        }
        Ok(Self {
            seconds_per_cadence,
        })
    }

    pub fn seconds_per_cadence(&self) -> f64 {
        self.seconds_per_cadence
    }

    pub fn to_per_second(&self, per_cadence: f32) -> f32 {
        (f64::from(per_cadence) / self.seconds_per_cadence) as f32
    }

    pub fn to_per_cadence(&self, per_second: f32) -> f32 {
        (f64::from(per_second) * self.seconds_per_cadence) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngExt, SeedableRng};

    fn config(mjd: f64) -> SpacecraftConfig {
        SpacecraftConfig {
            mjd,
            fgs_frames_per_integration: 59,
            millis_per_fgs_frame: 103.79,
            millis_per_readout: 518.95,
            integrations_per_short_cadence: 9,
            short_cadences_per_long_cadence: 30,
        }
    }

    #[test]
    fn test_kepler_exposure_times() {
        let c = config(54000.0);
        // 9 × (59 × 103.79 − 518.95) / 1000 = 50.44194 s
        let short = c.seconds_per_cadence(CadenceType::Short);
        let long = c.seconds_per_cadence(CadenceType::Long);
        assert!((short - 50.44194).abs() < 1e-9, "{short}");
        assert!((long - 30.0 * short).abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip_random() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let seconds = 0.1 + rng.random::<f64>() * 2000.0;
            let conv = FluxConverter::new(seconds).unwrap();
            let x = (rng.random::<f32>() - 0.5) * 1.0e6;
            let back = conv.to_per_second(conv.to_per_cadence(x));
            assert!(
                (back - x).abs() <= x.abs() * 1e-6 + 1e-6,
                "{x} -> {back} at {seconds}s"
            );
        }
    }

    #[test]
    fn test_half_second_cadence() {
        let conv = FluxConverter::new(0.5).unwrap();
        assert_eq!(conv.to_per_second(99.5), 199.0);
        assert_eq!(conv.to_per_cadence(199.0), 99.5);
    }

    #[test]
    fn test_invalid_duration() {
        assert!(FluxConverter::new(0.0).is_err());
        assert!(FluxConverter::new(-1.0).is_err());
        assert!(FluxConverter::new(f64::NAN).is_err());
    }

    #[test]
    fn test_history_selection() {
        let mut later = config(55000.0);
        later.integrations_per_short_cadence = 10;
        let h = SpacecraftConfigHistory::new(vec![later, config(54000.0)]);
        assert!(h.valid_at(53999.0).is_none());
        assert_eq!(h.valid_at(54500.0).unwrap().integrations_per_short_cadence, 9);
        assert_eq!(h.valid_at(55000.0).unwrap().integrations_per_short_cadence, 10);
        assert!(h.converter(53000.0, CadenceType::Long).is_err());
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.csv");
        std::fs::write(
            &path,
            "mjd,fgs_frames_per_integration,millis_per_fgs_frame,millis_per_readout,integrations_per_short_cadence,short_cadences_per_long_cadence\n\
             54000.0,59,103.79,518.95,9,30\n",
        )
        .unwrap();
        let h = SpacecraftConfigHistory::load_csv(&path).unwrap();
        assert_eq!(h.valid_at(54001.0), Some(&config(54000.0)));
    }
}
