//! Internal pipeline task artifacts.
//!
//! Each artifact is one rkyv archive of a [`TaskArtifact`], written by a pipeline
//! stage for one module/output and cadence range. Per-pixel arrays are indexed
//! by `cadence - start_cadence`; anomaly and PDC indices use the same offset.

pub mod extract;
pub mod store;

use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::pixel::{CadenceType, PixelKey};

pub use extract::{AnomalyCadences, PdcFlags, TaskFileExtractor};
pub use store::TaskDirectory;

// ── Stages ──────────────────────────────────────────────────────────────────

/// Pipeline stage that wrote an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Cal,
    Pa,
    Pdc,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Cal => "cal",
            Stage::Pa => "pa",
            Stage::Pdc => "pdc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Inputs,
    Outputs,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Inputs => "inputs",
            Direction::Outputs => "outputs",
        }
    }
}

// ── Artifact contents ───────────────────────────────────────────────────────

/// Identifies what an artifact covers.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub module: i32,
    pub output: i32,
    pub cadence_type: CadenceType,
    pub start_cadence: i32,
    pub end_cadence: i32,
}

impl ArtifactHeader {
    pub fn contains(&self, cadence: i32) -> bool {
        cadence >= self.start_cadence && cadence <= self.end_cadence
    }

    pub fn overlaps(&self, start: i32, end: i32) -> bool {
        self.start_cadence <= end && self.end_cadence >= start
    }

    /// Array index of a cadence.
    pub fn offset(&self, cadence: i32) -> Option<usize> {
        if self.contains(cadence) {
            usize::try_from(cadence - self.start_cadence).ok()
        } else {
            None
        }
    }
}

/// Original (uncalibrated) values of one pixel.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RawSeries {
    pub key: PixelKey,
    pub values: Vec<i32>,
    pub gaps: Vec<bool>,
}

/// Calibrated values and uncertainties of one pixel, per cadence.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CalibratedSeries {
    pub key: PixelKey,
    pub values: Vec<f32>,
    pub uncertainties: Vec<f32>,
    pub gaps: Vec<bool>,
}

/// A cosmic-ray correction detected at one cadence, identified by its
/// mid-exposure MJD.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CosmicRayEvent {
    pub key: PixelKey,
    pub mjd: f64,
    pub delta: f32,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CalInputs {
    pub header: ArtifactHeader,
    pub target_pixels: Vec<RawSeries>,
    pub background_pixels: Vec<RawSeries>,
    pub collateral_pixels: Vec<RawSeries>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CalOutputs {
    pub header: ArtifactHeader,
    pub target_pixels: Vec<CalibratedSeries>,
    pub background_pixels: Vec<CalibratedSeries>,
    /// Collateral outputs; placeholder entries have offset -1.
    pub collateral_pixels: Vec<CalibratedSeries>,
    pub collateral_cosmic_rays: Vec<CosmicRayEvent>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PaOutputs {
    pub header: ArtifactHeader,
    pub target_cosmic_rays: Vec<CosmicRayEvent>,
    pub background_cosmic_rays: Vec<CosmicRayEvent>,
    /// Background estimate at each target pixel.
    pub background: Vec<CalibratedSeries>,
    pub argabrightening_indices: Vec<i32>,
    pub zero_crossing_indices: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PdcTarget {
    pub kepler_id: i32,
    pub discontinuity_indices: Vec<i32>,
    pub outlier_indices: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PdcOutputs {
    pub header: ArtifactHeader,
    pub targets: Vec<PdcTarget>,
}

/// Any artifact a task directory may hold.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum TaskArtifact {
    CalInputs(CalInputs),
    CalOutputs(CalOutputs),
    PaOutputs(PaOutputs),
    PdcOutputs(PdcOutputs),
}

impl TaskArtifact {
    pub fn header(&self) -> &ArtifactHeader {
        match self {
            TaskArtifact::CalInputs(a) => &a.header,
            TaskArtifact::CalOutputs(a) => &a.header,
            TaskArtifact::PaOutputs(a) => &a.header,
            TaskArtifact::PdcOutputs(a) => &a.header,
        }
    }

    pub fn stage(&self) -> (Stage, Direction) {
        match self {
            TaskArtifact::CalInputs(_) => (Stage::Cal, Direction::Inputs),
            TaskArtifact::CalOutputs(_) => (Stage::Cal, Direction::Outputs),
            TaskArtifact::PaOutputs(_) => (Stage::Pa, Direction::Outputs),
            TaskArtifact::PdcOutputs(_) => (Stage::Pdc, Direction::Outputs),
        }
    }

    /// Serialize the artifact using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the artifact to a file using rkyv.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)?;
        info!("Saved task artifact to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load an artifact from an rkyv file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes).map_err(|e| Error::Artifact {
            path: path.to_path_buf(),
            message: format!("rkyv deserialization failed: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::CollateralType;

    fn header() -> ArtifactHeader {
        ArtifactHeader {
            module: 7,
            output: 3,
            cadence_type: CadenceType::Long,
            start_cadence: 100,
            end_cadence: 102,
        }
    }

    #[test]
    fn test_header_offsets() {
        let h = header();
        assert_eq!(h.offset(100), Some(0));
        assert_eq!(h.offset(102), Some(2));
        assert_eq!(h.offset(103), None);
        assert!(h.overlaps(102, 200));
        assert!(!h.overlaps(103, 200));
    }

    #[test]
    fn test_artifact_file_roundtrip() {
        let artifact = TaskArtifact::CalOutputs(CalOutputs {
            header: header(),
            target_pixels: vec![CalibratedSeries {
                key: PixelKey::pixel(10, 20),
                values: vec![1.0, 2.0, 3.0],
                uncertainties: vec![0.1, 0.2, 0.3],
                gaps: vec![false, true, false],
            }],
            background_pixels: vec![],
            collateral_pixels: vec![],
            collateral_cosmic_rays: vec![CosmicRayEvent {
                key: PixelKey::collateral(CollateralType::BlackLevel, 40),
                mjd: 55000.25,
                delta: 3.5,
            }],
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal-outputs-0.bin");
        artifact.save_to_file(&path).unwrap();
        let loaded = TaskArtifact::load_from_file(&path).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.stage(), (Stage::Cal, Direction::Outputs));
    }

    #[test]
    fn test_corrupt_artifact_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal-inputs-0.bin");
        std::fs::write(&path, b"not an archive").unwrap();
        let err = TaskArtifact::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Artifact { .. }));
    }
}
