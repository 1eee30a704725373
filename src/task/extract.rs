//! Key-addressed values from task artifacts, shaped like the export extractors'
//! output so both sides can be diffed directly.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cadence::CadenceTimes;
use crate::error::{Error, Fetched, Result};
use crate::pixel::{
    insert_cosmic_ray, BackgroundValue, CadenceType, CosmicRayMap, PixelCategory, PixelKey,
    PixelValues, ValueTriple, FITS_FILL_VALUE,
};

use super::store::TaskDirectory;
use super::{
    ArtifactHeader, CalibratedSeries, CosmicRayEvent, Direction, RawSeries, Stage, TaskArtifact,
};

/// MJD tolerance when matching cosmic-ray events to cadences.
const EVENT_MJD_TOLERANCE: f64 = 1e-9;

/// Spacecraft anomaly cadences reported by PA.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnomalyCadences {
    pub argabrightening: BTreeSet<i32>,
    pub zero_crossings: BTreeSet<i32>,
}

/// PDC flags of one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdcFlags {
    pub discontinuities: BTreeSet<i32>,
    pub outliers: BTreeSet<i32>,
}

fn is_placeholder(key: &PixelKey) -> bool {
    key.as_collateral().is_some_and(|c| c.offset == -1)
}

/// Cadences `start + index` for indices that land at or after `start`.
fn indices_to_cadences<'a>(
    header: &'a ArtifactHeader,
    indices: &'a [i32],
    start: i32,
    end: i32,
) -> impl Iterator<Item = i32> + 'a {
    indices
        .iter()
        .filter(|&&i| i >= 0)
        .map(move |&i| header.start_cadence + i)
        .filter(move |&c| c >= start && c <= end && c <= header.end_cadence)
}

/// Extracts task-side values for one module/output.
#[derive(Debug)]
pub struct TaskFileExtractor {
    tasks: TaskDirectory,
    module: i32,
    output: i32,
    cadence_type: CadenceType,
    times: Arc<CadenceTimes>,
}

impl TaskFileExtractor {
    pub fn new(
        root: impl Into<PathBuf>,
        module: i32,
        output: i32,
        cadence_type: CadenceType,
        times: Arc<CadenceTimes>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            tasks: TaskDirectory::new(root, cache_enabled),
            module,
            output,
            cadence_type,
            times,
        }
    }

    pub fn tasks(&self) -> &TaskDirectory {
        &self.tasks
    }

    fn artifacts(
        &mut self,
        stage: Stage,
        direction: Direction,
        start: i32,
        end: i32,
    ) -> Result<Vec<Arc<TaskArtifact>>> {
        let (module, output, cadence_type) = (self.module, self.output, self.cadence_type);
        self.tasks.find(stage, direction, |h| {
            h.module == module
                && h.output == output
                && h.cadence_type == cadence_type
                && h.overlaps(start, end)
        })
    }

    fn missing(&self, stage: Stage, direction: Direction, cadence: i32) -> Error {
        Error::FileAccess {
            kind: format!("{}-{}", stage.name(), direction.name()),
            dir: self.tasks.root().to_path_buf(),
            cadence,
            timestamp: self.times.timestamp(cadence),
        }
    }

    /// Original values from calibration inputs. Gapped pixels carry
    /// `MISSING_PIXEL_VALUE` with fill-valued calibrated fields.
    pub fn original_values(
        &mut self,
        cadence: i32,
        category: PixelCategory,
    ) -> Result<Fetched<PixelValues>> {
        let artifacts = self.artifacts(Stage::Cal, Direction::Inputs, cadence, cadence)?;
        if artifacts.is_empty() {
            return Ok(Fetched::Skipped(self.missing(
                Stage::Cal,
                Direction::Inputs,
                cadence,
            )));
        }
        let mut values = PixelValues::new();
        for artifact in &artifacts {
            let TaskArtifact::CalInputs(inputs) = artifact.as_ref() else {
                continue;
            };
            let Some(idx) = inputs.header.offset(cadence) else {
                continue;
            };
            let series: &[RawSeries] = match category {
                PixelCategory::Target | PixelCategory::Arp => &inputs.target_pixels,
                PixelCategory::Background => &inputs.background_pixels,
                PixelCategory::Collateral => &inputs.collateral_pixels,
            };
            let mut cadence_values = PixelValues::new();
            for s in series {
                if is_placeholder(&s.key) {
                    continue;
                }
                let triple = match (s.gaps.get(idx), s.values.get(idx)) {
                    (Some(true), _) | (None, _) | (_, None) => ValueTriple::gapped_input(),
                    (Some(false), Some(&v)) => ValueTriple::original_only(v),
                };
                cadence_values.insert(s.key.normalized(), triple)?;
            }
            values.merge(cadence_values)?;
        }
        Ok(Fetched::Found(values))
    }

    /// Calibrated values and uncertainties from calibration outputs. Gapped
    /// pixels carry `MISSING_CAL_PIXEL_VALUE`; the original field is fill.
    pub fn calibrated_values(
        &mut self,
        cadence: i32,
        category: PixelCategory,
    ) -> Result<Fetched<PixelValues>> {
        let artifacts = self.artifacts(Stage::Cal, Direction::Outputs, cadence, cadence)?;
        if artifacts.is_empty() {
            return Ok(Fetched::Skipped(self.missing(
                Stage::Cal,
                Direction::Outputs,
                cadence,
            )));
        }
        let mut values = PixelValues::new();
        for artifact in &artifacts {
            let TaskArtifact::CalOutputs(outputs) = artifact.as_ref() else {
                continue;
            };
            let Some(idx) = outputs.header.offset(cadence) else {
                continue;
            };
            let series: &[CalibratedSeries] = match category {
                PixelCategory::Target | PixelCategory::Arp => &outputs.target_pixels,
                PixelCategory::Background => &outputs.background_pixels,
                PixelCategory::Collateral => &outputs.collateral_pixels,
            };
            let mut cadence_values = PixelValues::new();
            for s in series {
                if is_placeholder(&s.key) {
                    debug!("Skipping placeholder {} in {}", s.key, category);
                    continue;
                }
                let triple = match (s.gaps.get(idx), s.values.get(idx), s.uncertainties.get(idx))
                {
                    (Some(false), Some(&v), Some(&u)) => {
                        ValueTriple::new(FITS_FILL_VALUE as i32, v, u)
                    }
                    _ => ValueTriple::gapped_output(),
                };
                cadence_values.insert(s.key.normalized(), triple)?;
            }
            values.merge(cadence_values)?;
        }
        Ok(Fetched::Found(values))
    }

    /// Cosmic-ray corrections at a cadence: PA for target and background
    /// pixels, calibration outputs for collateral.
    pub fn cosmic_rays(
        &mut self,
        cadence: i32,
        category: PixelCategory,
    ) -> Result<Fetched<CosmicRayMap>> {
        let (stage, direction) = match category {
            PixelCategory::Collateral => (Stage::Cal, Direction::Outputs),
            _ => (Stage::Pa, Direction::Outputs),
        };
        let Some(mjd) = self.times.mid_mjd(cadence) else {
            return Ok(Fetched::Skipped(self.missing(stage, direction, cadence)));
        };
        let artifacts = self.artifacts(stage, direction, cadence, cadence)?;
        if artifacts.is_empty() {
            return Ok(Fetched::Skipped(self.missing(stage, direction, cadence)));
        }
        let mut map = CosmicRayMap::new();
        for artifact in &artifacts {
            let events: &[CosmicRayEvent] = match (artifact.as_ref(), category) {
                (TaskArtifact::CalOutputs(o), PixelCategory::Collateral) => {
                    &o.collateral_cosmic_rays
                }
                (TaskArtifact::PaOutputs(o), PixelCategory::Background) => {
                    &o.background_cosmic_rays
                }
                (TaskArtifact::PaOutputs(o), PixelCategory::Target | PixelCategory::Arp) => {
                    &o.target_cosmic_rays
                }
                _ => continue,
            };
            for e in events
                .iter()
                .filter(|e| (e.mjd - mjd).abs() <= EVENT_MJD_TOLERANCE)
            {
                insert_cosmic_ray(&mut map, e.key.normalized(), e.delta)?;
            }
        }
        Ok(Fetched::Found(map))
    }

    /// PA background estimate at each target pixel.
    pub fn background(&mut self, cadence: i32) -> Result<Fetched<BTreeMap<PixelKey, BackgroundValue>>> {
        let artifacts = self.artifacts(Stage::Pa, Direction::Outputs, cadence, cadence)?;
        if artifacts.is_empty() {
            return Ok(Fetched::Skipped(self.missing(
                Stage::Pa,
                Direction::Outputs,
                cadence,
            )));
        }
        let mut out = BTreeMap::new();
        for artifact in &artifacts {
            let TaskArtifact::PaOutputs(pa) = artifact.as_ref() else {
                continue;
            };
            let Some(idx) = pa.header.offset(cadence) else {
                continue;
            };
            for s in &pa.background {
                if let (Some(false), Some(&value), Some(&uncertainty)) =
                    (s.gaps.get(idx), s.values.get(idx), s.uncertainties.get(idx))
                {
                    out.insert(s.key, BackgroundValue { value, uncertainty });
                }
            }
        }
        Ok(Fetched::Found(out))
    }

    /// Cadences in `[start, end]` with a collateral cosmic ray on an admitted key.
    pub fn collateral_cosmic_ray_cadences(
        &mut self,
        start: i32,
        end: i32,
        admit: impl Fn(&PixelKey) -> bool,
    ) -> Result<BTreeSet<i32>> {
        let artifacts = self.artifacts(Stage::Cal, Direction::Outputs, start, end)?;
        let mut out = BTreeSet::new();
        for artifact in &artifacts {
            if let TaskArtifact::CalOutputs(o) = artifact.as_ref() {
                out.extend(
                    o.collateral_cosmic_rays
                        .iter()
                        .filter(|e| admit(&e.key.normalized()))
                        .filter_map(|e| self.times.cadence_for_mjd(e.mjd))
                        .filter(|&c| c >= start && c <= end),
                );
            }
        }
        Ok(out)
    }

    /// Argabrightening and reaction-wheel zero-crossing cadences in `[start, end]`.
    pub fn anomaly_cadences(&mut self, start: i32, end: i32) -> Result<AnomalyCadences> {
        let artifacts = self.artifacts(Stage::Pa, Direction::Outputs, start, end)?;
        let mut out = AnomalyCadences::default();
        for artifact in &artifacts {
            if let TaskArtifact::PaOutputs(pa) = artifact.as_ref() {
                out.argabrightening.extend(indices_to_cadences(
                    &pa.header,
                    &pa.argabrightening_indices,
                    start,
                    end,
                ));
                out.zero_crossings.extend(indices_to_cadences(
                    &pa.header,
                    &pa.zero_crossing_indices,
                    start,
                    end,
                ));
            }
        }
        Ok(out)
    }

    /// PDC discontinuity and outlier cadences of one target in `[start, end]`.
    pub fn pdc_flags(&mut self, kepler_id: i32, start: i32, end: i32) -> Result<PdcFlags> {
        let artifacts = self.artifacts(Stage::Pdc, Direction::Outputs, start, end)?;
        let mut out = PdcFlags::default();
        for artifact in &artifacts {
            let TaskArtifact::PdcOutputs(pdc) = artifact.as_ref() else {
                continue;
            };
            for target in pdc.targets.iter().filter(|t| t.kepler_id == kepler_id) {
                out.discontinuities.extend(indices_to_cadences(
                    &pdc.header,
                    &target.discontinuity_indices,
                    start,
                    end,
                ));
                out.outliers.extend(indices_to_cadences(
                    &pdc.header,
                    &target.outlier_indices,
                    start,
                    end,
                ));
            }
        }
        Ok(out)
    }
}
