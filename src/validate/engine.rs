//! Top-level cross-validation driver.
//!
//! A run is a list of work units, one per module/output and cadence chunk.
//! Every unit builds its own extractors, so each cache lives exactly as long
//! as the unit that filled it. Inside a unit the engine walks categories, then
//! cadences. Per-cadence failures are settled by [`ErrorScope`]: file problems
//! skip the cadence, state inconsistencies count as mismatches, and anything
//! wider abandons the category or the run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::cadence::CadenceTimes;
use crate::error::{Error, ErrorScope, Fetched, Result};
use crate::export::{
    CosmicRayExtractor, PixelValueExtractor, Projection, QualityExtractor, TargetQuality,
};
use crate::flux::{FluxConverter, SpacecraftConfigHistory};
use crate::pixel::{
    BackgroundValue, CosmicRayMap, PixelCategory, PixelKey, PixelValues, ValueTriple,
    MISSING_PIXEL_VALUE,
};
use crate::quality::QualityFlagAssembler;
use crate::task::{AnomalyCadences, PdcFlags, TaskFileExtractor};

use super::compare::{
    check_background_gaps, check_gaps, diff_background, diff_cosmic_rays, diff_values, Fields,
    GapConvention, BACKGROUND_LEGEND, COSMIC_RAY_LEGEND, GAP_LEGEND, QUALITY_LEGEND,
    TRIPLE_LEGEND,
};
use super::options::{Command, ValidationOptions, WorkUnit};
use super::report::{Comparison, ValidationReport};

const HEARTBEAT_CADENCE_COUNT: usize = 500;

const ORIGINAL_LEGEND: &str = "Key\tFITS in (orig, value, unc)\tFITS out (orig, value, unc)";

/// Unwraps a fetch, or logs and counts the skipped cadence and returns.
macro_rules! found_or_skip {
    ($report:expr, $fetched:expr) => {
        match $fetched {
            Fetched::Found(v) => v,
            Fetched::Skipped(e) => {
                warn!("{}", e);
                $report.skipped_cadences += 1;
                return Ok(());
            }
        }
    };
}

fn capitalized(category: PixelCategory) -> String {
    let name = category.name();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Task values shaped like a series export row: original counts from the
/// calibration inputs, calibrated flux less background and cosmic ray, with
/// uncertainties added in quadrature, all per second. Collateral values keep
/// their cosmic rays.
fn series_task_values(
    original: &PixelValues,
    calibrated: &PixelValues,
    cosmic_rays: &CosmicRayMap,
    background: Option<&BTreeMap<PixelKey, BackgroundValue>>,
    converter: &FluxConverter,
    keep: impl Fn(&PixelKey) -> bool,
) -> PixelValues {
    calibrated
        .iter()
        .filter(|(k, _)| keep(k))
        .map(|(k, cal)| {
            let orig = original.get(k).map_or(MISSING_PIXEL_VALUE, |t| t.original);
            // Gapped calibrated values are exported as NaN.
            if cal.is_calibrated_missing() {
                return (*k, ValueTriple::new(orig, f32::NAN, f32::NAN));
            }
            let bkg = background
                .and_then(|b| b.get(k))
                .copied()
                .unwrap_or(BackgroundValue {
                    value: 0.0,
                    uncertainty: 0.0,
                });
            let cr = cosmic_rays
                .get(k)
                .copied()
                .filter(|v| !v.is_nan() && subtracts_cosmic_rays(k))
                .unwrap_or(0.0);
            let value = f64::from(cal.calibrated) - f64::from(bkg.value) - f64::from(cr);
            let uncertainty = f64::from(cal.uncertainty).hypot(f64::from(bkg.uncertainty));
            (
                *k,
                ValueTriple::new(
                    orig,
                    converter.to_per_second(value as f32),
                    converter.to_per_second(uncertainty as f32),
                ),
            )
        })
        .collect()
}

/// Exported collateral values are not cosmic-ray corrected.
fn subtracts_cosmic_rays(key: &PixelKey) -> bool {
    key.as_collateral().is_none()
}

fn subtract_cosmic_rays(values: &mut PixelValues, cosmic_rays: &CosmicRayMap) {
    for (key, delta) in cosmic_rays.iter().filter(|(k, _)| subtracts_cosmic_rays(k)) {
        if let Some(t) = values.get_mut(key) {
            t.calibrated -= delta;
        }
    }
}

fn per_second(cosmic_rays: &CosmicRayMap, converter: &FluxConverter) -> CosmicRayMap {
    cosmic_rays
        .iter()
        .map(|(k, v)| (*k, converter.to_per_second(*v)))
        .collect()
}

/// A category that failed outside the cadence loop is abandoned for the unit
/// and counted once as a mismatch. Run-scoped errors pass through.
fn guard_category(
    report: &mut ValidationReport,
    unit: &WorkUnit,
    category: PixelCategory,
    outcome: Result<()>,
) -> Result<()> {
    match outcome {
        Err(e) if e.scope() != ErrorScope::Run => {
            report.aborted_categories += 1;
            report.record_mismatch(format!(
                "{} pixels on module/output {}/{} abandoned: {}",
                capitalized(category),
                unit.module,
                unit.output,
                e
            ));
            Ok(())
        }
        other => other,
    }
}

// ── Cadence sweep ───────────────────────────────────────────────────────────

struct Sweep<'a> {
    times: &'a CadenceTimes,
    unit: WorkUnit,
    step: usize,
    processed: usize,
}

impl Sweep<'_> {
    fn run(
        &mut self,
        report: &mut ValidationReport,
        mut body: impl FnMut(i32, bool, &mut ValidationReport) -> Result<()>,
    ) -> Result<()> {
        let (start, end) = (self.unit.start_cadence, self.unit.end_cadence);
        for cadence in (start..=end).step_by(self.step) {
            let gapped = self.times.is_gapped(cadence);
            if gapped {
                info!("Detected gapped cadence {cadence} in range {start}-{end}");
            } else {
                debug!("Validating cadence {cadence} in range {start}-{end}");
            }
            if let Err(e) = body(cadence, gapped, report) {
                match e.scope() {
                    ErrorScope::Cadence => {
                        warn!("Skipping cadence {cadence}: {e}");
                        report.skipped_cadences += 1;
                    }
                    ErrorScope::Mismatch => report.record_inconsistency(cadence, &e),
                    ErrorScope::Category | ErrorScope::Run => return Err(e),
                }
            }
            self.processed += 1;
            if self.processed % HEARTBEAT_CADENCE_COUNT == 0 {
                info!("Processed {} cadences", self.processed);
            }
        }
        Ok(())
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// Compares task artifacts with FITS exports over the configured work units.
#[derive(Debug)]
pub struct CrossValidationEngine {
    options: ValidationOptions,
    times: Arc<CadenceTimes>,
    spacecraft: SpacecraftConfigHistory,
}

impl CrossValidationEngine {
    /// Checks the options and that the cadence times cover the run.
    pub fn new(
        options: ValidationOptions,
        times: CadenceTimes,
        spacecraft: SpacecraftConfigHistory,
    ) -> Result<Self> {
        options.validate()?;
        if times.cadence_type != options.cadence_type {
            return Err(Error::Usage(format!(
                "cadence times are {} but the run is {}",
                times.cadence_type, options.cadence_type
            )));
        }
        match (times.start_cadence(), times.end_cadence()) {
            (Some(s), Some(e)) if s <= options.start_cadence && e >= options.end_cadence => {}
            _ => {
                return Err(Error::Usage(format!(
                    "cadence times do not cover {}-{}",
                    options.start_cadence, options.end_cadence
                )))
            }
        }
        if options.command.series_category().is_some() && spacecraft.is_empty() {
            return Err(Error::Usage(
                "flux conversion needs spacecraft configuration".to_string(),
            ));
        }
        Ok(Self {
            options,
            times: Arc::new(times),
            spacecraft,
        })
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Sweeps every work unit and returns the full report. Mismatches never
    /// stop the sweep; the time limit stops it between units.
    pub fn run(&self) -> Result<ValidationReport> {
        let units = self.options.work_units();
        let mut report = ValidationReport::new(self.options.max_errors());
        report.units_total = units.len();
        info!(
            "{}: {} work units, cadences {}-{}",
            self.options.command,
            units.len(),
            self.options.start_cadence,
            self.options.end_cadence
        );

        let started = Instant::now();
        for (i, unit) in units.iter().enumerate() {
            self.run_unit(unit, &mut report)?;
            report.units_completed += 1;
            if let Some(limit) = self.options.time_limit {
                if started.elapsed() > limit && i + 1 < units.len() {
                    info!(
                        "{:.1} minute time limit exceeded",
                        limit.as_secs_f64() / 60.0
                    );
                    report.partial = true;
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Like [`run`](Self::run), but a report with mismatches becomes
    /// [`Error::ValidationFailed`] after it has been logged.
    pub fn validate(&self) -> Result<ValidationReport> {
        let report = self.run()?;
        if report.equals() {
            info!("{}", report);
            Ok(report)
        } else {
            error!("{}", report);
            Err(Error::ValidationFailed {
                errors: report.error_count as u64,
                compared: report.total_compared as u64,
            })
        }
    }

    fn run_unit(&self, unit: &WorkUnit, report: &mut ValidationReport) -> Result<()> {
        let errors_before = report.error_count;
        let mut sweep = Sweep {
            times: &self.times,
            unit: *unit,
            step: self.options.cadence_step(),
            processed: 0,
        };
        match self.options.command {
            Command::PixelsIn => self.pixels_in(&mut sweep, report)?,
            Command::PixelsOut => self.pixels_out(&mut sweep, report)?,
            Command::GapCorrespondence => self.gap_correspondence(&mut sweep, report)?,
            Command::TargetPixels => {
                let outcome = self.target_pixels(&mut sweep, report);
                guard_category(report, unit, PixelCategory::Target, outcome)?;
            }
            Command::BackgroundPixels => {
                self.series_pixels(&mut sweep, report, PixelCategory::Background)?
            }
            Command::CollateralPixels => {
                self.series_pixels(&mut sweep, report, PixelCategory::Collateral)?
            }
            Command::ArpPixels => self.series_pixels(&mut sweep, report, PixelCategory::Arp)?,
        }
        info!(
            "{} {} cadences in range {}-{} for module/output {}/{}",
            if report.error_count == errors_before {
                "Validated"
            } else {
                "Processed"
            },
            sweep.processed,
            unit.start_cadence,
            unit.end_cadence,
            unit.module,
            unit.output
        );
        Ok(())
    }

    // ── Extractor construction ──────────────────────────────────────────────

    fn dir<'a>(&self, dir: &'a Option<std::path::PathBuf>, what: &str) -> Result<&'a Path> {
        dir.as_deref()
            .ok_or_else(|| Error::Usage(format!("{what} not set")))
    }

    fn tasks(&self, unit: &WorkUnit) -> Result<TaskFileExtractor> {
        let root = self.dir(&self.options.task_root, "tasks root directory")?;
        Ok(TaskFileExtractor::new(
            root,
            unit.module,
            unit.output,
            self.options.cadence_type,
            Arc::clone(&self.times),
            self.options.cache_enabled,
        ))
    }

    fn snapshots(&self, dir: &Path, unit: &WorkUnit) -> Result<PixelValueExtractor> {
        let pmrf_dir = self.dir(&self.options.pmrf_dir, "PMRF directory")?;
        Ok(PixelValueExtractor::snapshots(
            dir,
            pmrf_dir,
            unit.module,
            unit.output,
            self.options.cadence_type,
            Arc::clone(&self.times),
        ))
    }

    fn converter(&self, cadence: i32) -> Result<FluxConverter> {
        let mjd = self
            .times
            .mid_mjd(cadence)
            .ok_or_else(|| Error::Usage(format!("no cadence time for cadence {cadence}")))?;
        self.spacecraft.converter(mjd, self.options.cadence_type)
    }

    fn comparison(&self, title: String, legend: &'static str) -> Comparison {
        Comparison::new(title, legend, self.options.max_errors())
    }

    fn diff_originals(
        &self,
        report: &mut ValidationReport,
        category: PixelCategory,
        cadence: i32,
        input: &PixelValues,
        output: &PixelValues,
    ) {
        let mut cmp = self.comparison(
            format!(
                "Original {} pixels differ for cadence {}",
                category.name(),
                cadence
            ),
            ORIGINAL_LEGEND,
        );
        diff_values(&mut cmp, input, output, Fields::Original, self.options.tolerance);
        report.record(cmp);
    }

    // ── Snapshot commands ───────────────────────────────────────────────────

    fn pixels_in(&self, sweep: &mut Sweep<'_>, report: &mut ValidationReport) -> Result<()> {
        let unit = sweep.unit;
        let input_dir = self.dir(&self.options.input_dir, "pixels input directory")?;
        let mut tasks = self.tasks(&unit)?;
        let mut fits = self.snapshots(input_dir, &unit)?;
        let tolerance = self.options.tolerance;

        for &category in PixelCategory::snapshot_categories(self.options.cadence_type) {
            let outcome = sweep.run(report, |cadence, gapped, report| {
                let task = found_or_skip!(report, tasks.original_values(cadence, category)?);
                if gapped {
                    let mut cmp = self.comparison(
                        format!("Unexpected {category} values for gapped cadence {cadence}"),
                        GAP_LEGEND,
                    );
                    check_gaps(&mut cmp, &task, GapConvention::Input);
                    if let Fetched::Found(values) = fits.extract(cadence, category)? {
                        check_gaps(&mut cmp, &values, GapConvention::Input);
                    }
                    report.record(cmp);
                    return Ok(());
                }
                let values = found_or_skip!(report, fits.extract(cadence, category)?);
                let mut cmp = self.comparison(
                    format!("{} pixels differ for cadence {}", capitalized(category), cadence),
                    TRIPLE_LEGEND,
                );
                diff_values(&mut cmp, &task, &values, Fields::Original, tolerance);
                report.record(cmp);
                Ok(())
            });
            guard_category(report, &unit, category, outcome)?;
        }
        Ok(())
    }

    fn pixels_out(&self, sweep: &mut Sweep<'_>, report: &mut ValidationReport) -> Result<()> {
        let unit = sweep.unit;
        let input_dir = self.dir(&self.options.input_dir, "pixels input directory")?;
        let output_dir = self.dir(&self.options.output_dir, "pixels output directory")?;
        let mut tasks = self.tasks(&unit)?;
        let mut fits_in = self.snapshots(input_dir, &unit)?;
        let mut fits_out = self.snapshots(output_dir, &unit)?;
        let mut cosmic = CosmicRayExtractor::snapshots(
            output_dir,
            unit.module,
            unit.output,
            self.options.cadence_type,
            Arc::clone(&self.times),
        );
        let tolerance = self.options.tolerance;

        for &category in PixelCategory::snapshot_categories(self.options.cadence_type) {
            let outcome = sweep.run(report, |cadence, gapped, report| {
                let mut task =
                    found_or_skip!(report, tasks.calibrated_values(cadence, category)?);
                if gapped {
                    let mut cmp = self.comparison(
                        format!("Unexpected {category} values for gapped cadence {cadence}"),
                        GAP_LEGEND,
                    );
                    check_gaps(&mut cmp, &task, GapConvention::Output);
                    report.record(cmp);
                    if let (Fetched::Found(input), Fetched::Found(output)) = (
                        fits_in.extract(cadence, category)?,
                        fits_out.extract(cadence, category)?,
                    ) {
                        self.diff_originals(report, category, cadence, &input, &output);
                    }
                    return Ok(());
                }

                let input = found_or_skip!(report, fits_in.extract(cadence, category)?);
                let output = found_or_skip!(report, fits_out.extract(cadence, category)?);
                let task_crs = found_or_skip!(report, tasks.cosmic_rays(cadence, category)?);
                let fits_crs = found_or_skip!(report, cosmic.extract(cadence, category, None)?);

                self.diff_originals(report, category, cadence, &input, &output);

                subtract_cosmic_rays(&mut task, &task_crs);
                let mut cmp = self.comparison(
                    format!(
                        "Calibrated {} pixels differ for cadence {}",
                        category.name(),
                        cadence
                    ),
                    TRIPLE_LEGEND,
                );
                diff_values(&mut cmp, &task, &output, Fields::Calibrated, tolerance);
                report.record(cmp);

                let mut cmp = self.comparison(
                    format!(
                        "{} cosmic ray events differ for cadence {}",
                        capitalized(category),
                        cadence
                    ),
                    COSMIC_RAY_LEGEND,
                );
                diff_cosmic_rays(&mut cmp, &task_crs, &fits_crs, tolerance);
                report.record(cmp);
                Ok(())
            });
            guard_category(report, &unit, category, outcome)?;
        }
        Ok(())
    }

    fn gap_correspondence(
        &self,
        sweep: &mut Sweep<'_>,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let unit = sweep.unit;
        let input_dir = self.dir(&self.options.input_dir, "pixels input directory")?;
        let output_dir = self.dir(&self.options.output_dir, "pixels output directory")?;
        let mut fits_in = self.snapshots(input_dir, &unit)?;
        let mut fits_out = self.snapshots(output_dir, &unit)?;

        for &category in PixelCategory::snapshot_categories(self.options.cadence_type) {
            let outcome = sweep.run(report, |cadence, gapped, report| {
                let input = fits_in.extract(cadence, category)?;
                let output = fits_out.extract(cadence, category)?;
                match (input, output) {
                    (Fetched::Found(input), Fetched::Found(output)) => {
                        self.diff_originals(report, category, cadence, &input, &output);
                    }
                    (Fetched::Skipped(e), _) | (_, Fetched::Skipped(e)) => {
                        if gapped {
                            debug!("No {category} file for gapped cadence {cadence}: {e}");
                        } else {
                            warn!("{e}");
                            report.skipped_cadences += 1;
                        }
                    }
                }
                Ok(())
            });
            guard_category(report, &unit, category, outcome)?;
        }
        Ok(())
    }

    // ── Series commands ─────────────────────────────────────────────────────

    fn series_pixels(
        &self,
        sweep: &mut Sweep<'_>,
        report: &mut ValidationReport,
        category: PixelCategory,
    ) -> Result<()> {
        let unit = sweep.unit;
        let dir = self.dir(&self.options.output_dir, "pixels output directory")?;
        let mut tasks = self.tasks(&unit)?;
        let ct = self.options.cadence_type;
        let mut fits =
            PixelValueExtractor::series(dir, unit.module, unit.output, ct, Arc::clone(&self.times));
        let mut cosmic =
            CosmicRayExtractor::series(dir, unit.module, unit.output, ct, Arc::clone(&self.times));
        let tolerance = self.options.tolerance;
        // ARP pixels are a subset of the calibrated target pixels.
        let subset = category == PixelCategory::Arp;

        let outcome = sweep.run(report, |cadence, gapped, report| {
            let values = found_or_skip!(report, fits.extract(cadence, category)?);
            let keep = |k: &PixelKey| !subset || values.contains_key(k);
            if gapped {
                let mut cmp = self.comparison(
                    format!("Unexpected gap value(s) in {category} pixels for cadence {cadence}"),
                    GAP_LEGEND,
                );
                check_gaps(&mut cmp, &values, GapConvention::Series);
                if let Fetched::Found(mut task) = tasks.calibrated_values(cadence, category)? {
                    task.retain(|k| keep(k));
                    check_gaps(&mut cmp, &task, GapConvention::Output);
                }
                report.record(cmp);
                return Ok(());
            }

            let converter = self.converter(cadence)?;
            let original = found_or_skip!(report, tasks.original_values(cadence, category)?);
            let calibrated = found_or_skip!(report, tasks.calibrated_values(cadence, category)?);
            let mut task_crs = found_or_skip!(report, tasks.cosmic_rays(cadence, category)?);
            task_crs.retain(|k, _| keep(k));
            let projection = Projection::Keys(values.keys().copied().collect());
            let fits_crs = found_or_skip!(
                report,
                cosmic.extract(cadence, category, subset.then_some(&projection))?
            );

            let task = series_task_values(&original, &calibrated, &task_crs, None, &converter, keep);
            let mut cmp = self.comparison(
                format!("{} pixels differ for cadence {}", capitalized(category), cadence),
                TRIPLE_LEGEND,
            );
            diff_values(&mut cmp, &task, &values, Fields::All, tolerance);
            report.record(cmp);

            let mut cmp = self.comparison(
                format!(
                    "{} cosmic rays differ for cadence {}",
                    capitalized(category),
                    cadence
                ),
                COSMIC_RAY_LEGEND,
            );
            diff_cosmic_rays(&mut cmp, &per_second(&task_crs, &converter), &fits_crs, tolerance);
            report.record(cmp);
            Ok(())
        });
        guard_category(report, &unit, category, outcome)
    }

    fn target_pixels(&self, sweep: &mut Sweep<'_>, report: &mut ValidationReport) -> Result<()> {
        let unit = sweep.unit;
        let dir = self.dir(&self.options.output_dir, "pixels output directory")?;
        let ct = self.options.cadence_type;
        let mut tasks = self.tasks(&unit)?;
        let mut fits =
            PixelValueExtractor::series(dir, unit.module, unit.output, ct, Arc::clone(&self.times));
        let mut cosmic =
            CosmicRayExtractor::series(dir, unit.module, unit.output, ct, Arc::clone(&self.times));
        let mut quality =
            QualityExtractor::new(dir, unit.module, unit.output, ct, Arc::clone(&self.times));

        let targets = quality.extract(
            unit.start_cadence,
            unit.end_cadence,
            PixelCategory::Target,
            self.options.kepler_id,
        )?;
        let anomalies = tasks.anomaly_cadences(unit.start_cadence, unit.end_cadence)?;
        let mut count = 0;
        for target in targets.iter().step_by(self.options.target_step()) {
            let mut extractors = TargetExtractors {
                tasks: &mut tasks,
                fits: &mut fits,
                cosmic: &mut cosmic,
            };
            self.validate_target(sweep, report, target, &anomalies, &mut extractors)?;
            count += 1;
        }
        info!(
            "{} targets on module/output {}/{}",
            count, unit.module, unit.output
        );
        Ok(())
    }

    fn validate_target(
        &self,
        sweep: &mut Sweep<'_>,
        report: &mut ValidationReport,
        target: &TargetQuality,
        anomalies: &AnomalyCadences,
        ex: &mut TargetExtractors<'_>,
    ) -> Result<()> {
        let unit = sweep.unit;
        let tolerance = self.options.tolerance;
        let label = target
            .kepler_id
            .map_or_else(|| "unknown".to_string(), |id| id.to_string());
        ex.fits.set_kepler_id(target.kepler_id);

        let aperture = target.optimal_aperture.iter().filter_map(|k| k.as_pixel());
        let rows = Projection::Rows(aperture.clone().map(|p| p.row).collect());
        let columns = Projection::Columns(aperture.map(|p| p.column).collect());
        let assembler = QualityFlagAssembler {
            optimal_aperture: target.optimal_aperture.clone(),
            collateral_cosmic_ray_cadences: ex.tasks.collateral_cosmic_ray_cadences(
                unit.start_cadence,
                unit.end_cadence,
                |k| rows.admits(k) || columns.admits(k),
            )?,
            anomalies: anomalies.clone(),
            pdc: match target.kepler_id {
                Some(id) => ex
                    .tasks
                    .pdc_flags(id, unit.start_cadence, unit.end_cadence)?,
                None => PdcFlags::default(),
            },
        };

        let mut assembled: BTreeMap<i32, i32> = BTreeMap::new();
        let TargetExtractors {
            tasks,
            fits,
            cosmic,
        } = ex;
        sweep.run(report, |cadence, gapped, report| {
            let values = found_or_skip!(report, fits.extract(cadence, PixelCategory::Target)?);
            let fits_bkg = found_or_skip!(report, fits.extract_background(cadence)?);
            let record = self.times.record(cadence);
            let in_target = |k: &PixelKey| values.contains_key(k);

            if gapped {
                assembled.insert(cadence, assembler.assemble(cadence, record, &CosmicRayMap::new()));
                let mut cmp = self.comparison(
                    format!(
                        "Unexpected gap value(s) for Kepler ID {label} for cadence {cadence}"
                    ),
                    GAP_LEGEND,
                );
                check_gaps(&mut cmp, &values, GapConvention::Series);
                check_background_gaps(&mut cmp, &fits_bkg);
                if let Fetched::Found(mut task) =
                    tasks.calibrated_values(cadence, PixelCategory::Target)?
                {
                    task.retain(|k| in_target(k));
                    check_gaps(&mut cmp, &task, GapConvention::Output);
                }
                report.record(cmp);
                return Ok(());
            }

            let converter = self.converter(cadence)?;
            let original =
                found_or_skip!(report, tasks.original_values(cadence, PixelCategory::Target)?);
            let calibrated =
                found_or_skip!(report, tasks.calibrated_values(cadence, PixelCategory::Target)?);
            let background = found_or_skip!(report, tasks.background(cadence)?);
            let mut task_crs =
                found_or_skip!(report, tasks.cosmic_rays(cadence, PixelCategory::Target)?);
            task_crs.retain(|k, _| in_target(k));
            let projection = Projection::Keys(values.keys().copied().collect());
            let fits_crs = found_or_skip!(
                report,
                cosmic.extract(cadence, PixelCategory::Target, Some(&projection))?
            );
            assembled.insert(cadence, assembler.assemble(cadence, record, &task_crs));

            let task = series_task_values(
                &original,
                &calibrated,
                &task_crs,
                Some(&background),
                &converter,
                in_target,
            );
            let mut cmp = self.comparison(
                format!("Target pixels for Kepler ID {label} differ for cadence {cadence}"),
                TRIPLE_LEGEND,
            );
            diff_values(&mut cmp, &task, &values, Fields::All, tolerance);
            report.record(cmp);

            let task_bkg: BTreeMap<PixelKey, BackgroundValue> = background
                .iter()
                .filter(|(k, _)| in_target(k))
                .map(|(k, b)| {
                    (
                        *k,
                        BackgroundValue {
                            value: converter.to_per_second(b.value),
                            uncertainty: converter.to_per_second(b.uncertainty),
                        },
                    )
                })
                .collect();
            let mut cmp = self.comparison(
                format!("Target background for Kepler ID {label} differs for cadence {cadence}"),
                BACKGROUND_LEGEND,
            );
            diff_background(&mut cmp, &task_bkg, &fits_bkg, tolerance);
            report.record(cmp);

            let mut cmp = self.comparison(
                format!("Target cosmic ray events for Kepler ID {label} differ for cadence {cadence}"),
                COSMIC_RAY_LEGEND,
            );
            diff_cosmic_rays(&mut cmp, &per_second(&task_crs, &converter), &fits_crs, tolerance);
            report.record(cmp);
            Ok(())
        })?;

        let mut cmp = self.comparison(
            format!("Quality flags for Kepler ID {label} differ"),
            QUALITY_LEGEND,
        );
        cmp.count(assembled.len());
        for (cadence, flags) in &assembled {
            match target.flags.get(cadence) {
                Some(fits_flags) if fits_flags == flags => {}
                Some(fits_flags) => cmp.mismatch(|| format!("{cadence}\t{flags}\t{fits_flags}")),
                None => cmp.mismatch(|| format!("{cadence}\t{flags}\tmissing")),
            }
        }
        report.record(cmp);
        Ok(())
    }
}

/// Extractors shared by every target of a work unit.
struct TargetExtractors<'a> {
    tasks: &'a mut TaskFileExtractor,
    fits: &'a mut PixelValueExtractor,
    cosmic: &'a mut CosmicRayExtractor,
}
