//! Run configuration and work-unit planning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::pixel::{CadenceType, PixelCategory};

/// CCD modules populated on the focal plane; the corner modules 1, 5, 21
/// and 25 are absent.
const MODULES: [i32; 21] = [
    2, 3, 4, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 22, 23, 24,
];
const OUTPUTS_PER_MODULE: i32 = 4;

/// What a run compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Calibration inputs against input pixel snapshots (original values).
    PixelsIn,
    /// Calibration outputs against output pixel snapshots, including cosmic
    /// rays and input/output gap correspondence.
    PixelsOut,
    /// Input snapshots against output snapshots (original values only).
    GapCorrespondence,
    TargetPixels,
    BackgroundPixels,
    CollateralPixels,
    ArpPixels,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::PixelsIn => "validate-pixels-in",
            Command::PixelsOut => "validate-pixels-out",
            Command::GapCorrespondence => "validate-gap-correspondence",
            Command::TargetPixels => "validate-target-pixels",
            Command::BackgroundPixels => "validate-background-pixels",
            Command::CollateralPixels => "validate-collateral-pixels",
            Command::ArpPixels => "validate-arp-pixels",
        }
    }

    /// Series category compared by the per-category commands.
    pub fn series_category(self) -> Option<PixelCategory> {
        match self {
            Command::TargetPixels => Some(PixelCategory::Target),
            Command::BackgroundPixels => Some(PixelCategory::Background),
            Command::CollateralPixels => Some(PixelCategory::Collateral),
            Command::ArpPixels => Some(PixelCategory::Arp),
            _ => None,
        }
    }

    fn needs_input_dir(self) -> bool {
        matches!(
            self,
            Command::PixelsIn | Command::PixelsOut | Command::GapCorrespondence
        )
    }

    fn needs_output_dir(self) -> bool {
        !matches!(self, Command::PixelsIn)
    }

    fn needs_pmrf_dir(self) -> bool {
        self.needs_input_dir()
    }

    fn needs_task_root(self) -> bool {
        !matches!(self, Command::GapCorrespondence)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One (module, output, cadence range) slice of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub module: i32,
    pub output: i32,
    pub start_cadence: i32,
    pub end_cadence: i32,
}

// ── Options ─────────────────────────────────────────────────────────────────

/// Parameters of a validation run.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub command: Command,
    /// Default: long cadence.
    pub cadence_type: CadenceType,
    /// CCD module. None together with `output` = every module/output.
    pub module: Option<i32>,
    /// CCD output (1-4). Must be set exactly when `module` is.
    pub output: Option<i32>,
    pub start_cadence: i32,
    pub end_cadence: i32,
    /// Input pixel snapshot directory.
    pub input_dir: Option<PathBuf>,
    /// Output pixel snapshot directory, or the series directory for the
    /// per-category commands.
    pub output_dir: Option<PathBuf>,
    pub pmrf_dir: Option<PathBuf>,
    pub task_root: Option<PathBuf>,
    /// Absolute tolerance for float comparisons, inclusive. Default 1e-6.
    pub tolerance: f64,
    /// Detail lines kept in the report. Default: 20.
    pub max_errors_displayed: i32,
    /// Cadences skipped between compared cadences. Default: 0.
    pub skip_count: i32,
    /// Targets skipped between compared targets. Default: 0.
    pub target_skip_count: i32,
    /// Cadences per work unit. Must be at least `skip_count`. Default: 1000.
    pub chunk_size: i32,
    /// Wall-clock budget, checked after each work unit. None = unlimited.
    pub time_limit: Option<Duration>,
    /// Keep decoded task artifacts for the length of a work unit. Default: true.
    pub cache_enabled: bool,
    /// Restrict target series to one Kepler id.
    pub kepler_id: Option<i32>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            command: Command::PixelsIn,
            cadence_type: CadenceType::Long,
            module: None,
            output: None,
            start_cadence: 0,
            end_cadence: 0,
            input_dir: None,
            output_dir: None,
            pmrf_dir: None,
            task_root: None,
            tolerance: 1e-6,
            max_errors_displayed: 20,
            skip_count: 0,
            target_skip_count: 0,
            chunk_size: 1000,
            time_limit: None,
            cache_enabled: true,
            kepler_id: None,
        }
    }
}

fn require_dir<'a>(dir: &'a Option<PathBuf>, what: &str) -> Result<&'a Path> {
    let dir = dir
        .as_deref()
        .ok_or_else(|| Error::Usage(format!("{what} not set")))?;
    if !dir.is_dir() {
        return Err(Error::Usage(format!("can't read {what} {}", dir.display())));
    }
    Ok(dir)
}

impl ValidationOptions {
    /// Usage checks. Runs before any cadence is touched.
    pub fn validate(&self) -> Result<()> {
        if self.start_cadence < 0 {
            return Err(Error::Usage("start cadence can't be negative".into()));
        }
        if self.start_cadence > self.end_cadence {
            return Err(Error::Usage(format!(
                "cadence range {}-{} is inverted",
                self.start_cadence, self.end_cadence
            )));
        }
        match (self.module, self.output) {
            (Some(_), None) => return Err(Error::Usage("CCD output not set".into())),
            (None, Some(_)) => return Err(Error::Usage("CCD module not set".into())),
            (Some(m), Some(o)) => {
                if !MODULES.contains(&m) {
                    return Err(Error::Usage(format!("no CCD module {m}")));
                }
                if !(1..=OUTPUTS_PER_MODULE).contains(&o) {
                    return Err(Error::Usage(format!("no CCD output {o}")));
                }
            }
            (None, None) => {}
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::Usage(format!("invalid tolerance {}", self.tolerance)));
        }
        if self.max_errors_displayed < 0 {
            return Err(Error::Usage("max errors displayed can't be negative".into()));
        }
        if self.skip_count < 0 {
            return Err(Error::Usage("skip count can't be negative".into()));
        }
        if self.target_skip_count < 0 {
            return Err(Error::Usage("target skip count can't be negative".into()));
        }
        if self.chunk_size <= 0 || self.chunk_size < self.skip_count {
            return Err(Error::Usage(
                "chunk size must be positive and at least the skip count".into(),
            ));
        }
        if self.command.series_category() == Some(PixelCategory::Background)
            && self.cadence_type == CadenceType::Short
        {
            return Err(Error::Usage("short cadence has no background pixels".into()));
        }

        if self.command.needs_input_dir() {
            require_dir(&self.input_dir, "pixels input directory")?;
        }
        if self.command.needs_output_dir() {
            require_dir(&self.output_dir, "pixels output directory")?;
        }
        if self.command.needs_pmrf_dir() {
            require_dir(&self.pmrf_dir, "PMRF directory")?;
        }
        if self.command.needs_task_root() {
            require_dir(&self.task_root, "tasks root directory")?;
        }
        Ok(())
    }

    /// Module/output pairs covered by the run.
    pub fn module_outputs(&self) -> Vec<(i32, i32)> {
        match (self.module, self.output) {
            (Some(m), Some(o)) => vec![(m, o)],
            _ => MODULES
                .iter()
                .flat_map(|&m| (1..=OUTPUTS_PER_MODULE).map(move |o| (m, o)))
                .collect(),
        }
    }

    /// The run split into chunks of `chunk_size` cadences per module/output.
    pub fn work_units(&self) -> Vec<WorkUnit> {
        let chunk = self.chunk_size.max(1);
        let mut units = Vec::new();
        for (module, output) in self.module_outputs() {
            let mut start = self.start_cadence;
            while start <= self.end_cadence {
                let end = start.saturating_add(chunk - 1).min(self.end_cadence);
                units.push(WorkUnit {
                    module,
                    output,
                    start_cadence: start,
                    end_cadence: end,
                });
                if end == i32::MAX {
                    break;
                }
                start = end + 1;
            }
        }
        units
    }

    /// Cadence stride inside a work unit.
    pub fn cadence_step(&self) -> usize {
        self.skip_count.max(0) as usize + 1
    }

    /// Target stride for target series.
    pub fn target_step(&self) -> usize {
        self.target_skip_count.max(0) as usize + 1
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors_displayed.max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ValidationOptions {
        ValidationOptions {
            command: Command::GapCorrespondence,
            start_cadence: 100,
            end_cadence: 349,
            module: Some(2),
            output: Some(1),
            input_dir: Some(std::env::temp_dir()),
            output_dir: Some(std::env::temp_dir()),
            pmrf_dir: Some(std::env::temp_dir()),
            chunk_size: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_work_units_chunk_range() {
        let units = opts().work_units();
        let ranges: Vec<(i32, i32)> = units
            .iter()
            .map(|u| (u.start_cadence, u.end_cadence))
            .collect();
        assert_eq!(ranges, vec![(100, 199), (200, 299), (300, 349)]);
    }

    #[test]
    fn test_all_module_outputs() {
        let o = ValidationOptions {
            module: None,
            output: None,
            ..opts()
        };
        let mo = o.module_outputs();
        assert_eq!(mo.len(), 84);
        assert!(!mo.contains(&(5, 1)));
        assert!(mo.contains(&(24, 4)));
    }

    #[test]
    fn test_usage_checks() {
        assert!(opts().validate().is_ok());

        let inverted = ValidationOptions {
            start_cadence: 10,
            end_cadence: 5,
            ..opts()
        };
        assert!(matches!(inverted.validate(), Err(Error::Usage(_))));

        let half = ValidationOptions {
            output: None,
            ..opts()
        };
        assert!(matches!(half.validate(), Err(Error::Usage(m)) if m.contains("output")));

        let negative = ValidationOptions {
            skip_count: -1,
            ..opts()
        };
        assert!(negative.validate().is_err());

        let chunk = ValidationOptions {
            skip_count: 10,
            chunk_size: 5,
            ..opts()
        };
        assert!(chunk.validate().is_err());

        let missing = ValidationOptions {
            pmrf_dir: None,
            ..opts()
        };
        assert!(matches!(missing.validate(), Err(Error::Usage(m)) if m.contains("PMRF")));

        let unreadable = ValidationOptions {
            input_dir: Some(PathBuf::from("/nonexistent/fitscheck")),
            ..opts()
        };
        assert!(unreadable.validate().is_err());
    }

    #[test]
    fn test_strides() {
        let o = ValidationOptions {
            skip_count: 2,
            target_skip_count: 1,
            ..opts()
        };
        assert_eq!(o.cadence_step(), 3);
        assert_eq!(o.target_step(), 2);
    }
}
