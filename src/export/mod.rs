//! FITS export side of the comparison.
//!
//! An [`ExportReader`] owns everything cached for one export directory and one
//! module/output: the cadence-range indexes, the PMRF mappings and decoded
//! series files. Extractors each own a reader, so no cache is shared between
//! validation runs.

pub mod cosmic;
pub mod index;
pub mod layout;
pub mod naming;
pub mod pixels;
pub mod pmrf;
pub mod quality;
pub mod series;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use cosmic::{CosmicRayExtractor, Projection};
pub use index::{CadenceFileIndex, FileFamily, FileSelector};
pub use pixels::PixelValueExtractor;
pub use pmrf::{PmrfCategory, PmrfMapping, PmrfMappingResolver};
pub use quality::{QualityExtractor, TargetQuality};
pub use series::SeriesData;

use crate::cadence::CadenceTimes;
use crate::error::{Error, Fetched, Result};
use crate::fits::BinTable;
use crate::pixel::{CadenceType, CollateralType, Pixel, PixelCategory, PixelKey};

use layout::{series_layout, KeyLayout};
use naming::SnapshotKind;

/// Which export family a directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFamily {
    /// One file per cadence and kind, PMRF-mapped.
    Snapshot,
    /// One file per cadence range and target or module/output.
    Series,
}

/// Decode the key columns of a PMRF, cosmic-ray or series pixel-list table.
/// Returns one `(key, target_id)` per table row, in row order.
pub(crate) fn decode_keys(table: &BinTable<'_>, layout: KeyLayout) -> Result<Vec<(PixelKey, i32)>> {
    match layout {
        KeyLayout::Pixel {
            row,
            column,
            optimal_aperture,
        } => {
            let rows = table.read_i32(row)?.values;
            let columns = table.read_i32(column)?.values;
            let optimal = match optimal_aperture {
                Some(i) => Some(table.read_bool(i)?.values),
                None => None,
            };
            Ok(rows
                .iter()
                .zip(&columns)
                .enumerate()
                .map(|(i, (&r, &c))| {
                    let in_aperture = optimal.as_ref().is_some_and(|o| o[i]);
                    (PixelKey::Pixel(Pixel::with_aperture(r, c, in_aperture)), 0)
                })
                .collect())
        }
        KeyLayout::Collateral {
            kind,
            offset,
            target_id,
        } => {
            let kinds = table.read_i32(kind)?.values;
            let offsets = table.read_i32(offset)?.values;
            let targets = match target_id {
                Some(i) => table.read_i32(i)?.values,
                None => vec![0; kinds.len()],
            };
            kinds
                .iter()
                .zip(&offsets)
                .zip(&targets)
                .enumerate()
                .map(|(i, ((&k, &o), &t))| {
                    let kind = CollateralType::from_code(k).ok_or_else(|| {
                        Error::format(table.path(), format!("row {i}: unknown collateral type {k}"))
                    })?;
                    Ok((PixelKey::collateral(kind, o), t))
                })
                .collect()
        }
    }
}

/// Per-instance access to one export directory for one module/output.
#[derive(Debug)]
pub struct ExportReader {
    dir: PathBuf,
    module: i32,
    output: i32,
    cadence_type: CadenceType,
    times: Arc<CadenceTimes>,
    indexes: HashMap<(FileFamily, Option<i32>), BTreeMap<Option<i32>, CadenceFileIndex>>,
    series: HashMap<PathBuf, Arc<SeriesData>>,
}

impl ExportReader {
    pub fn new(
        dir: impl Into<PathBuf>,
        module: i32,
        output: i32,
        cadence_type: CadenceType,
        times: Arc<CadenceTimes>,
    ) -> Self {
        Self {
            dir: dir.into(),
            module,
            output,
            cadence_type,
            times,
            indexes: HashMap::new(),
            series: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn module_output(&self) -> (i32, i32) {
        (self.module, self.output)
    }

    pub fn cadence_type(&self) -> CadenceType {
        self.cadence_type
    }

    pub fn times(&self) -> &CadenceTimes {
        &self.times
    }

    /// Indexes for a family, scanning the directory on first use.
    pub fn indexes(
        &mut self,
        family: FileFamily,
        kepler_id: Option<i32>,
    ) -> Result<&BTreeMap<Option<i32>, CadenceFileIndex>> {
        let key = (family, kepler_id);
        if !self.indexes.contains_key(&key) {
            let selector = FileSelector {
                family,
                cadence_type: self.cadence_type,
                module: self.module,
                output: self.output,
                kepler_id,
            };
            let scanned = CadenceFileIndex::scan(&self.dir, &selector)?;
            self.indexes.insert(key, scanned);
        }
        self.indexes
            .get(&key)
            .ok_or_else(|| Error::StateInconsistency("index cache miss".to_string()))
    }

    /// Snapshot file of `kind` for a cadence.
    pub fn locate_snapshot(&mut self, kind: SnapshotKind, cadence: i32) -> Result<Fetched<PathBuf>> {
        let times = Arc::clone(&self.times);
        let groups = self.indexes(FileFamily::Snapshot(kind), None)?;
        match groups.get(&None) {
            Some(index) => Ok(index.locate(cadence, &times)),
            None => Err(Error::StateInconsistency(format!(
                "snapshot index for {} is grouped by target",
                kind.suffix()
            ))),
        }
    }

    /// Series files of a category covering a cadence, one per target for
    /// target series.
    pub fn locate_series(
        &mut self,
        category: PixelCategory,
        kepler_id: Option<i32>,
        cadence: i32,
    ) -> Result<Vec<(Option<i32>, Fetched<PathBuf>)>> {
        let times = Arc::clone(&self.times);
        let groups = self.indexes(FileFamily::Series(category), kepler_id)?;
        Ok(groups
            .iter()
            .map(|(id, index)| (*id, index.locate(cadence, &times)))
            .collect())
    }

    /// Decoded series file, cached by path.
    pub fn series(&mut self, path: &Path, category: PixelCategory) -> Result<Arc<SeriesData>> {
        if let Some(data) = self.series.get(path) {
            return Ok(Arc::clone(data));
        }
        let data = Arc::new(SeriesData::load(path, series_layout(category))?);
        self.series.insert(path.to_path_buf(), Arc::clone(&data));
        Ok(data)
    }
}
