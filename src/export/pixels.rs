//! Key-addressed pixel values from export files.
//!
//! One extractor serves every category. Snapshot tables are addressed by row
//! index and translated through the category's PMRF; series tables carry their
//! own pixel list. Category differences live in the column layouts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::cadence::CadenceTimes;
use crate::error::{try_found, Error, Fetched, Result};
use crate::fits::FitsFile;
use crate::pixel::{
    BackgroundValue, CadenceType, PixelCategory, PixelKey, PixelValues, ValueTriple,
    FITS_FILL_VALUE,
};

use super::layout::SNAPSHOT_PIXELS;
use super::naming::{cadence_keyword, SnapshotKind};
use super::pmrf::{PmrfCategory, PmrfMappingResolver};
use super::{ExportFamily, ExportReader};

/// Extracts `PixelKey → ValueTriple` maps for one module/output.
#[derive(Debug)]
pub struct PixelValueExtractor {
    reader: ExportReader,
    family: ExportFamily,
    pmrf: PmrfMappingResolver,
    kepler_id: Option<i32>,
}

impl PixelValueExtractor {
    /// Reads per-cadence snapshot files, mapping rows through PMRFs in `pmrf_dir`.
    pub fn snapshots(
        dir: impl Into<PathBuf>,
        pmrf_dir: impl Into<PathBuf>,
        module: i32,
        output: i32,
        cadence_type: CadenceType,
        times: Arc<CadenceTimes>,
    ) -> Self {
        Self {
            reader: ExportReader::new(dir, module, output, cadence_type, times),
            family: ExportFamily::Snapshot,
            pmrf: PmrfMappingResolver::new(pmrf_dir, module, output),
            kepler_id: None,
        }
    }

    /// Reads cadence-series files.
    pub fn series(
        dir: impl Into<PathBuf>,
        module: i32,
        output: i32,
        cadence_type: CadenceType,
        times: Arc<CadenceTimes>,
    ) -> Self {
        let dir = dir.into();
        Self {
            pmrf: PmrfMappingResolver::new(&dir, module, output),
            reader: ExportReader::new(dir, module, output, cadence_type, times),
            family: ExportFamily::Series,
            kepler_id: None,
        }
    }

    /// Restrict target series to one target.
    pub fn with_kepler_id(mut self, kepler_id: Option<i32>) -> Self {
        self.kepler_id = kepler_id;
        self
    }

    pub fn set_kepler_id(&mut self, kepler_id: Option<i32>) {
        self.kepler_id = kepler_id;
    }

    pub fn family(&self) -> ExportFamily {
        self.family
    }

    pub fn dir(&self) -> &Path {
        self.reader.dir()
    }

    pub fn pmrf(&self) -> &PmrfMappingResolver {
        &self.pmrf
    }

    pub fn extract(&mut self, cadence: i32, category: PixelCategory) -> Result<Fetched<PixelValues>> {
        match self.family {
            ExportFamily::Snapshot => self.extract_snapshot(cadence, category),
            ExportFamily::Series => self.extract_series(cadence, category),
        }
    }

    fn extract_snapshot(
        &mut self,
        cadence: i32,
        category: PixelCategory,
    ) -> Result<Fetched<PixelValues>> {
        let cadence_type = self.reader.cadence_type();
        let (module, output) = self.reader.module_output();
        let kind = SnapshotKind::pixels(category)
            .ok_or_else(|| Error::Usage(format!("no {category} snapshot files exist")))?;
        let pmrf_category = PmrfCategory::new(cadence_type, category);
        let keyword = pmrf_category.keyword().ok_or_else(|| {
            Error::Usage(format!("{cadence_type} has no {category} pixels"))
        })?;

        let path = try_found!(self.reader.locate_snapshot(kind, cadence)?);
        let fits = FitsFile::open(&path)?;
        let header_cadence = fits.keyword_i32(0, cadence_keyword(cadence_type))?;
        if header_cadence != cadence {
            return Err(Error::format(
                &path,
                format!("header cadence {header_cadence} does not match requested {cadence}"),
            ));
        }
        let pmrf_name = fits.keyword_str(0, keyword)?;
        let mapping = self.pmrf.resolve(pmrf_category, &pmrf_name)?;

        let table = fits.find_module_output(module, output)?;
        mapping.check_rows(table.rows(), &path)?;
        let original = table.read_i32(SNAPSHOT_PIXELS.original)?.values;
        // Older exports carry only the original column.
        let calibrated = if table.num_columns() > 1 {
            Some((
                table.read_f32(SNAPSHOT_PIXELS.calibrated)?.values,
                table.read_f32(SNAPSHOT_PIXELS.uncertainty)?.values,
            ))
        } else {
            None
        };

        let mut values = PixelValues::new();
        for (i, key, target_id) in mapping.entries() {
            let triple = match &calibrated {
                Some((cal, unc)) => ValueTriple::new(original[i], cal[i], unc[i]),
                None => ValueTriple::new(original[i], FITS_FILL_VALUE, FITS_FILL_VALUE),
            };
            values
                .insert_with_target(*key, triple, target_id)
                .map_err(|e| match e {
                    Error::StateInconsistency(msg) => {
                        Error::StateInconsistency(format!("{}: {}", path.display(), msg))
                    }
                    other => other,
                })?;
        }
        debug!(
            "{} {}: {} values for cadence {}",
            path.display(),
            category,
            values.len(),
            cadence
        );
        Ok(Fetched::Found(values))
    }

    fn extract_series(
        &mut self,
        cadence: i32,
        category: PixelCategory,
    ) -> Result<Fetched<PixelValues>> {
        let located = self.reader.locate_series(category, self.kepler_id, cadence)?;
        let mut values = PixelValues::new();
        let mut found = 0;
        let mut skipped = None;
        for (kepler_id, fetched) in located {
            match fetched {
                Fetched::Found(path) => {
                    let data = self.reader.series(&path, category)?;
                    let row = data.row_for(cadence)?;
                    values.merge(data.values(row)?)?;
                    found += 1;
                }
                Fetched::Skipped(e) => {
                    debug!("Target {:?}: {}", kepler_id, e);
                    skipped = Some(e);
                }
            }
        }
        match (found, skipped) {
            (0, Some(e)) => Ok(Fetched::Skipped(e)),
            _ => Ok(Fetched::Found(values)),
        }
    }

    /// Per-pixel background of target series files at a cadence.
    pub fn extract_background(
        &mut self,
        cadence: i32,
    ) -> Result<Fetched<BTreeMap<PixelKey, BackgroundValue>>> {
        if self.family != ExportFamily::Series {
            return Err(Error::Usage(
                "background values are only exported in target series".to_string(),
            ));
        }
        let located = self
            .reader
            .locate_series(PixelCategory::Target, self.kepler_id, cadence)?;
        let mut out = BTreeMap::new();
        let mut skipped = None;
        for (_, fetched) in located {
            match fetched {
                Fetched::Found(path) => {
                    let data = self.reader.series(&path, PixelCategory::Target)?;
                    let row = data.row_for(cadence)?;
                    out.extend(data.background(row).unwrap_or_default());
                }
                Fetched::Skipped(e) => skipped = Some(e),
            }
        }
        match (out.is_empty(), skipped) {
            (true, Some(e)) => Ok(Fetched::Skipped(e)),
            _ => Ok(Fetched::Found(out)),
        }
    }
}
