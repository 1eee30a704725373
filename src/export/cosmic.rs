//! Cosmic-ray corrections from export files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cadence::CadenceTimes;
use crate::error::{try_found, Error, Fetched, Result};
use crate::fits::FitsFile;
use crate::pixel::{insert_cosmic_ray, CadenceType, CosmicRayMap, PixelCategory, PixelKey};

use super::decode_keys;
use super::layout::{CosmicRayLayout, COSMIC_RAY_COLLATERAL, COSMIC_RAY_TARGET};
use super::naming::{keywords, SnapshotKind};
use super::{ExportFamily, ExportReader};

/// Restricts corrections to pixels of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Pixel rows; black collateral offsets.
    Rows(BTreeSet<i32>),
    /// Pixel columns; smear collateral offsets.
    Columns(BTreeSet<i32>),
    Keys(BTreeSet<PixelKey>),
}

impl Projection {
    pub fn admits(&self, key: &PixelKey) -> bool {
        match (self, key) {
            (Projection::Keys(keys), _) => keys.contains(key),
            (Projection::Rows(rows), PixelKey::Pixel(p)) => rows.contains(&p.row),
            (Projection::Columns(cols), PixelKey::Pixel(p)) => cols.contains(&p.column),
            (Projection::Rows(rows), PixelKey::Collateral(c)) => {
                c.kind.is_single() || (c.kind.is_row_offset() && rows.contains(&c.offset))
            }
            (Projection::Columns(cols), PixelKey::Collateral(c)) => {
                !c.kind.is_row_offset() && cols.contains(&c.offset)
            }
        }
    }
}

/// Extracts sparse `PixelKey → correction` maps for one module/output.
#[derive(Debug)]
pub struct CosmicRayExtractor {
    reader: ExportReader,
    family: ExportFamily,
}

impl CosmicRayExtractor {
    /// Reads `crct`/`crcc` snapshot files.
    pub fn snapshots(
        dir: impl Into<PathBuf>,
        module: i32,
        output: i32,
        cadence_type: CadenceType,
        times: Arc<CadenceTimes>,
    ) -> Self {
        Self {
            reader: ExportReader::new(dir, module, output, cadence_type, times),
            family: ExportFamily::Snapshot,
        }
    }

    /// Reads the cosmic-ray column of series files.
    pub fn series(
        dir: impl Into<PathBuf>,
        module: i32,
        output: i32,
        cadence_type: CadenceType,
        times: Arc<CadenceTimes>,
    ) -> Self {
        Self {
            reader: ExportReader::new(dir, module, output, cadence_type, times),
            family: ExportFamily::Series,
        }
    }

    pub fn extract(
        &mut self,
        cadence: i32,
        category: PixelCategory,
        projection: Option<&Projection>,
    ) -> Result<Fetched<CosmicRayMap>> {
        let mut map = match self.family {
            ExportFamily::Snapshot => try_found!(self.extract_snapshot(cadence, category)?),
            ExportFamily::Series => try_found!(self.extract_series(cadence, category)?),
        };
        if let Some(p) = projection {
            map.retain(|k, _| p.admits(k));
        }
        Ok(Fetched::Found(map))
    }

    /// Corrections for every cadence in `[start, end]` that has a file.
    pub fn extract_range(
        &mut self,
        start: i32,
        end: i32,
        category: PixelCategory,
        projection: Option<&Projection>,
    ) -> Result<BTreeMap<i32, CosmicRayMap>> {
        let mut out = BTreeMap::new();
        for cadence in start..=end {
            match self.extract(cadence, category, projection)? {
                Fetched::Found(map) => {
                    if !map.is_empty() {
                        out.insert(cadence, map);
                    }
                }
                Fetched::Skipped(e) => debug!("{}", e),
            }
        }
        Ok(out)
    }

    fn extract_snapshot(
        &mut self,
        cadence: i32,
        category: PixelCategory,
    ) -> Result<Fetched<CosmicRayMap>> {
        let (module, output) = self.reader.module_output();
        let kind = SnapshotKind::cosmic_rays(category)
            .ok_or_else(|| Error::Usage(format!("no {category} cosmic-ray files exist")))?;
        let layout: &CosmicRayLayout = match kind {
            SnapshotKind::CosmicRayCollateral => &COSMIC_RAY_COLLATERAL,
            _ => &COSMIC_RAY_TARGET,
        };

        let path = try_found!(self.reader.locate_snapshot(kind, cadence)?);
        let fits = FitsFile::open(&path)?;
        let header_cadence = fits.keyword_i32(0, keywords::CADENCE_NUMBER)?;
        if header_cadence != cadence {
            return Err(Error::format(
                &path,
                format!("header cadence {header_cadence} does not match requested {cadence}"),
            ));
        }
        let table = fits.find_module_output(module, output)?;
        let keys = decode_keys(&table, layout.key)?;
        let corrections = table.read_f32(layout.correction)?.values;
        let target_ids = match layout.target_id {
            Some(i) => Some(table.read_i32(i)?.values),
            None => None,
        };

        let mut map = CosmicRayMap::new();
        for (i, ((key, _), delta)) in keys.into_iter().zip(corrections).enumerate() {
            if let Some(ids) = &target_ids {
                let is_background = ids[i] < 0;
                if is_background != (category == PixelCategory::Background) {
                    continue;
                }
            }
            insert_cosmic_ray(&mut map, key, delta)?;
        }
        Ok(Fetched::Found(map))
    }

    fn extract_series(
        &mut self,
        cadence: i32,
        category: PixelCategory,
    ) -> Result<Fetched<CosmicRayMap>> {
        let located = self.reader.locate_series(category, None, cadence)?;
        let mut map = CosmicRayMap::new();
        let mut found = false;
        let mut skipped = None;
        for (_, fetched) in located {
            match fetched {
                Fetched::Found(path) => {
                    let data = self.reader.series(&path, category)?;
                    let row = data.row_for(cadence)?;
                    for (key, delta) in data.cosmic_rays(row) {
                        insert_cosmic_ray(&mut map, key, delta)?;
                    }
                    found = true;
                }
                Fetched::Skipped(e) => skipped = Some(e),
            }
        }
        match (found, skipped) {
            (false, Some(e)) => Ok(Fetched::Skipped(e)),
            _ => Ok(Fetched::Found(map)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::CollateralType;

    #[test]
    fn test_projection_rows() {
        let p = Projection::Rows([10, 11].into_iter().collect());
        assert!(p.admits(&PixelKey::pixel(10, 500)));
        assert!(!p.admits(&PixelKey::pixel(12, 500)));
        assert!(p.admits(&PixelKey::collateral(CollateralType::BlackLevel, 11)));
        assert!(!p.admits(&PixelKey::collateral(CollateralType::BlackLevel, 12)));
        assert!(p.admits(&PixelKey::collateral(CollateralType::BlackMasked, 400)));
        assert!(!p.admits(&PixelKey::collateral(CollateralType::MaskedSmear, 10)));
    }

    #[test]
    fn test_projection_columns() {
        let p = Projection::Columns([300].into_iter().collect());
        assert!(p.admits(&PixelKey::pixel(10, 300)));
        assert!(p.admits(&PixelKey::collateral(CollateralType::VirtualSmear, 300)));
        assert!(!p.admits(&PixelKey::collateral(CollateralType::BlackLevel, 300)));
    }
}
