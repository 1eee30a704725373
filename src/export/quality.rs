//! Packed quality flags from series export files. Values are returned as read;
//! bit meanings are not interpreted here.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cadence::CadenceTimes;
use crate::error::{Error, Result};
use crate::pixel::{CadenceType, PixelCategory, PixelKey};

use super::index::FileFamily;
use super::layout::series_layout;
use super::ExportReader;

/// Quality column of one target (or one module/output product) over a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetQuality {
    pub kepler_id: Option<i32>,
    /// Cadence → packed flags.
    pub flags: BTreeMap<i32, i32>,
    pub optimal_aperture: BTreeSet<PixelKey>,
}

#[derive(Debug)]
pub struct QualityExtractor {
    reader: ExportReader,
}

impl QualityExtractor {
    pub fn new(
        dir: impl Into<PathBuf>,
        module: i32,
        output: i32,
        cadence_type: CadenceType,
        times: Arc<CadenceTimes>,
    ) -> Self {
        Self {
            reader: ExportReader::new(dir, module, output, cadence_type, times),
        }
    }

    /// Quality flags for `[start, end]`, one entry per target for target series.
    pub fn extract(
        &mut self,
        start: i32,
        end: i32,
        category: PixelCategory,
        kepler_id: Option<i32>,
    ) -> Result<Vec<TargetQuality>> {
        if series_layout(category).quality.is_none() {
            return Err(Error::Usage(format!(
                "{category} series carry no quality column"
            )));
        }
        let groups: Vec<(Option<i32>, Vec<PathBuf>)> = self
            .reader
            .indexes(FileFamily::Series(category), kepler_id)?
            .iter()
            .map(|(id, index)| {
                let paths = index
                    .ranges()
                    .filter(|(s, e, _)| *s <= end && *e >= start)
                    .map(|(_, _, p)| p.to_path_buf())
                    .collect();
                (*id, paths)
            })
            .collect();

        let mut out = Vec::with_capacity(groups.len());
        for (id, paths) in groups {
            let mut quality = TargetQuality {
                kepler_id: id,
                ..Default::default()
            };
            for path in paths {
                let data = self.reader.series(&path, category)?;
                if quality.kepler_id.is_none() {
                    quality.kepler_id = data.kepler_id;
                }
                quality.optimal_aperture.extend(data.optimal_aperture());
                for (row, &cadence) in data.cadences.iter().enumerate() {
                    if cadence < start || cadence > end {
                        continue;
                    }
                    if let Some(flags) = data.quality(row) {
                        quality.flags.insert(cadence, flags);
                    }
                }
            }
            out.push(quality);
        }
        Ok(out)
    }
}
