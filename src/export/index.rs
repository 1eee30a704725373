//! Cadence → file lookup for one export directory and file category.
//!
//! A directory is scanned once per category: each matching file's header (or
//! cadence column) gives the cadence range it covers, and ranges go into an
//! ordered map. Lookups are a containment check against the range starting at
//! or before the requested cadence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cadence::CadenceTimes;
use crate::error::{Error, Fetched, Result};
use crate::fits::FitsFile;
use crate::pixel::{CadenceType, PixelCategory};

use super::layout::series_layout;
use super::naming::{cadence_keyword, keywords, parse_export_name, ExportName, SnapshotKind};

/// Which files an index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileFamily {
    Snapshot(SnapshotKind),
    Series(PixelCategory),
}

impl FileFamily {
    pub fn label(&self) -> String {
        match self {
            FileFamily::Snapshot(kind) => kind.suffix().to_string(),
            FileFamily::Series(category) => format!("{category} series"),
        }
    }
}

/// Selects the files of one category for one module/output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSelector {
    pub family: FileFamily,
    pub cadence_type: CadenceType,
    pub module: i32,
    pub output: i32,
    /// Restricts target series to one target.
    pub kepler_id: Option<i32>,
}

/// Ordered, non-overlapping `(start, end) → file` ranges.
#[derive(Debug, Clone)]
pub struct CadenceFileIndex {
    dir: PathBuf,
    label: String,
    ranges: BTreeMap<i32, (i32, PathBuf)>,
}

impl CadenceFileIndex {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
            ranges: BTreeMap::new(),
        }
    }

    /// Add a range; inverted or overlapping ranges are rejected.
    pub fn insert(&mut self, start: i32, end: i32, path: PathBuf) -> Result<()> {
        if start > end {
            return Err(Error::format(
                &path,
                format!("inverted cadence range {start}-{end}"),
            ));
        }
        let before = self.ranges.range(..=end).next_back();
        if let Some((&s, (e, other))) = before {
            if *e >= start {
                return Err(Error::format(
                    &path,
                    format!(
                        "cadences {}-{} overlap {}-{} of {}",
                        start,
                        end,
                        s,
                        e,
                        other.display()
                    ),
                ));
            }
        }
        self.ranges.insert(start, (end, path));
        Ok(())
    }

    pub fn lookup(&self, cadence: i32) -> Option<&Path> {
        self.ranges
            .range(..=cadence)
            .next_back()
            .filter(|(_, (end, _))| *end >= cadence)
            .map(|(_, (_, path))| path.as_path())
    }

    /// The covering file, or a skip naming the cadence and its approximate time.
    pub fn locate(&self, cadence: i32, times: &CadenceTimes) -> Fetched<PathBuf> {
        match self.lookup(cadence) {
            Some(path) => Fetched::Found(path.to_path_buf()),
            None => Fetched::Skipped(Error::FileAccess {
                kind: self.label.clone(),
                dir: self.dir.clone(),
                cadence,
                timestamp: times.timestamp(cadence),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// `(start, end, path)` in cadence order.
    pub fn ranges(&self) -> impl Iterator<Item = (i32, i32, &Path)> {
        self.ranges
            .iter()
            .map(|(s, (e, p))| (*s, *e, p.as_path()))
    }

    /// Scan `dir` for the selected files. Target series are grouped by Kepler id;
    /// every other family yields a single group keyed by `None`.
    pub fn scan(
        dir: &Path,
        selector: &FileSelector,
    ) -> Result<BTreeMap<Option<i32>, CadenceFileIndex>> {
        let label = selector.family.label();
        let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

        let mut names: Vec<(PathBuf, ExportName)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(dir, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(parse_export_name) else {
                continue;
            };
            if name_matches(&name, selector) {
                names.push((entry.path(), name));
            }
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let mut groups: BTreeMap<Option<i32>, CadenceFileIndex> = BTreeMap::new();
        for (path, name) in names {
            let scanned = match read_range(&path, &name, selector) {
                Ok(Some(s)) => s,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            debug!(
                "{}: cadences {}-{}",
                path.display(),
                scanned.start,
                scanned.end
            );
            let index = groups
                .entry(scanned.kepler_id)
                .or_insert_with(|| CadenceFileIndex::new(dir, label.clone()));
            if let Err(e) = index.insert(scanned.start, scanned.end, path) {
                warn!("Ignoring {}", e);
            }
        }

        if groups.is_empty() {
            return Err(Error::NoFiles {
                kind: format!(
                    "{} {} (module/output {}/{})",
                    selector.cadence_type, label, selector.module, selector.output
                ),
                dir: dir.to_path_buf(),
            });
        }
        info!(
            "Indexed {} {} files in {}",
            groups.values().map(CadenceFileIndex::len).sum::<usize>(),
            label,
            dir.display()
        );
        Ok(groups)
    }
}

struct ScannedRange {
    start: i32,
    end: i32,
    kepler_id: Option<i32>,
}

fn name_matches(name: &ExportName, selector: &FileSelector) -> bool {
    match (name, selector.family) {
        (
            ExportName::Snapshot {
                cadence_type, kind, ..
            },
            FileFamily::Snapshot(wanted),
        ) => *kind == wanted && *cadence_type == selector.cadence_type,
        (
            ExportName::Series {
                category,
                cadence_type,
                kepler_id,
                module_output,
                ..
            },
            FileFamily::Series(wanted),
        ) => {
            *category == wanted
                && cadence_type.is_none_or(|c| c == selector.cadence_type)
                && module_output.is_none_or(|mo| mo == (selector.module, selector.output))
                && (selector.kepler_id.is_none() || *kepler_id == selector.kepler_id)
        }
        _ => false,
    }
}

/// Cadence range of one file, or `None` when its header places it elsewhere.
fn read_range(
    path: &Path,
    name: &ExportName,
    selector: &FileSelector,
) -> Result<Option<ScannedRange>> {
    // Snapshots are placed by their primary header, series by the cadence
    // column of the first extension.
    let leading = match selector.family {
        FileFamily::Snapshot(_) => 1,
        FileFamily::Series(_) => 2,
    };
    let fits = FitsFile::open_leading(path, leading)?;
    match selector.family {
        FileFamily::Snapshot(kind) if kind.is_cosmic_ray() => {
            let data_type = fits.keyword_str(0, keywords::DATA_TYPE)?;
            match CadenceType::from_data_type(&data_type) {
                Some(t) if t == selector.cadence_type => {}
                Some(_) => return Ok(None),
                None => {
                    return Err(Error::format(
                        path,
                        format!("unexpected {} '{}'", keywords::DATA_TYPE, data_type),
                    ))
                }
            }
            let cadence = fits.keyword_i32(0, keywords::CADENCE_NUMBER)?;
            Ok(Some(ScannedRange {
                start: cadence,
                end: cadence,
                kepler_id: None,
            }))
        }
        FileFamily::Snapshot(_) => {
            let cadence = fits.keyword_i32(0, cadence_keyword(selector.cadence_type))?;
            Ok(Some(ScannedRange {
                start: cadence,
                end: cadence,
                kepler_id: None,
            }))
        }
        FileFamily::Series(category) => {
            let module = fits.keyword_i32(0, keywords::MODULE)?;
            let output = fits.keyword_i32(0, keywords::OUTPUT)?;
            if (module, output) != (selector.module, selector.output) {
                return Ok(None);
            }
            if let Some(mode) = fits.primary().get_str(keywords::OBSMODE) {
                if CadenceType::from_data_type(&mode).is_some_and(|t| t != selector.cadence_type) {
                    return Ok(None);
                }
            }
            let kepler_id = match name {
                ExportName::Series { kepler_id, .. } => *kepler_id,
                ExportName::Snapshot { .. } => None,
            };
            let cadences = fits.bintable(1)?.read_i32(series_layout(category).cadence)?;
            match (cadences.values.first(), cadences.values.last()) {
                (Some(&start), Some(&end)) => Ok(Some(ScannedRange {
                    start,
                    end,
                    kepler_id,
                })),
                _ => Err(Error::format(path, "series table has no rows")),
            }
        }
    }
}
