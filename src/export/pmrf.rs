//! Pixel mapping reference files.
//!
//! A PMRF table lists, row by row, the pixel (row/column) or collateral
//! (type/offset, plus target id for short cadence) that the same row of a
//! snapshot data table holds. The resolver decodes each category's table once
//! and keeps it for the life of the resolver.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fits::{BinTable, FitsFile};
use crate::pixel::{CadenceType, PixelCategory, PixelKey};

use super::decode_keys;
use super::layout::pmrf_layout;
use super::naming::pmrf_keyword;

/// PMRF tables differ by pixel category and cadence type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PmrfCategory {
    pub cadence_type: CadenceType,
    pub category: PixelCategory,
}

impl PmrfCategory {
    pub fn new(cadence_type: CadenceType, category: PixelCategory) -> Self {
        Self {
            cadence_type,
            category,
        }
    }

    /// Snapshot header keyword naming this category's PMRF file.
    pub fn keyword(&self) -> Option<&'static str> {
        pmrf_keyword(self.cadence_type, self.category)
    }
}

/// Row index ↔ key table decoded from one PMRF extension.
#[derive(Debug, Clone)]
pub struct PmrfMapping {
    category: PmrfCategory,
    file_name: String,
    entries: Vec<(PixelKey, i32)>,
    by_key: BTreeMap<PixelKey, Vec<usize>>,
}

impl PmrfMapping {
    pub fn from_table(
        table: &BinTable<'_>,
        category: PmrfCategory,
        file_name: impl Into<String>,
    ) -> Result<Self> {
        let entries = decode_keys(table, pmrf_layout(category.category, category.cadence_type))?;
        let mut by_key: BTreeMap<PixelKey, Vec<usize>> = BTreeMap::new();
        for (i, (key, _)) in entries.iter().enumerate() {
            by_key.entry(*key).or_default().push(i);
        }
        Ok(Self {
            category,
            file_name: file_name.into(),
            entries,
            by_key,
        })
    }

    pub fn category(&self) -> PmrfCategory {
        self.category
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn key(&self, index: usize) -> Option<&PixelKey> {
        self.entries.get(index).map(|(k, _)| k)
    }

    pub fn target_id(&self, index: usize) -> Option<i32> {
        self.entries.get(index).map(|(_, t)| *t)
    }

    /// `(index, key, target_id)` in row order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &PixelKey, i32)> {
        self.entries.iter().enumerate().map(|(i, (k, t))| (i, k, *t))
    }

    /// Row indices mapping to `key`; several for normalized collateral keys.
    pub fn indices_of(&self, key: &PixelKey) -> &[usize] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct keys.
    pub fn distinct_keys(&self) -> usize {
        self.by_key.len()
    }

    /// The data table mapped by this PMRF must have exactly as many rows.
    pub fn check_rows(&self, data_rows: usize, data_file: &Path) -> Result<()> {
        if self.entries.len() != data_rows {
            return Err(Error::StateInconsistency(format!(
                "PMRF table {} has {} rows and pixel table {} has {} rows",
                self.file_name,
                self.entries.len(),
                data_file.display(),
                data_rows
            )));
        }
        Ok(())
    }
}

/// Resolves and caches PMRF mappings for one module/output.
#[derive(Debug)]
pub struct PmrfMappingResolver {
    dir: PathBuf,
    module: i32,
    output: i32,
    cache: HashMap<PmrfCategory, Arc<PmrfMapping>>,
}

impl PmrfMappingResolver {
    pub fn new(dir: impl Into<PathBuf>, module: i32, output: i32) -> Self {
        Self {
            dir: dir.into(),
            module,
            output,
            cache: HashMap::new(),
        }
    }

    /// Mapping for a category, decoded from `file_name` on first use.
    pub fn resolve(&mut self, category: PmrfCategory, file_name: &str) -> Result<Arc<PmrfMapping>> {
        if let Some(mapping) = self.cache.get(&category) {
            if mapping.file_name() != file_name {
                warn!(
                    "{:?} PMRF {} requested; keeping cached {}",
                    category,
                    file_name,
                    mapping.file_name()
                );
            }
            return Ok(Arc::clone(mapping));
        }

        let path = self.dir.join(file_name);
        let fits = FitsFile::open(&path)?;
        let table = fits.find_module_output(self.module, self.output)?;
        let mapping = Arc::new(PmrfMapping::from_table(&table, category, file_name)?);
        debug!(
            "Decoded PMRF {} for module/output {}/{}: {} rows, {} keys",
            path.display(),
            self.module,
            self.output,
            mapping.len(),
            mapping.distinct_keys()
        );
        self.cache.insert(category, Arc::clone(&mapping));
        Ok(mapping)
    }

    pub fn cached(&self, category: PmrfCategory) -> Option<&PmrfMapping> {
        self.cache.get(&category).map(Arc::as_ref)
    }
}
