//! Task directory layout and the per-instance artifact cache.
//!
//! Layout: `<root>/<stage>-matlab-<instance>-<task>/<stage>-<inputs|outputs>-<n>.bin`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};

use super::{ArtifactHeader, Direction, Stage, TaskArtifact};

/// Artifact listing and read-through cache for one task root.
#[derive(Debug)]
pub struct TaskDirectory {
    root: PathBuf,
    cache_enabled: bool,
    listings: HashMap<(Stage, Direction), Vec<PathBuf>>,
    headers: HashMap<PathBuf, ArtifactHeader>,
    cache: HashMap<PathBuf, Arc<TaskArtifact>>,
}

/// Parse `<stage>-<direction>-<n>.bin` into its sequence number.
fn artifact_number(file_name: &str, stage: Stage, direction: Direction) -> Option<u32> {
    let rest = file_name
        .strip_prefix(stage.name())?
        .strip_prefix('-')?
        .strip_prefix(direction.name())?
        .strip_prefix('-')?
        .strip_suffix(".bin")?;
    rest.parse().ok()
}

fn is_stage_dir(dir_name: &str, stage: Stage) -> bool {
    dir_name
        .strip_prefix(stage.name())
        .and_then(|r| r.strip_prefix("-matlab-"))
        .is_some_and(|r| !r.is_empty())
}

impl TaskDirectory {
    pub fn new(root: impl Into<PathBuf>, cache_enabled: bool) -> Self {
        Self {
            root: root.into(),
            cache_enabled,
            listings: HashMap::new(),
            headers: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact files of a stage, ordered by directory then sequence number.
    pub fn artifact_paths(&mut self, stage: Stage, direction: Direction) -> Result<&[PathBuf]> {
        let key = (stage, direction);
        if !self.listings.contains_key(&key) {
            let listing = self.scan(stage, direction)?;
            info!(
                "Found {} {}-{} artifacts under {}",
                listing.len(),
                stage.name(),
                direction.name(),
                self.root.display()
            );
            self.listings.insert(key, listing);
        }
        Ok(self.listings.get(&key).map(Vec::as_slice).unwrap_or(&[]))
    }

    fn scan(&self, stage: Stage, direction: Direction) -> Result<Vec<PathBuf>> {
        let mut task_dirs = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))? {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| is_stage_dir(n, stage)) && entry.path().is_dir() {
                task_dirs.push(entry.path());
            }
        }
        task_dirs.sort();

        let mut paths = Vec::new();
        for dir in task_dirs {
            let mut numbered = Vec::new();
            for entry in std::fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))? {
                let entry = entry.map_err(|e| Error::io(&dir, e))?;
                let name = entry.file_name();
                if let Some(n) = name
                    .to_str()
                    .and_then(|n| artifact_number(n, stage, direction))
                {
                    numbered.push((n, entry.path()));
                }
            }
            numbered.sort();
            paths.extend(numbered.into_iter().map(|(_, p)| p));
        }
        Ok(paths)
    }

    /// Decode an artifact, through the cache when enabled.
    pub fn load(&mut self, path: &Path) -> Result<Arc<TaskArtifact>> {
        if let Some(a) = self.cache.get(path) {
            return Ok(Arc::clone(a));
        }
        debug!("Decoding {}", path.display());
        let artifact = Arc::new(TaskArtifact::load_from_file(path)?);
        self.headers
            .insert(path.to_path_buf(), artifact.header().clone());
        if self.cache_enabled {
            self.cache.insert(path.to_path_buf(), Arc::clone(&artifact));
        }
        Ok(artifact)
    }

    /// Artifacts of a stage whose header passes `filter`.
    pub fn find(
        &mut self,
        stage: Stage,
        direction: Direction,
        filter: impl Fn(&ArtifactHeader) -> bool,
    ) -> Result<Vec<Arc<TaskArtifact>>> {
        let paths = self.artifact_paths(stage, direction)?.to_vec();
        let mut out = Vec::new();
        for path in paths {
            if self.headers.get(&path).is_some_and(|h| !filter(h)) {
                continue;
            }
            let artifact = self.load(&path)?;
            if filter(artifact.header()) && artifact.stage() == (stage, direction) {
                out.push(artifact);
            }
        }
        Ok(out)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
