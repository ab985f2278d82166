//! Local directory scan

use super::WorkItemSource;
use crate::error::{Error, Result};
use crate::types::{ItemId, Locator, RunContext, WorkItem};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Lists files with a given extension in one directory
///
/// The item id is the file stem; items come back sorted by file name so the
/// enumeration order is stable across runs. A missing directory yields no
/// items. When two files share a stem (`x.pdf` and `x.PDF`) only the first
/// in sorted order is kept.
#[derive(Clone, Debug)]
pub struct LocalDirSource {
    dir: PathBuf,
    extension: String,
}

impl LocalDirSource {
    /// Scan `dir` for files ending in `.<extension>` (case-insensitive)
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    /// Directory being scanned
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait]
impl WorkItemSource for LocalDirSource {
    async fn enumerate(&self, ctx: &RunContext) -> Result<Vec<WorkItem>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(dir = %self.dir.display(), "Input directory does not exist, nothing to do");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::Enumeration(format!(
                    "failed to read {}: {}",
                    self.dir.display(),
                    e
                )));
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            Error::Enumeration(format!("failed to read {}: {}", self.dir.display(), e))
        })? {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
            if matches && path.is_file() {
                paths.push(path);
            } else {
                debug!(path = %path.display(), "Skipping non-matching entry");
            }
        }

        paths.sort();

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if !seen.insert(stem.clone()) {
                warn!(item_id = %stem, path = %path.display(), "Duplicate identifier in directory, skipping");
                continue;
            }
            items.push(WorkItem::new(ItemId::new(stem), Locator::Path(path)));
        }

        info!(
            run_date = %ctx.run_date,
            dir = %self.dir.display(),
            items = items.len(),
            "Directory enumerated"
        );
        Ok(items)
    }
}
