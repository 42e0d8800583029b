//! Discovery of documents under the paths given on the command line.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;
use crate::models::config::WalkConfig;

/// A file found while walking the sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkItem {
    /// A document to offer to the handlers.
    Document(PathBuf),
    /// A file skipped because it exceeds the size threshold.
    TooLarge { path: PathBuf, size: u64 },
}

impl WalkItem {
    pub fn path(&self) -> &Path {
        match self {
            Self::Document(path) => path,
            Self::TooLarge { path, .. } => path,
        }
    }
}

/// Expands files and directories into an ordered list of documents.
#[derive(Debug, Clone)]
pub struct Walker {
    max_file_size: u64,
    ignore_suffix: Option<String>,
}

impl Walker {
    pub fn new(config: &WalkConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            ignore_suffix: None,
        }
    }

    /// Skip files whose name ends with `suffix` (golden files).
    pub fn ignoring_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.ignore_suffix = Some(suffix.into());
        self
    }

    /// Walk the sources in the order given.
    ///
    /// Directories are traversed recursively in file name order; plain
    /// files are yielded as they are. Links to files are followed, broken
    /// links are skipped.
    pub fn walk(&self, sources: &[PathBuf]) -> Result<Vec<WalkItem>> {
        let mut items = Vec::new();

        for source in sources {
            if source.is_dir() {
                let walker = WalkDir::new(source).sort_by_file_name();
                for entry in walker {
                    let entry = entry?;
                    if entry.path().is_file() {
                        self.push(entry.into_path(), &mut items)?;
                    }
                }
            } else {
                self.push(source.clone(), &mut items)?;
            }
        }

        debug!("walked {} sources into {} files", sources.len(), items.len());
        Ok(items)
    }

    fn push(&self, path: PathBuf, items: &mut Vec<WalkItem>) -> Result<()> {
        if let Some(suffix) = &self.ignore_suffix {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if name.ends_with(suffix.as_str()) {
                return Ok(());
            }
        }

        let size = fs::metadata(&path)?.len();
        if size > self.max_file_size {
            items.push(WalkItem::TooLarge { path, size });
        } else {
            items.push(WalkItem::Document(path));
        }
        Ok(())
    }
}
