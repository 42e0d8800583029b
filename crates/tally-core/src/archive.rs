//! Filing of documents into a dated archive tree.
//!
//! Planning never touches the filesystem beyond existence checks. Moves
//! only happen once every document of the batch has a valid, unique,
//! free destination.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::DocumentError;
use crate::handler::Guarded;
use crate::models::config::ArchiveConfig;

lazy_static! {
    /// ISO date at the start of a file name.
    static ref DATE_PREFIX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();
}

/// A single planned move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Builds a [`MovePlan`] document by document.
#[derive(Debug)]
pub struct ArchivePlanner {
    root: PathBuf,
    separator: String,
    moves: Vec<PlannedMove>,
    claimed: HashMap<PathBuf, PathBuf>,
    overwrite: bool,
    errors: usize,
}

/// A fully validated set of moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    moves: Vec<PlannedMove>,
    overwrite: bool,
}

/// Returned when the batch had errors; nothing will be moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPlan {
    pub errors: usize,
    /// The moves that did validate, for reporting only.
    pub valid: Vec<PlannedMove>,
}

impl ArchivePlanner {
    pub fn new(root: impl Into<PathBuf>, separator: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            separator: separator.into(),
            moves: Vec::new(),
            claimed: HashMap::new(),
            overwrite: false,
            errors: 0,
        }
    }

    /// Allow replacing files already present in the archive. Two documents
    /// of the batch sharing a destination are still rejected.
    pub fn overwriting(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Planner rooted at the configured destination, or at `fallback`.
    pub fn from_config(config: &ArchiveConfig, fallback: &Path) -> Self {
        let root = config
            .destination
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf());
        Self::new(root, config.date_separator.clone())
    }

    /// Compute where a document is filed, without validating it.
    ///
    /// `<root>/<account as directories>/<date><separator><name>`
    pub fn destination(
        &self,
        document: &Document,
        handler: Guarded<'_>,
    ) -> Result<PathBuf, DocumentError> {
        let account = handler.account(document)?;
        let name = match handler.filename(document)? {
            Some(name) => OsString::from(name),
            None => document.file_name().to_os_string(),
        };
        let date = match handler.date(document)? {
            Some(date) => date,
            None => document.modified_date()?,
        };

        let shown = name.to_string_lossy();
        if shown.contains('/') || shown.contains(std::path::MAIN_SEPARATOR) {
            return Err(DocumentError::InvalidFilename {
                name: shown.into_owned(),
                reason: "The filename contains path separator character.",
            });
        }
        if let Some(prefix) = DATE_PREFIX.find(&shown) {
            if shown[prefix.end()..].starts_with(self.separator.as_str()) {
                return Err(DocumentError::InvalidFilename {
                    name: shown.into_owned(),
                    reason: "The filename contains what looks like a date.",
                });
            }
        }

        let mut path = self.root.clone();
        if let Some(account) = account {
            path.extend(account.split(':').filter(|c| !c.is_empty()));
        }
        let mut file_name = OsString::from(format!("{}{}", date.format("%Y-%m-%d"), self.separator));
        file_name.push(&name);
        path.push(file_name);
        Ok(path)
    }

    /// Add a matched document to the plan.
    pub fn plan(
        &mut self,
        document: &Document,
        handler: Guarded<'_>,
    ) -> Result<&PlannedMove, DocumentError> {
        let result = self.destination(document, handler).and_then(|destination| {
            if let Some(other) = self.claimed.get(&destination) {
                return Err(DocumentError::DestinationCollision {
                    destination,
                    other: other.clone(),
                });
            }
            if !self.overwrite && destination.symlink_metadata().is_ok() {
                return Err(DocumentError::DestinationExists(destination));
            }
            Ok(destination)
        });

        let destination = match result {
            Ok(destination) => destination,
            Err(err) => {
                self.errors += 1;
                return Err(err);
            }
        };

        debug!("{} -> {}", document.path().display(), destination.display());
        self.claimed
            .insert(destination.clone(), document.path().to_path_buf());
        let index = self.moves.len();
        self.moves.push(PlannedMove {
            source: document.path().to_path_buf(),
            destination,
        });
        Ok(&self.moves[index])
    }

    /// Record an error from another stage for a document of this batch.
    pub fn record_failure(&mut self) {
        self.errors += 1;
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Close the batch. Any error rejects the whole plan.
    pub fn finish(self) -> Result<MovePlan, RejectedPlan> {
        if self.errors > 0 {
            warn!("archive plan rejected: {} errors", self.errors);
            return Err(RejectedPlan {
                errors: self.errors,
                valid: self.moves,
            });
        }
        Ok(MovePlan {
            moves: self.moves,
            overwrite: self.overwrite,
        })
    }
}

impl MovePlan {
    pub fn moves(&self) -> &[PlannedMove] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Perform every move. In dry-run mode nothing is touched.
    ///
    /// Destinations are checked again right before moving; if any has
    /// appeared since planning, nothing is moved. Skipped when the plan
    /// was built with overwriting enabled.
    pub fn execute(&self, dry_run: bool) -> io::Result<usize> {
        let taken = if self.overwrite {
            None
        } else {
            self.moves
                .iter()
                .find(|m| m.destination.symlink_metadata().is_ok())
        };
        if let Some(taken) = taken {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("destination appeared after planning: {}", taken.destination.display()),
            ));
        }

        if dry_run {
            info!("dry run: {} documents would be filed", self.moves.len());
            return Ok(0);
        }

        for planned in &self.moves {
            move_file(&planned.source, &planned.destination)?;
        }
        info!("filed {} documents", self.moves.len());
        Ok(self.moves.len())
    }
}

/// Move a file, creating the destination directories. Copies and removes
/// the source only when a rename cannot cross filesystems.
pub fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(source, destination) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            debug!("rename across devices, copying: {}", err);
            fs::copy(source, destination)?;
            fs::remove_file(source)?;
        }
        Err(err) => return Err(err),
    }
    debug!("moved {} to {}", source.display(), destination.display());
    Ok(())
}
