//! Loading previously recorded entries.
//!
//! The reference set is read from JSON: either a plain array of entries
//! or a report written by `extract --format json`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::extract::ExtractReport;
use crate::models::entry::Entry;

#[derive(Deserialize)]
#[serde(untagged)]
enum Existing {
    Entries(Vec<Entry>),
    Report(ExtractReport),
}

/// Parse existing entries from JSON text.
pub fn parse_existing(json: &str) -> Result<Vec<Entry>> {
    let entries = match serde_json::from_str(json)? {
        Existing::Entries(entries) => entries,
        Existing::Report(report) => report.entries().cloned().collect(),
    };
    Ok(entries)
}

/// Read existing entries from a JSON file.
pub fn load_existing(path: &Path) -> Result<Vec<Entry>> {
    let content = fs::read_to_string(path)?;
    let entries = parse_existing(&content)?;
    debug!("loaded {} existing entries from {}", entries.len(), path.display());
    Ok(entries)
}
