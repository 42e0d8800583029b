//! Configuration structures for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for tally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Document discovery configuration.
    pub walk: WalkConfig,

    /// Extraction and rendering configuration.
    pub extract: ExtractConfig,

    /// Archive configuration.
    pub archive: ArchiveConfig,

    /// Regression harness configuration.
    pub harness: HarnessConfig,

    /// Ordered list of handler definitions.
    pub handlers: Vec<CsvHandlerConfig>,
}

/// Document discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_file_size: 8 * 1024 * 1024,
        }
    }
}

/// Extraction output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// First line of the rendered output.
    pub header: String,

    /// Prefix of each per-document section title.
    pub section_prefix: String,

    /// Render entries in descending order.
    pub reverse: bool,

    /// Which fields count towards an entry fingerprint.
    pub fingerprint: FingerprintConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            header: ";; -*- mode: beancount -*-".to_string(),
            section_prefix: "****".to_string(),
            reverse: false,
            fingerprint: FingerprintConfig::default(),
        }
    }
}

/// Fingerprint key configuration.
///
/// Date, flag, payee, narration, tags, links and postings are always
/// part of the key. Metadata is incidental unless listed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Metadata keys that are semantic (e.g. a bank transaction id).
    pub meta_keys: Vec<String>,
}

/// Archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Root of the documents tree. Defaults to the current directory.
    pub destination: Option<PathBuf>,

    /// Separator between the date prefix and the filename.
    pub date_separator: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            destination: None,
            date_separator: ".".to_string(),
        }
    }
}

/// Regression harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Suffix appended to a document name to form its golden file name.
    pub expected_suffix: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            expected_suffix: ".beancount".to_string(),
        }
    }
}

/// Definition of a delimited-text bank export handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvHandlerConfig {
    /// Handler name, used in reports.
    pub name: String,

    /// Account the documents belong to.
    pub account: String,

    /// Default currency of the amounts.
    pub currency: String,

    /// Glob matched against the document file name.
    pub filename: String,

    /// Regex matched against the first line of the document.
    pub header: Option<String>,

    /// Field delimiter.
    pub delimiter: char,

    /// Lines to skip before the header row.
    pub skip_lines: usize,

    /// chrono format of the date column.
    pub date_format: String,

    /// Column mapping.
    pub columns: ColumnsConfig,

    /// Balancing account added as an auto posting.
    pub contra_account: Option<String>,

    /// File name to use when archiving.
    pub rename: Option<String>,
}

impl Default for CsvHandlerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            account: String::new(),
            currency: "USD".to_string(),
            filename: "*.csv".to_string(),
            header: None,
            delimiter: ',',
            skip_lines: 0,
            date_format: "%Y-%m-%d".to_string(),
            columns: ColumnsConfig::default(),
            contra_account: None,
            rename: None,
        }
    }
}

/// Header names of the columns a CSV handler reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub date: String,
    pub narration: String,
    pub payee: Option<String>,
    /// Signed amount column.
    pub amount: Option<String>,
    /// Outflow column, used when there is no signed amount.
    pub debit: Option<String>,
    /// Inflow column, used when there is no signed amount.
    pub credit: Option<String>,
    pub currency: Option<String>,
    /// Reference id column, rendered as a link.
    pub reference: Option<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            date: "Date".to_string(),
            narration: "Description".to_string(),
            payee: None,
            amount: Some("Amount".to_string()),
            debit: None,
            credit: None,
            currency: None,
            reference: None,
        }
    }
}

impl TallyConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
