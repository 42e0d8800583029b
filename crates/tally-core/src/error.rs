//! Error types for the tally-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the tally library.
///
/// These are failures of the run itself (unreadable config, bad
/// patterns, I/O on the output side). Failures tied to one document are
/// reported as [`DocumentError`] and never abort a run.
#[derive(Error, Debug)]
pub enum TallyError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob pattern in a handler definition.
    #[error("invalid filename pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Invalid regular expression in a handler definition.
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    /// Directory traversal error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Failure raised by a handler capability.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// I/O error while reading the document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited input.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A field could not be parsed.
    #[error("failed to parse {field}: {value:?}")]
    Parse { field: String, value: String },

    /// A required column is missing from the input.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// The handler code panicked.
    #[error("panic: {0}")]
    Panic(String),

    /// Any other handler-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Result type for handler capabilities.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// An error attached to a single document.
///
/// The display strings are what the command line prints under the
/// offending document, so they keep the wording users grep for.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// A handler capability returned an error or panicked.
    #[error("Exception in importer code.\n{handler}.{capability}: {source}")]
    HandlerException {
        handler: String,
        capability: &'static str,
        #[source]
        source: HandlerError,
    },

    /// More than one handler identified the document.
    #[error("{}\nDocument identified by more than one importer.", .handlers.join("\n"))]
    AmbiguousMatch { handlers: Vec<String> },

    /// A golden file exists but no handler identified the document.
    #[error("DocumentNotIdentified")]
    UnmatchedExpected { expected: PathBuf },

    /// The document matched but has no golden file to compare against.
    #[error("ExpectedOutputFileNotFound: {}", .0.display())]
    MissingGoldenFile(PathBuf),

    /// Refusing to overwrite a golden file without force.
    #[error("FileExistsError: {}", .0.display())]
    GoldenFileExists(PathBuf),

    /// Extraction output differs from the golden file.
    #[error("{}: output differs from expected", .expected.display())]
    GoldenMismatch { expected: PathBuf, diff: String },

    /// The archive destination is already taken on disk.
    #[error("{}\nDestination file already exists.", .0.display())]
    DestinationExists(PathBuf),

    /// Another document in the batch maps to the same destination.
    #[error("{}\nCollision in destination file path.", .destination.display())]
    DestinationCollision {
        destination: PathBuf,
        other: PathBuf,
    },

    /// The handler supplied an unusable archive filename.
    #[error("{name}\n{reason}")]
    InvalidFilename { name: String, reason: &'static str },

    /// I/O error touching the document or its golden file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocumentError {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandlerException { .. } => "HandlerException",
            Self::AmbiguousMatch { .. } => "AmbiguousMatch",
            Self::UnmatchedExpected { .. } => "UnmatchedExpected",
            Self::MissingGoldenFile(_) => "MissingGoldenFile",
            Self::GoldenFileExists(_) => "GoldenFileExists",
            Self::GoldenMismatch { .. } => "GoldenMismatch",
            Self::DestinationExists(_) => "DestinationExists",
            Self::DestinationCollision { .. } => "DestinationCollision",
            Self::InvalidFilename { .. } => "InvalidFilename",
            Self::Io(_) => "Io",
        }
    }
}

/// Result type for the tally library.
pub type Result<T> = std::result::Result<T, TallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_match_names_all_handlers() {
        let err = DocumentError::AmbiguousMatch {
            handlers: vec!["bank.checking".to_string(), "bank.savings".to_string()],
        };
        let message = err.to_string();

        assert!(message.contains("bank.checking"));
        assert!(message.contains("bank.savings"));
        assert!(message.ends_with("Document identified by more than one importer."));
        assert_eq!(err.kind(), "AmbiguousMatch");
    }

    #[test]
    fn test_handler_exception_carries_detail() {
        let err = DocumentError::HandlerException {
            handler: "acme".to_string(),
            capability: "extract",
            source: HandlerError::MissingColumn("Amount".to_string()),
        };

        let message = err.to_string();
        assert!(message.starts_with("Exception in importer code."));
        assert!(message.contains("acme.extract: missing column: Amount"));
    }

    #[test]
    fn test_destination_errors_are_distinct() {
        let exists = DocumentError::DestinationExists(PathBuf::from("/a/b"));
        let collision = DocumentError::DestinationCollision {
            destination: PathBuf::from("/a/b"),
            other: PathBuf::from("/src/x"),
        };

        assert!(exists.to_string().contains("Destination file already exists."));
        assert!(collision.to_string().contains("Collision in destination file path."));
        assert_ne!(exists.kind(), collision.kind());
    }
}
