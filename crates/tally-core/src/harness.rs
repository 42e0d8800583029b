//! Golden-file regression testing of handlers.
//!
//! Every document of a test corpus is dispatched and, when matched,
//! extracted on its own. The rendering is compared with (or written to)
//! a golden file named after the document.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use similar::TextDiff;
use tracing::{debug, info};

use crate::dedup::MarkedEntry;
use crate::dispatch::Dispatcher;
use crate::document::Document;
use crate::error::DocumentError;
use crate::extract::render_entries;
use crate::handler::Guarded;
use crate::models::config::HarnessConfig;
use crate::walk::WalkItem;

/// What the harness does with matched documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compare against existing golden files.
    Test,
    /// Write golden files, overwriting only with `force`.
    Generate { force: bool },
}

/// Result of one test document.
#[derive(Debug)]
pub enum CaseStatus {
    /// Unmatched and no golden file.
    Ignored,
    /// Output equals the golden file.
    Passed,
    /// Golden file written.
    Generated,
    /// Above the size threshold, not looked at.
    Skipped { size: u64 },
    Failed(DocumentError),
}

impl CaseStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Status token printed at the end of the progress line.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "IGNORED",
            Self::Passed => "PASSED",
            Self::Generated => "OK",
            Self::Skipped { .. } => "SKIP",
            Self::Failed(_) => "ERROR",
        }
    }
}

#[derive(Debug)]
pub struct CaseReport {
    pub document: PathBuf,
    pub status: CaseStatus,
}

/// Outcome of a harness run, in document order.
#[derive(Debug, Default)]
pub struct HarnessReport {
    pub cases: Vec<CaseReport>,
}

impl HarnessReport {
    pub fn failures(&self) -> usize {
        self.cases.iter().filter(|c| c.status.is_failure()).count()
    }

    pub fn success(&self) -> bool {
        self.failures() == 0
    }
}

/// Regression harness over a handler list.
pub struct Harness<'h> {
    dispatcher: Dispatcher<'h>,
    suffix: String,
    expected_dir: Option<PathBuf>,
    mode: Mode,
}

impl<'h> Harness<'h> {
    /// Golden files live next to the documents unless `expected_dir` is
    /// given.
    pub fn new(
        dispatcher: Dispatcher<'h>,
        config: &HarnessConfig,
        expected_dir: Option<PathBuf>,
        mode: Mode,
    ) -> Self {
        Self {
            dispatcher,
            suffix: config.expected_suffix.clone(),
            expected_dir,
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Golden file path for a document.
    pub fn expected_path(&self, document: &Document) -> PathBuf {
        let mut name = document.file_name().to_os_string();
        name.push(&self.suffix);
        match &self.expected_dir {
            Some(dir) => dir.join(name),
            None => document.path().with_file_name(name),
        }
    }

    /// Run every walked item, stopping early on failure when `failfast`.
    ///
    /// `on_case` is called after each document, in order.
    pub fn run(
        &self,
        items: Vec<WalkItem>,
        failfast: bool,
        mut on_case: impl FnMut(&CaseReport),
    ) -> HarnessReport {
        let mut report = HarnessReport::default();

        for item in items {
            let case = match item {
                WalkItem::TooLarge { path, size } => CaseReport {
                    document: path,
                    status: CaseStatus::Skipped { size },
                },
                WalkItem::Document(path) => {
                    let document = Document::new(path);
                    let status = self.run_case(&document);
                    CaseReport {
                        document: document.path().to_path_buf(),
                        status,
                    }
                }
            };

            on_case(&case);
            let failed = case.status.is_failure();
            report.cases.push(case);
            if failed && failfast {
                break;
            }
        }

        info!(
            "harness: {} documents, {} failures",
            report.cases.len(),
            report.failures()
        );
        report
    }

    /// Evaluate one document.
    pub fn run_case(&self, document: &Document) -> CaseStatus {
        let expected = self.expected_path(document);

        let handler = match self.dispatcher.classify(document).into_result() {
            Ok(Some(handler)) => handler,
            Ok(None) if expected.exists() => {
                return CaseStatus::Failed(DocumentError::UnmatchedExpected { expected });
            }
            Ok(None) => return CaseStatus::Ignored,
            Err(err) => return CaseStatus::Failed(err),
        };

        let result = render_golden(document, handler).and_then(|actual| match self.mode {
            Mode::Test => compare(&expected, &actual),
            Mode::Generate { force } => write_golden(&expected, &actual, force),
        });
        match result {
            Ok(status) => status,
            Err(err) => CaseStatus::Failed(err),
        }
    }
}

/// Render the golden text of a single document.
///
/// The header records the filing capabilities; the date comes from the
/// handler only, so golden files do not depend on file timestamps.
pub fn render_golden(document: &Document, handler: Guarded<'_>) -> Result<String, DocumentError> {
    let account = handler.account(document)?.unwrap_or_default();
    let date = handler
        .date(document)?
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let name = handler
        .filename(document)?
        .unwrap_or_else(|| document.name().to_string());
    let entries: Vec<MarkedEntry> = handler
        .extract(document, &[])?
        .into_iter()
        .map(MarkedEntry::new)
        .collect();

    let mut out = format!(";; Account: {account}\n;; Date: {date}\n;; Name: {name}\n");
    out.push_str(&render_entries(entries.iter()));
    Ok(out)
}

fn compare(expected: &Path, actual: &str) -> Result<CaseStatus, DocumentError> {
    let golden = match fs::read_to_string(expected) {
        Ok(golden) => golden,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DocumentError::MissingGoldenFile(expected.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    if golden == actual {
        return Ok(CaseStatus::Passed);
    }
    Err(DocumentError::GoldenMismatch {
        expected: expected.to_path_buf(),
        diff: unified_diff(&golden, actual),
    })
}

fn write_golden(expected: &Path, actual: &str, force: bool) -> Result<CaseStatus, DocumentError> {
    if let Some(parent) = expected.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = match options.open(expected) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(DocumentError::GoldenFileExists(expected.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    file.write_all(actual.as_bytes())?;
    debug!("wrote {}", expected.display());
    Ok(CaseStatus::Generated)
}

/// Unified diff from the golden text to the imported text.
pub fn unified_diff(expected: &str, actual: &str) -> String {
    TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header("expected", "imported")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::handler::testing::StubHandler;
    use crate::models::entry::{Amount, Entry, Posting};
    use crate::models::config::WalkConfig;
    use crate::walk::Walker;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn handlers() -> Vec<Box<dyn Handler>> {
        let entry = Entry::new(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), "Deposit")
            .with_posting(Posting::new("Assets:Bank", Amount::new(Decimal::new(5000, 2), "USD")));
        vec![StubHandler::new("bank", "csv").with_entries(vec![entry]).boxed()]
    }

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.csv"), "Date,Amount\n").unwrap();
        fs::write(dir.path().join("test.txt"), "hello\n").unwrap();
        dir
    }

    fn run(dir: &Path, handlers: &[Box<dyn Handler>], mode: Mode) -> Vec<(String, &'static str)> {
        let config = HarnessConfig::default();
        let harness = Harness::new(Dispatcher::new(handlers), &config, None, mode);
        let items = Walker::new(&WalkConfig::default())
            .ignoring_suffix(config.expected_suffix.clone())
            .walk(&[dir.to_path_buf()])
            .unwrap();
        harness
            .run(items, false, |_| {})
            .cases
            .iter()
            .map(|c| {
                let name = c.document.file_name().unwrap().to_string_lossy().into_owned();
                (name, c.status.label())
            })
            .collect()
    }

    #[test]
    fn test_generate_then_test() {
        let dir = corpus();
        let handlers = handlers();

        let generated = run(dir.path(), &handlers, Mode::Generate { force: false });
        assert_eq!(
            generated,
            vec![("test.csv".to_string(), "OK"), ("test.txt".to_string(), "IGNORED")]
        );
        assert!(dir.path().join("test.csv.beancount").exists());
        assert!(!dir.path().join("test.txt.beancount").exists());

        let golden = fs::read_to_string(dir.path().join("test.csv.beancount")).unwrap();
        let expected = "\
;; Account: Assets:Tests
;; Date: 1970-01-01
;; Name: test.csv
2024-02-01 * \"Deposit\"
  Assets:Bank  50.00 USD

";
        assert_eq!(golden, expected);

        let tested = run(dir.path(), &handlers, Mode::Test);
        assert_eq!(
            tested,
            vec![("test.csv".to_string(), "PASSED"), ("test.txt".to_string(), "IGNORED")]
        );
    }

    #[test]
    fn test_generate_refuses_overwrite_without_force() {
        let dir = corpus();
        let handlers = handlers();
        fs::write(dir.path().join("test.csv.beancount"), "stale").unwrap();

        let refused = run(dir.path(), &handlers, Mode::Generate { force: false });
        assert_eq!(refused[0].1, "ERROR");
        assert_eq!(
            fs::read_to_string(dir.path().join("test.csv.beancount")).unwrap(),
            "stale"
        );

        let forced = run(dir.path(), &handlers, Mode::Generate { force: true });
        assert_eq!(forced[0].1, "OK");
        assert!(
            fs::read_to_string(dir.path().join("test.csv.beancount"))
                .unwrap()
                .starts_with(";; Account:")
        );
    }

    #[test]
    fn test_appended_byte_shows_as_removed() {
        let dir = corpus();
        let handlers = handlers();
        run(dir.path(), &handlers, Mode::Generate { force: false });

        let golden = dir.path().join("test.csv.beancount");
        let mut content = fs::read_to_string(&golden).unwrap();
        content.push('X');
        fs::write(&golden, content).unwrap();

        let config = HarnessConfig::default();
        let harness = Harness::new(Dispatcher::new(&handlers), &config, None, Mode::Test);
        match harness.run_case(&Document::new(dir.path().join("test.csv"))) {
            CaseStatus::Failed(DocumentError::GoldenMismatch { diff, .. }) => {
                assert!(diff.contains("--- expected"));
                assert!(diff.contains("+++ imported"));
                assert!(diff.lines().any(|l| l == "-X"));
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_missing_golden_in_test_mode() {
        let dir = corpus();
        let handlers = handlers();

        let config = HarnessConfig::default();
        let harness = Harness::new(Dispatcher::new(&handlers), &config, None, Mode::Test);
        match harness.run_case(&Document::new(dir.path().join("test.csv"))) {
            CaseStatus::Failed(err) => assert_eq!(err.kind(), "MissingGoldenFile"),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_renamed_document_is_not_identified() {
        let dir = corpus();
        let handlers = handlers();
        run(dir.path(), &handlers, Mode::Generate { force: false });

        fs::rename(dir.path().join("test.csv"), dir.path().join("test.dat")).unwrap();
        fs::rename(
            dir.path().join("test.csv.beancount"),
            dir.path().join("test.dat.beancount"),
        )
        .unwrap();

        let tested = run(dir.path(), &handlers, Mode::Test);
        assert_eq!(tested[0], ("test.dat".to_string(), "ERROR"));

        let config = HarnessConfig::default();
        let harness = Harness::new(Dispatcher::new(&handlers), &config, None, Mode::Test);
        let status = harness.run_case(&Document::new(dir.path().join("test.dat")));
        match status {
            CaseStatus::Failed(err) => assert_eq!(err.to_string(), "DocumentNotIdentified"),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_collision_does_not_affect_other_documents() {
        let dir = corpus();
        let handlers = vec![
            StubHandler::new("first", "csv").boxed(),
            StubHandler::new("second", "csv").boxed(),
            StubHandler::new("text", "txt").boxed(),
        ];

        let generated = run(dir.path(), &handlers, Mode::Generate { force: false });
        assert_eq!(
            generated,
            vec![("test.csv".to_string(), "ERROR"), ("test.txt".to_string(), "OK")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_get_distinct_golden_files() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let handlers = handlers();
        let config = HarnessConfig::default();
        let harness = Harness::new(Dispatcher::new(&handlers), &config, None, Mode::Test);

        let a = harness.expected_path(&Document::new(Path::new("/in").join(OsStr::from_bytes(b"a\xff.csv"))));
        let b = harness.expected_path(&Document::new(Path::new("/in").join(OsStr::from_bytes(b"a\xfe.csv"))));
        assert_ne!(a, b);
        assert_eq!(a.file_name().unwrap().as_bytes(), b"a\xff.csv.beancount");
    }

    #[test]
    fn test_expected_dir_and_failfast() {
        let dir = corpus();
        let expected = dir.path().join("golden");
        let handlers = handlers();
        let config = HarnessConfig::default();

        let harness = Harness::new(Dispatcher::new(&handlers), &config, Some(expected.clone()), Mode::Test);
        assert_eq!(
            harness.expected_path(&Document::new(dir.path().join("test.csv"))),
            expected.join("test.csv.beancount")
        );

        let items = vec![
            WalkItem::Document(dir.path().join("test.csv")),
            WalkItem::Document(dir.path().join("test.txt")),
        ];
        let mut seen = 0;
        let report = harness.run(items, true, |_| seen += 1);
        assert_eq!(seen, 1);
        assert!(!report.success());
    }
}
