//! Extraction of entries from matched documents.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dedup::{Deduplicator, FingerprintKey, MarkedEntry};
use crate::document::Document;
use crate::error::DocumentError;
use crate::handler::Guarded;
use crate::models::config::ExtractConfig;
use crate::models::entry::Entry;

/// Entries extracted from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Source document.
    pub document: PathBuf,
    /// Name of the handler that produced the entries.
    pub handler: String,
    /// Account reported by the handler, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Entries with their duplicate flags, in handler order.
    pub entries: Vec<MarkedEntry>,
}

impl Section {
    pub fn duplicates(&self) -> usize {
        self.entries.iter().filter(|e| e.duplicate).count()
    }
}

/// Aggregated output of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractReport {
    pub sections: Vec<Section>,
}

impl ExtractReport {
    /// All entries of all sections, in output order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter().map(|m| &m.entry))
    }
}

/// Rendering options for the text output.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub header: String,
    pub section_prefix: String,
    pub sections: bool,
    pub reverse: bool,
}

impl RenderOptions {
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self {
            header: config.header.clone(),
            section_prefix: config.section_prefix.clone(),
            sections: true,
            reverse: config.reverse,
        }
    }
}

/// Step run over the finished report, in registration order. Receives the
/// existing entries the run was started with.
pub type Hook = Box<dyn Fn(&mut ExtractReport, &[Entry])>;

/// Hook removing entries already marked as duplicates.
pub fn drop_duplicates() -> Hook {
    Box::new(|report, _existing| {
        for section in &mut report.sections {
            section.entries.retain(|marked| !marked.duplicate);
        }
    })
}

/// Extracts and deduplicates documents one at a time.
///
/// Documents must be fed in output order: entries of a document become
/// part of the duplicate reference for every later document.
pub struct Pipeline {
    existing: Vec<Entry>,
    dedup: Deduplicator,
    report: ExtractReport,
    hooks: Vec<Hook>,
    failures: usize,
}

impl Pipeline {
    /// `existing` is both passed to handlers and used as the initial
    /// duplicate reference.
    pub fn new(config: &ExtractConfig, existing: Vec<Entry>) -> Self {
        let dedup = Deduplicator::new(FingerprintKey::new(&config.fingerprint), &existing);
        Self {
            existing,
            dedup,
            report: ExtractReport::default(),
            hooks: Vec::new(),
            failures: 0,
        }
    }

    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Extract one matched document.
    ///
    /// On failure nothing from the document is kept and the run is
    /// marked failed.
    pub fn process(
        &mut self,
        document: &Document,
        handler: Guarded<'_>,
    ) -> Result<&Section, DocumentError> {
        let extracted = handler
            .extract(document, &self.existing)
            .and_then(|entries| Ok((entries, handler.account(document)?)));

        let (entries, account) = match extracted {
            Ok(value) => value,
            Err(err) => {
                self.failures += 1;
                return Err(err);
            }
        };

        let entries = self.dedup.mark(entries);
        let section = Section {
            document: document.path().to_path_buf(),
            handler: handler.name().to_string(),
            account,
            entries,
        };
        debug!(
            "{}: {} entries, {} duplicates",
            document.path().display(),
            section.entries.len(),
            section.duplicates()
        );

        let index = self.report.sections.len();
        self.report.sections.push(section);
        Ok(&self.report.sections[index])
    }

    /// Record a failure that happened before extraction (e.g. dispatch).
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Apply the hooks and hand out the report with the failure count.
    pub fn finish(mut self) -> (ExtractReport, usize) {
        for hook in &self.hooks {
            hook(&mut self.report, &self.existing);
        }
        info!(
            "extracted {} documents, {} failures",
            self.report.sections.len(),
            self.failures
        );
        (self.report, self.failures)
    }
}

/// Render a list of entries, each followed by a blank line.
pub fn render_entries<'a>(entries: impl Iterator<Item = &'a MarkedEntry>) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.render());
        out.push_str("\n\n");
    }
    out
}

/// Render an extraction report as ledger text.
pub fn render(report: &ExtractReport, options: &RenderOptions) -> String {
    let mut out = String::new();
    out.push_str(&options.header);
    out.push('\n');

    for section in &report.sections {
        if options.sections {
            out.push_str(&format!(
                "{} {}\n",
                options.section_prefix,
                section.document.display()
            ));
        }
        out.push('\n');
        if options.reverse {
            out.push_str(&render_entries(section.entries.iter().rev()));
        } else {
            out.push_str(&render_entries(section.entries.iter()));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, Outcome};
    use crate::handler::Handler;
    use crate::handler::testing::{Behavior, StubHandler};
    use crate::models::entry::{Amount, Posting};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn entry(day: u32, narration: &str) -> Entry {
        Entry::new(NaiveDate::from_ymd_opt(2024, 1, day).unwrap(), narration)
            .with_posting(Posting::new("Assets:Bank", Amount::new(Decimal::new(-100, 2), "USD")))
    }

    fn run(handlers: &[Box<dyn Handler>], names: &[&str], existing: Vec<Entry>) -> (ExtractReport, usize) {
        let dispatcher = Dispatcher::new(handlers);
        let mut pipeline = Pipeline::new(&ExtractConfig::default(), existing);
        for name in names {
            let document = Document::new(format!("/docs/{}", name));
            match dispatcher.classify(&document) {
                Outcome::Matched(handler) => {
                    let _ = pipeline.process(&document, handler);
                }
                Outcome::Unmatched => {}
                _ => pipeline.record_failure(),
            }
        }
        pipeline.finish()
    }

    #[test]
    fn test_failures_are_isolated() {
        let handlers = vec![
            StubHandler::new("good", "csv")
                .with_entries(vec![entry(2, "b"), entry(1, "a")])
                .boxed(),
            StubHandler::new("bad", "ofx")
                .with_behavior(Behavior::Fail("corrupt".to_string()))
                .boxed(),
            StubHandler::new("panics", "qif")
                .with_behavior(Behavior::Panic)
                .boxed(),
        ];

        let (report, failures) = run(&handlers, &["1.ofx", "2.csv", "3.qif", "4.txt"], vec![]);
        assert_eq!(failures, 2);
        assert_eq!(report.sections.len(), 1);

        let section = &report.sections[0];
        assert_eq!(section.document, PathBuf::from("/docs/2.csv"));
        assert_eq!(section.handler, "good");
        assert_eq!(section.account.as_deref(), Some("Assets:Tests"));
        let narrations: Vec<_> = section.entries.iter().map(|e| e.entry.narration.as_str()).collect();
        assert_eq!(narrations, vec!["a", "b"]);
    }

    #[test]
    fn test_later_documents_see_earlier_entries() {
        let handlers = vec![
            StubHandler::new("bank", "csv")
                .with_entries(vec![entry(1, "a"), entry(2, "b")])
                .boxed(),
        ];

        let (report, _) = run(&handlers, &["jan.csv", "jan-copy.csv"], vec![entry(2, "b")]);
        let flags: Vec<Vec<bool>> = report
            .sections
            .iter()
            .map(|s| s.entries.iter().map(|e| e.duplicate).collect())
            .collect();

        assert_eq!(flags, vec![vec![false, true], vec![true, true]]);
    }

    #[test]
    fn test_rerun_against_own_output_is_idempotent() {
        let handlers = vec![
            StubHandler::new("bank", "csv")
                .with_entries(vec![entry(1, "a"), entry(1, "a"), entry(3, "c")])
                .boxed(),
            StubHandler::new("card", "ofx")
                .with_entries(vec![entry(5, "e")])
                .boxed(),
        ];
        let names = ["a.csv", "b.ofx"];

        let (first, _) = run(&handlers, &names, vec![]);
        let previous: Vec<Entry> = first.entries().cloned().collect();

        let (second, _) = run(&handlers, &names, previous.clone());
        assert!(second.entries().count() == 4);
        assert!(second.sections.iter().all(|s| s.entries.iter().all(|e| e.duplicate)));

        let (third, _) = run(&handlers, &names, previous);
        assert_eq!(second, third);
    }

    #[test]
    fn test_hooks_run_in_order_on_finish() {
        use std::cell::Cell;
        use std::rc::Rc;

        let handlers = vec![
            StubHandler::new("bank", "csv")
                .with_entries(vec![entry(1, "a"), entry(2, "b")])
                .boxed(),
        ];
        let dispatcher = Dispatcher::new(&handlers);
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);

        let mut pipeline = Pipeline::new(&ExtractConfig::default(), vec![entry(2, "b")])
            .with_hook(drop_duplicates())
            .with_hook(Box::new(move |report, existing| {
                counter.set(existing.len());
                for section in &mut report.sections {
                    for marked in &mut section.entries {
                        marked.entry.tags.insert("imported".to_string());
                    }
                }
            }));

        let document = Document::new("/docs/jan.csv");
        let handler = dispatcher.classify(&document).into_result().unwrap().unwrap();
        pipeline.process(&document, handler).unwrap();
        let (report, failures) = pipeline.finish();

        assert_eq!(failures, 0);
        assert_eq!(seen.get(), 1);
        let entries: Vec<&Entry> = report.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].narration, "a");
        assert!(entries[0].tags.contains("imported"));
    }

    #[test]
    fn test_render_sections() {
        let mut duplicate = MarkedEntry::new(entry(2, "b"));
        duplicate.duplicate = true;
        let report = ExtractReport {
            sections: vec![Section {
                document: PathBuf::from("/docs/a.csv"),
                handler: "bank".to_string(),
                account: None,
                entries: vec![MarkedEntry::new(entry(1, "a")), duplicate],
            }],
        };

        let options = RenderOptions::from_config(&ExtractConfig::default());
        let expected = "\
;; -*- mode: beancount -*-
**** /docs/a.csv

2024-01-01 * \"a\"
  Assets:Bank  -1.00 USD

; 2024-01-02 * \"b\"
;   Assets:Bank  -1.00 USD

";
        assert_eq!(render(&report, &options), expected);

        let bare = RenderOptions {
            sections: false,
            reverse: true,
            ..options
        };
        let rendered = render(&report, &bare);
        assert!(!rendered.contains("****"));
        assert!(rendered.find("; 2024-01-02").unwrap() < rendered.find("2024-01-01").unwrap());
    }

    #[test]
    fn test_report_json_shape() {
        let report = ExtractReport {
            sections: vec![Section {
                document: PathBuf::from("/docs/a.csv"),
                handler: "bank".to_string(),
                account: Some("Assets:Bank".to_string()),
                entries: vec![MarkedEntry::new(entry(1, "a"))],
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sections"][0]["entries"][0]["narration"], "a");
        assert_eq!(json["sections"][0]["entries"][0]["duplicate"], false);

        let back: ExtractReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
