//! Core library for ingesting financial documents into a ledger.
//!
//! This crate provides:
//! - Document dispatch to a caller-supplied, ordered list of handlers
//! - Extraction of entries with duplicate detection against a reference set
//! - Planning and executing moves of documents into a dated archive tree
//! - A golden-file regression harness for handlers
//! - A configurable CSV handler for bank exports

pub mod archive;
pub mod dedup;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod extract;
pub mod handler;
pub mod harness;
pub mod ledger;
pub mod models;
pub mod walk;

pub use archive::{ArchivePlanner, MovePlan, PlannedMove, RejectedPlan};
pub use dedup::{Deduplicator, Fingerprint, FingerprintKey, MarkedEntry};
pub use dispatch::{Dispatched, Dispatcher, Outcome};
pub use document::Document;
pub use error::{DocumentError, HandlerError, HandlerResult, Result, TallyError};
pub use extract::{ExtractReport, Hook, Pipeline, RenderOptions, Section, drop_duplicates, render};
pub use handler::{CsvHandler, Guarded, Handler};
pub use harness::{CaseReport, CaseStatus, Harness, HarnessReport, Mode};
pub use ledger::load_existing;
pub use models::{Amount, Entry, Posting, TallyConfig};
pub use walk::{WalkItem, Walker};
