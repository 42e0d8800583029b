//! Handler capability set.
//!
//! A handler recognizes one class of documents and extracts entries from
//! them. Only `identify` and `extract` are mandatory; the filing
//! capabilities fall back to neutral values.

mod delimited;

pub use delimited::CsvHandler;

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use chrono::NaiveDate;
use tracing::debug;

use crate::document::Document;
use crate::error::{DocumentError, HandlerError, HandlerResult};
use crate::models::entry::Entry;

/// Trait implemented by document handlers.
pub trait Handler {
    /// Unique name used in reports and collision messages.
    fn name(&self) -> &str;

    /// Return true if this handler is responsible for the document.
    fn identify(&self, document: &Document) -> HandlerResult<bool>;

    /// Extract entries from the document.
    ///
    /// `existing` holds previously recorded entries and may be used to
    /// drive extraction (e.g. derive prior balances).
    fn extract(&self, document: &Document, existing: &[Entry]) -> HandlerResult<Vec<Entry>>;

    /// Account the document belongs to.
    fn account(&self, _document: &Document) -> HandlerResult<Option<String>> {
        Ok(None)
    }

    /// Date used to file the document. `None` means modification date.
    fn date(&self, _document: &Document) -> HandlerResult<Option<NaiveDate>> {
        Ok(None)
    }

    /// File name used to file the document. `None` keeps the original.
    fn filename(&self, _document: &Document) -> HandlerResult<Option<String>> {
        Ok(None)
    }

    /// Order extracted entries. The default is a stable sort by date.
    fn sort(&self, entries: &mut [Entry]) {
        entries.sort_by_key(|entry| entry.date);
    }
}

/// Borrowed handler whose capability calls never unwind.
///
/// Errors and panics are both turned into
/// [`DocumentError::HandlerException`] tagged with the handler name and
/// the capability that failed.
#[derive(Clone, Copy)]
pub struct Guarded<'a> {
    handler: &'a dyn Handler,
}

impl fmt::Debug for Guarded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guarded").field(&self.name()).finish()
    }
}

impl<'a> Guarded<'a> {
    pub fn new(handler: &'a dyn Handler) -> Self {
        Self { handler }
    }

    pub fn name(&self) -> &'a str {
        self.handler.name()
    }

    pub fn identify(&self, document: &Document) -> Result<bool, DocumentError> {
        self.call("identify", || self.handler.identify(document))
    }

    pub fn extract(
        &self,
        document: &Document,
        existing: &[Entry],
    ) -> Result<Vec<Entry>, DocumentError> {
        self.call("extract", || {
            let mut entries = self.handler.extract(document, existing)?;
            self.handler.sort(&mut entries);
            Ok(entries)
        })
    }

    pub fn account(&self, document: &Document) -> Result<Option<String>, DocumentError> {
        self.call("account", || self.handler.account(document))
    }

    pub fn date(&self, document: &Document) -> Result<Option<NaiveDate>, DocumentError> {
        self.call("date", || self.handler.date(document))
    }

    pub fn filename(&self, document: &Document) -> Result<Option<String>, DocumentError> {
        self.call("filename", || self.handler.filename(document))
    }

    fn call<T>(
        &self,
        capability: &'static str,
        f: impl FnOnce() -> HandlerResult<T>,
    ) -> Result<T, DocumentError> {
        install_panic_hook();
        IN_HANDLER.with(|flag| flag.set(true));
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        IN_HANDLER.with(|flag| flag.set(false));

        let source = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(payload) => HandlerError::Panic(panic_message(payload.as_ref())),
        };
        Err(DocumentError::HandlerException {
            handler: self.handler.name().to_string(),
            capability,
            source,
        })
    }
}

thread_local! {
    /// Set while a handler capability runs on this thread.
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
}

static PANIC_HOOK: Once = Once::new();

/// Keep handler panics off stderr; they are reported as document errors.
/// Panics outside handler code still reach the previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_HANDLER.with(Cell::get) {
                debug!("handler panicked: {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
