//! Matching documents to the single handler responsible for them.

use tracing::{debug, warn};

use crate::document::Document;
use crate::error::DocumentError;
use crate::handler::{Guarded, Handler};

/// Classification of one document against the handler list.
pub enum Outcome<'h> {
    /// No handler claimed the document.
    Unmatched,
    /// Exactly one handler claimed the document.
    Matched(Guarded<'h>),
    /// Several handlers claimed the document; names in list order.
    Collision(Vec<String>),
    /// A handler failed while identifying the document.
    Failed(DocumentError),
}

impl<'h> Outcome<'h> {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Collision(_) | Self::Failed(_))
    }

    /// The matched handler, `None` when unmatched, or the error.
    pub fn into_result(self) -> Result<Option<Guarded<'h>>, DocumentError> {
        match self {
            Self::Unmatched => Ok(None),
            Self::Matched(handler) => Ok(Some(handler)),
            Self::Collision(handlers) => Err(DocumentError::AmbiguousMatch { handlers }),
            Self::Failed(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for Outcome<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmatched => f.write_str("Unmatched"),
            Self::Matched(handler) => f.debug_tuple("Matched").field(&handler.name()).finish(),
            Self::Collision(names) => f.debug_tuple("Collision").field(names).finish(),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// A document together with its classification.
#[derive(Debug)]
pub struct Dispatched<'h> {
    pub document: Document,
    pub outcome: Outcome<'h>,
}

/// Runs every handler's `identify` on each document.
#[derive(Clone, Copy)]
pub struct Dispatcher<'h> {
    handlers: &'h [Box<dyn Handler>],
}

impl<'h> Dispatcher<'h> {
    pub fn new(handlers: &'h [Box<dyn Handler>]) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &'h [Box<dyn Handler>] {
        self.handlers
    }

    /// Classify one document.
    ///
    /// All handlers are asked, in list order, so that ambiguous
    /// ownership is always reported rather than resolved by position.
    pub fn classify(&self, document: &Document) -> Outcome<'h> {
        let mut matched = Vec::new();

        for handler in self.handlers {
            let guarded = Guarded::new(handler.as_ref());
            match guarded.identify(document) {
                Ok(true) => matched.push(guarded),
                Ok(false) => {}
                Err(err) => {
                    warn!("{}: identify failed on {}", guarded.name(), document.path().display());
                    return Outcome::Failed(err);
                }
            }
        }

        match matched.len() {
            0 => Outcome::Unmatched,
            1 => {
                let handler = matched[0];
                debug!("{} identified {}", handler.name(), document.path().display());
                Outcome::Matched(handler)
            }
            _ => Outcome::Collision(matched.iter().map(|h| h.name().to_string()).collect()),
        }
    }

    /// Classify documents, preserving their order.
    pub fn dispatch(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Dispatched<'h>> {
        documents
            .into_iter()
            .map(|document| {
                let outcome = self.classify(&document);
                Dispatched { document, outcome }
            })
            .collect()
    }
}
