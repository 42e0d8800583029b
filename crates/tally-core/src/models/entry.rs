//! Ledger entry data model.
//!
//! Entries are the records handlers produce. The pipeline reads them to
//! fingerprint and render; it never interprets account names or amounts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Flag for entries the importer considers complete.
pub const FLAG_OKAY: char = '*';

/// Flag for entries that need review.
pub const FLAG_WARNING: char = '!';

/// Metadata recording where an entry came from. Kept in JSON output,
/// never rendered as ledger text.
pub const HIDDEN_META: &[&str] = &["filename", "lineno"];

/// A single extracted ledger entry (a transaction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Transaction date.
    pub date: NaiveDate,

    /// Entry flag (`*` or `!`).
    #[serde(default = "default_flag")]
    pub flag: char,

    /// Counterparty, when the source names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,

    /// Free-form description.
    #[serde(default)]
    pub narration: String,

    /// Tags attached to the entry.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Links attached to the entry (typically a bank reference id).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub links: BTreeSet<String>,

    /// Key/value metadata. Most of it is incidental for deduplication.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    /// Legs of the transaction.
    #[serde(default)]
    pub postings: Vec<Posting>,
}

fn default_flag() -> char {
    FLAG_OKAY
}

/// One leg of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Account name, components separated by `:`.
    pub account: String,

    /// Units; `None` for a leg left for the ledger to balance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Amount>,
}

/// A number with its commodity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub number: Decimal,
    pub currency: String,
}

impl Amount {
    pub fn new(number: Decimal, currency: impl Into<String>) -> Self {
        Self {
            number,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

impl Posting {
    /// Create a posting with explicit units.
    pub fn new(account: impl Into<String>, units: Amount) -> Self {
        Self {
            account: account.into(),
            units: Some(units),
        }
    }

    /// Create a posting without units.
    pub fn auto(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            units: None,
        }
    }
}

impl Entry {
    /// Create an entry with the default flag and no postings.
    pub fn new(date: NaiveDate, narration: impl Into<String>) -> Self {
        Self {
            date,
            flag: FLAG_OKAY,
            payee: None,
            narration: narration.into(),
            tags: BTreeSet::new(),
            links: BTreeSet::new(),
            meta: BTreeMap::new(),
            postings: Vec::new(),
        }
    }

    pub fn with_flag(mut self, flag: char) -> Self {
        self.flag = flag;
        self
    }

    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.insert(link.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    /// Render the entry with every line commented out.
    ///
    /// Used for entries flagged as duplicates so that the output stays
    /// valid ledger text while still showing what was suppressed.
    pub fn render_commented(&self) -> String {
        self.to_string()
            .lines()
            .map(|line| format!("; {}", line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.flag)?;
        if let Some(payee) = &self.payee {
            write!(f, " {}", quote(payee))?;
        }
        write!(f, " {}", quote(&self.narration))?;
        for tag in &self.tags {
            write!(f, " #{}", tag)?;
        }
        for link in &self.links {
            write!(f, " ^{}", link)?;
        }

        for (key, value) in &self.meta {
            if HIDDEN_META.contains(&key.as_str()) {
                continue;
            }
            write!(f, "\n  {}: {}", key, quote(value))?;
        }

        for posting in &self.postings {
            match &posting.units {
                Some(units) => write!(f, "\n  {}  {}", posting.account, units)?,
                None => write!(f, "\n  {}", posting.account)?,
            }
        }

        Ok(())
    }
}
