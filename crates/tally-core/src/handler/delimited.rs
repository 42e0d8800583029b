//! Config-driven handler for delimited bank exports.

use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use glob::Pattern;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use super::Handler;
use crate::document::Document;
use crate::error::{HandlerError, HandlerResult, TallyError};
use crate::models::config::CsvHandlerConfig;
use crate::models::entry::{Amount, Entry, Posting};

/// Handler for CSV statements described by a [`CsvHandlerConfig`].
#[derive(Debug)]
pub struct CsvHandler {
    config: CsvHandlerConfig,
    pattern: Pattern,
    header: Option<Regex>,
}

/// Column positions resolved against the header row.
struct Layout {
    date: usize,
    narration: usize,
    payee: Option<usize>,
    amount: Option<usize>,
    debit: Option<usize>,
    credit: Option<usize>,
    currency: Option<usize>,
    reference: Option<usize>,
}

/// One parsed statement row.
struct Row {
    line: u64,
    date: NaiveDate,
    narration: String,
    payee: Option<String>,
    amount: Decimal,
    currency: Option<String>,
    reference: Option<String>,
}

impl CsvHandler {
    /// Build a handler, compiling its patterns.
    pub fn new(config: CsvHandlerConfig) -> crate::Result<Self> {
        if config.name.is_empty() {
            return Err(TallyError::Config("handler without a name".to_string()));
        }
        if config.columns.amount.is_none()
            && config.columns.debit.is_none()
            && config.columns.credit.is_none()
        {
            return Err(TallyError::Config(format!(
                "handler {} has no amount, debit or credit column",
                config.name
            )));
        }
        if !config.delimiter.is_ascii() {
            return Err(TallyError::Config(format!(
                "handler {} delimiter must be ASCII",
                config.name
            )));
        }

        let pattern = Pattern::new(&config.filename)?;
        let header = config.header.as_deref().map(Regex::new).transpose()?;

        Ok(Self {
            config,
            pattern,
            header,
        })
    }

    /// Build the ordered handler list from configuration.
    pub fn from_configs(configs: &[CsvHandlerConfig]) -> crate::Result<Vec<Box<dyn Handler>>> {
        configs
            .iter()
            .cloned()
            .map(|config| CsvHandler::new(config).map(|h| Box::new(h) as Box<dyn Handler>))
            .collect()
    }

    fn layout(&self, headers: &StringRecord) -> HandlerResult<Layout> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| HandlerError::MissingColumn(name.to_string()))
        };
        let optional = |name: &Option<String>| -> HandlerResult<Option<usize>> {
            name.as_deref().map(require).transpose()
        };

        let columns = &self.config.columns;
        Ok(Layout {
            date: require(&columns.date)?,
            narration: require(&columns.narration)?,
            payee: optional(&columns.payee)?,
            amount: optional(&columns.amount)?,
            debit: optional(&columns.debit)?,
            credit: optional(&columns.credit)?,
            currency: optional(&columns.currency)?,
            reference: optional(&columns.reference)?,
        })
    }

    fn rows(&self, document: &Document) -> HandlerResult<Vec<Row>> {
        let text = document.text()?;
        let body: String = text
            .lines()
            .skip(self.config.skip_lines)
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = ReaderBuilder::new()
            .delimiter(self.config.delimiter as u8)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(body.as_bytes());

        let layout = self.layout(reader.headers()?)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }

            let field = |index: usize| record.get(index).unwrap_or("");
            let non_empty = |index: Option<usize>| {
                index
                    .map(field)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };

            let raw_date = field(layout.date);
            let date = NaiveDate::parse_from_str(raw_date, &self.config.date_format).map_err(|_| {
                HandlerError::Parse {
                    field: self.config.columns.date.clone(),
                    value: raw_date.to_string(),
                }
            })?;

            let amount = match layout.amount {
                Some(index) => {
                    let name = self.config.columns.amount.as_deref().unwrap_or("amount");
                    parse_amount(name, field(index))?
                }
                None => {
                    let debit = layout
                        .debit
                        .map(|i| parse_optional_amount("debit", field(i)))
                        .transpose()?
                        .unwrap_or(Decimal::ZERO);
                    let credit = layout
                        .credit
                        .map(|i| parse_optional_amount("credit", field(i)))
                        .transpose()?
                        .unwrap_or(Decimal::ZERO);
                    credit - debit
                }
            };

            let line = record
                .position()
                .map(|p| p.line() + self.config.skip_lines as u64)
                .unwrap_or_default();

            rows.push(Row {
                line,
                date,
                narration: field(layout.narration).to_string(),
                payee: non_empty(layout.payee),
                amount,
                currency: non_empty(layout.currency),
                reference: non_empty(layout.reference),
            });
        }

        debug!("{}: parsed {} rows from {}", self.config.name, rows.len(), document.name());
        Ok(rows)
    }
}

impl Handler for CsvHandler {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn identify(&self, document: &Document) -> HandlerResult<bool> {
        if !self.pattern.matches(&document.name()) {
            return Ok(false);
        }
        match &self.header {
            Some(regex) => Ok(regex.is_match(&document.first_line()?)),
            None => Ok(true),
        }
    }

    fn extract(&self, document: &Document, _existing: &[Entry]) -> HandlerResult<Vec<Entry>> {
        let entries = self
            .rows(document)?
            .into_iter()
            .map(|row| {
                let currency = row.currency.unwrap_or_else(|| self.config.currency.clone());
                let mut entry = Entry::new(row.date, row.narration)
                    .with_meta("lineno", row.line.to_string())
                    .with_posting(Posting::new(
                        self.config.account.clone(),
                        Amount::new(row.amount, currency),
                    ));
                if let Some(payee) = row.payee {
                    entry = entry.with_payee(payee);
                }
                if let Some(reference) = row.reference {
                    entry = entry.with_link(link_id(&reference));
                }
                if let Some(contra) = &self.config.contra_account {
                    entry = entry.with_posting(Posting::auto(contra.clone()));
                }
                entry
            })
            .collect();
        Ok(entries)
    }

    fn account(&self, _document: &Document) -> HandlerResult<Option<String>> {
        Ok(Some(self.config.account.clone()))
    }

    fn date(&self, document: &Document) -> HandlerResult<Option<NaiveDate>> {
        Ok(self.rows(document)?.into_iter().map(|row| row.date).max())
    }

    fn filename(&self, _document: &Document) -> HandlerResult<Option<String>> {
        Ok(self.config.rename.clone())
    }
}

/// Parse a statement amount such as `-1,234.50`, `$12.00` or `(3.10)`.
fn parse_amount(field: &str, value: &str) -> HandlerResult<Decimal> {
    let parse_error = || HandlerError::Parse {
        field: field.to_string(),
        value: value.to_string(),
    };

    let mut cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£') && !c.is_whitespace())
        .collect();

    let negative = cleaned.starts_with('(') && cleaned.ends_with(')');
    if negative {
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    let number = Decimal::from_str(&cleaned).map_err(|_| parse_error())?;
    Ok(if negative { -number } else { number })
}

fn parse_optional_amount(field: &str, value: &str) -> HandlerResult<Decimal> {
    if value.is_empty() {
        return Ok(Decimal::ZERO);
    }
    parse_amount(field, value)
}

/// Links cannot contain whitespace.
fn link_id(reference: &str) -> String {
    reference.split_whitespace().collect::<Vec<_>>().join("-")
}
