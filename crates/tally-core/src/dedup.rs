//! Entry fingerprints and duplicate marking.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::config::FingerprintConfig;
use crate::models::entry::Entry;

/// Stable content hash of the semantic fields of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides which fields of an entry are hashed.
///
/// Date, flag, payee, narration, tags, links and postings always count.
/// Postings are hashed in sorted order with normalized numbers, so
/// `10.0 USD` and `10.00 USD` are the same amount. Metadata only counts
/// for the keys listed in [`FingerprintConfig::meta_keys`].
#[derive(Debug, Clone, Default)]
pub struct FingerprintKey {
    meta_keys: BTreeSet<String>,
}

impl FingerprintKey {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            meta_keys: config.meta_keys.iter().cloned().collect(),
        }
    }

    pub fn fingerprint(&self, entry: &Entry) -> Fingerprint {
        let mut hasher = Sha256::new();

        write_field(&mut hasher, &entry.date.to_string());
        write_field(&mut hasher, entry.flag.encode_utf8(&mut [0; 4]));
        match &entry.payee {
            Some(payee) => write_field(&mut hasher, &format!("+{}", payee)),
            None => write_field(&mut hasher, "-"),
        }
        write_field(&mut hasher, &entry.narration);

        write_set(&mut hasher, "tags", entry.tags.iter().map(String::as_str));
        write_set(&mut hasher, "links", entry.links.iter().map(String::as_str));

        let meta: Vec<String> = entry
            .meta
            .iter()
            .filter(|(key, _)| self.meta_keys.contains(key.as_str()))
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        write_set(&mut hasher, "meta", meta.iter().map(String::as_str));

        let mut postings: Vec<String> = entry
            .postings
            .iter()
            .map(|posting| match &posting.units {
                Some(units) => format!(
                    "{} {} {}",
                    posting.account,
                    units.currency,
                    units.number.normalize()
                ),
                None => posting.account.clone(),
            })
            .collect();
        postings.sort();
        write_set(&mut hasher, "postings", postings.iter().map(String::as_str));

        Fingerprint(hex::encode(hasher.finalize()))
    }
}

/// Length-prefixed so that field boundaries cannot be forged.
fn write_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn write_set<'a>(hasher: &mut Sha256, label: &str, values: impl Iterator<Item = &'a str>) {
    write_field(hasher, label);
    let values: Vec<&str> = values.collect();
    hasher.update((values.len() as u64).to_le_bytes());
    for value in values {
        write_field(hasher, value);
    }
}

/// An extracted entry with its duplicate flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedEntry {
    #[serde(flatten)]
    pub entry: Entry,

    /// True when an equal entry was already recorded.
    #[serde(default)]
    pub duplicate: bool,
}

impl MarkedEntry {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            duplicate: false,
        }
    }

    /// Render the entry, commented out when it is a duplicate.
    pub fn render(&self) -> String {
        if self.duplicate {
            self.entry.render_commented()
        } else {
            self.entry.to_string()
        }
    }
}

/// Marks entries already present in a growing reference set.
///
/// Each call to [`Deduplicator::mark`] checks one document's entries
/// against the reference only, then adds them to it. Two equal
/// transactions on the same statement are therefore both kept, while the
/// same transaction appearing in a later document is flagged.
#[derive(Debug)]
pub struct Deduplicator {
    key: FingerprintKey,
    seen: HashSet<Fingerprint>,
}

impl Deduplicator {
    pub fn new(key: FingerprintKey, reference: &[Entry]) -> Self {
        let seen = reference.iter().map(|e| key.fingerprint(e)).collect();
        Self { key, seen }
    }

    /// Number of distinct fingerprints in the reference set.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.seen.contains(&self.key.fingerprint(entry))
    }

    /// Flag the entries of one document and add them to the reference.
    pub fn mark(&mut self, entries: Vec<Entry>) -> Vec<MarkedEntry> {
        let fingerprints: Vec<Fingerprint> =
            entries.iter().map(|e| self.key.fingerprint(e)).collect();

        let marked = entries
            .into_iter()
            .zip(&fingerprints)
            .map(|(entry, fp)| MarkedEntry {
                duplicate: self.seen.contains(fp),
                entry,
            })
            .collect();

        self.seen.extend(fingerprints);
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::{Amount, Posting};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn entry(day: u32, narration: &str, cents: i64) -> Entry {
        Entry::new(NaiveDate::from_ymd_opt(2024, 1, day).unwrap(), narration)
            .with_posting(Posting::new("Assets:Bank", Amount::new(Decimal::new(cents, 2), "USD")))
            .with_posting(Posting::auto("Expenses:Misc"))
    }

    #[test]
    fn test_fingerprint_ignores_incidental_meta() {
        let key = FingerprintKey::default();
        let a = entry(1, "Coffee", -450).with_meta("lineno", "3");
        let b = entry(1, "Coffee", -450).with_meta("lineno", "17");

        assert_eq!(key.fingerprint(&a), key.fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_includes_configured_meta() {
        let key = FingerprintKey::new(&FingerprintConfig {
            meta_keys: vec!["txn_id".to_string()],
        });
        let a = entry(1, "Coffee", -450).with_meta("txn_id", "1");
        let b = entry(1, "Coffee", -450).with_meta("txn_id", "2");

        assert_ne!(key.fingerprint(&a), key.fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_normalizes_postings() {
        let key = FingerprintKey::default();
        let a = Entry::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "x")
            .with_posting(Posting::auto("Expenses:Misc"))
            .with_posting(Posting::new("Assets:Bank", Amount::new(Decimal::new(-100, 1), "USD")));
        let b = entry(1, "x", -1000);

        assert_eq!(key.fingerprint(&a), key.fingerprint(&b));
        assert_ne!(key.fingerprint(&b), key.fingerprint(&entry(1, "x", -1001)));
        assert_ne!(key.fingerprint(&b), key.fingerprint(&entry(2, "x", -1000)));
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        let key = FingerprintKey::default();
        let a = Entry::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "b c").with_payee("a");
        let b = Entry::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "c").with_payee("a b");

        assert_ne!(key.fingerprint(&a), key.fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_independent_of_list_order() {
        let key = FingerprintKey::default();
        let entries = vec![entry(1, "a", 100), entry(2, "b", 200), entry(3, "c", 300)];
        let forward: Vec<_> = entries.iter().map(|e| key.fingerprint(e)).collect();
        let mut backward: Vec<_> = entries.iter().rev().map(|e| key.fingerprint(e)).collect();
        backward.reverse();

        assert_eq!(forward, backward);
        assert_eq!(forward[0].as_str().len(), 64);
    }

    #[test]
    fn test_siblings_are_not_duplicates() {
        let mut dedup = Deduplicator::new(FingerprintKey::default(), &[]);

        let marked = dedup.mark(vec![entry(1, "Fee", -100), entry(1, "Fee", -100)]);
        assert!(marked.iter().all(|m| !m.duplicate));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn test_reference_and_earlier_documents() {
        let reference = vec![entry(1, "Rent", -90000)];
        let mut dedup = Deduplicator::new(FingerprintKey::default(), &reference);

        let first = dedup.mark(vec![entry(1, "Rent", -90000), entry(2, "Coffee", -450)]);
        assert_eq!(
            first.iter().map(|m| m.duplicate).collect::<Vec<_>>(),
            vec![true, false]
        );

        let second = dedup.mark(vec![entry(2, "Coffee", -450), entry(3, "Lunch", -1200)]);
        assert_eq!(
            second.iter().map(|m| m.duplicate).collect::<Vec<_>>(),
            vec![true, false]
        );
        assert!(dedup.contains(&entry(3, "Lunch", -1200)));
    }

    #[test]
    fn test_render_marks_duplicates() {
        let mut marked = MarkedEntry::new(entry(1, "Rent", -90000));
        assert!(!marked.render().starts_with(';'));

        marked.duplicate = true;
        assert!(marked.render().lines().all(|l| l.starts_with("; ")));
    }
}
