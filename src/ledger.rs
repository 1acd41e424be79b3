//! Dedup ledger of (name, city, state) searches already performed.
//!
//! Append-only. Insertion order is kept so the persisted ledger is stable
//! across checkpoints.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A search already performed against the directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "company_name")]
    pub name: String,
    pub city: String,
    pub state: String,
}

impl LedgerEntry {
    pub fn new(name: impl Into<String>, city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            city: city.into(),
            state: state.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupLedger {
    entries: Vec<LedgerEntry>,
    index: HashSet<LedgerEntry>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries; repeated rows collapse to one.
    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            ledger.insert(entry);
        }
        ledger
    }

    pub fn contains(&self, name: &str, city: &str, state: &str) -> bool {
        self.contains_entry(&LedgerEntry::new(name, city, state))
    }

    pub fn contains_entry(&self, entry: &LedgerEntry) -> bool {
        self.index.contains(entry)
    }

    pub fn add(&mut self, name: &str, city: &str, state: &str) {
        self.insert(LedgerEntry::new(name, city, state));
    }

    /// Returns false when the entry was already present
    pub fn insert(&mut self, entry: LedgerEntry) -> bool {
        if self.index.contains(&entry) {
            return false;
        }
        self.index.insert(entry.clone());
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_contains() {
        let mut ledger = DedupLedger::new();
        assert!(!ledger.contains("Acme", "Springfield", "Illinois"));

        ledger.add("Acme", "Springfield", "Illinois");

        assert!(ledger.contains("Acme", "Springfield", "Illinois"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_untouched_triples_stay_absent() {
        let mut ledger = DedupLedger::new();
        ledger.add("Acme", "Springfield", "Illinois");

        assert!(!ledger.contains("Acme", "Springfield", "Ohio"));
        assert!(!ledger.contains("Acme", "Shelbyville", "Illinois"));
        assert!(!ledger.contains("Acme Foods", "Springfield", "Illinois"));
        assert!(!ledger.contains("acme", "Springfield", "Illinois"));
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let mut ledger = DedupLedger::new();
        assert!(ledger.insert(LedgerEntry::new("Acme", "Springfield", "Illinois")));
        assert!(!ledger.insert(LedgerEntry::new("Acme", "Springfield", "Illinois")));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_from_entries_keeps_order() {
        let ledger = DedupLedger::from_entries(vec![
            LedgerEntry::new("B", "X", "Y"),
            LedgerEntry::new("A", "X", "Y"),
            LedgerEntry::new("B", "X", "Y"),
        ]);
        let names: Vec<_> = ledger.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
