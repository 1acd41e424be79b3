//! State-code lookup table (read-only, loaded once per run)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct StateRow {
    state_abbr: String,
    state_name: String,
}

/// Maps short state codes to the canonical full names the directory expects
#[derive(Debug, Clone, Default)]
pub struct StateTable {
    by_code: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl StateTable {
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut table = Self::default();
        for (code, name) in pairs {
            let code = code.as_ref().trim();
            let name = name.as_ref().trim();
            if code.is_empty() || name.is_empty() {
                continue;
            }
            table.by_code.insert(code.to_uppercase(), name.to_string());
            table.by_name.insert(name.to_lowercase(), name.to_string());
        }
        table
    }

    /// Load from a CSV with `state_abbr` and `state_name` columns
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open state table: {}", path.display()))?;

        let mut pairs = Vec::new();
        for row in reader.deserialize::<StateRow>() {
            let row = row.with_context(|| format!("Failed to parse state table row in {}", path.display()))?;
            pairs.push((row.state_abbr, row.state_name));
        }

        Ok(Self::from_pairs(pairs))
    }

    /// Canonical name for a code or an already-canonical name (case-insensitive)
    pub fn canonical(&self, state: &str) -> Option<&str> {
        let state = state.trim();
        if state.is_empty() {
            return None;
        }
        self.by_code
            .get(&state.to_uppercase())
            .or_else(|| self.by_name.get(&state.to_lowercase()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_code_lookup() {
        let table = StateTable::from_pairs([("IL", "Illinois"), ("NY", "New York")]);
        assert_eq!(table.canonical("IL"), Some("Illinois"));
        assert_eq!(table.canonical(" ny "), Some("New York"));
        assert_eq!(table.canonical("new york"), Some("New York"));
        assert_eq!(table.canonical("ZZ"), None);
        assert_eq!(table.canonical(""), None);
    }

    #[test]
    fn test_load_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "state_abbr,state_name").unwrap();
        writeln!(file, "OH,Ohio").unwrap();
        writeln!(file, "PR,Puerto Rico").unwrap();

        let table = StateTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.canonical("pr"), Some("Puerto Rico"));
    }
}
