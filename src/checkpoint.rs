// checkpoint.rs - Durable batch state (work list, results, ledger)
//
// The three tables are always written together: every file is serialized in
// memory and written to a temporary sibling (fsynced) before any real file is
// replaced. Last writer wins; no other process may run against the same files.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::case::{Case, ScrapeStatus, SearchResult};
use crate::config::PathsConfig;
use crate::ledger::{DedupLedger, LedgerEntry};

/// Manifest file name - hidden file next to the results table
pub const MANIFEST_FILENAME: &str = ".employerfinder-checkpoint.json";

/// Current manifest format version - bump when making breaking changes
pub const CHECKPOINT_VERSION: u32 = 1;

pub const CASE_NUMBER_COLUMN: &str = "case_number";
pub const EMPLOYER_NAME_COLUMN: &str = "company_name";
pub const CLEAN_NAME_1_COLUMN: &str = "clean_name_1";
pub const CLEAN_NAME_2_COLUMN: &str = "clean_name_2";
pub const CITY_COLUMN: &str = "emp_1_city";
pub const STATE_COLUMN: &str = "emp_1_state";
pub const STATUS_COLUMN: &str = "scrape_status";

const KNOWN_COLUMNS: [&str; 7] = [
    CASE_NUMBER_COLUMN,
    EMPLOYER_NAME_COLUMN,
    CLEAN_NAME_1_COLUMN,
    CLEAN_NAME_2_COLUMN,
    CITY_COLUMN,
    STATE_COLUMN,
    STATUS_COLUMN,
];

const RESULT_COLUMNS: [&str; 8] = [
    "directory_name",
    "directory_address",
    "directory_phone",
    "directory_type",
    "status_text",
    "email_requested",
    "case_number",
    "retried",
];

const LEDGER_COLUMNS: [&str; 3] = ["company_name", "city", "state"];

/// The case table plus its column layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkList {
    /// Column order as read; written back unchanged
    pub headers: Vec<String>,
    pub cases: Vec<Case>,
}

impl WorkList {
    /// A work list with the standard column layout
    pub fn new(cases: Vec<Case>) -> Self {
        Self {
            headers: KNOWN_COLUMNS.iter().map(|c| c.to_string()).collect(),
            cases,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Append a column if it is not already present
    pub fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.headers.push(column.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Parse a work list from CSV text
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let mut headers: Vec<String> = reader
            .headers()
            .context("Failed to read work list headers")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let position: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.as_str(), idx))
            .collect();

        for required in [CASE_NUMBER_COLUMN, CITY_COLUMN, STATE_COLUMN] {
            if !position.contains_key(required) {
                anyhow::bail!("Work list must have a '{}' column", required);
            }
        }
        if !position.contains_key(EMPLOYER_NAME_COLUMN) && !position.contains_key(CLEAN_NAME_1_COLUMN) {
            anyhow::bail!(
                "Work list must have a '{}' or '{}' column",
                EMPLOYER_NAME_COLUMN,
                CLEAN_NAME_1_COLUMN
            );
        }

        let field = |record: &csv::StringRecord, column: &str| -> Option<String> {
            position
                .get(column)
                .and_then(|idx| record.get(*idx))
                .map(|v| v.to_string())
        };

        let mut cases = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to parse work list row {}", row_idx + 2))?;

            let status_raw = field(&record, STATUS_COLUMN).unwrap_or_default();
            let scrape_status = status_raw
                .parse::<ScrapeStatus>()
                .with_context(|| format!("Invalid scrape status in work list row {}", row_idx + 2))?;

            let mut extra = BTreeMap::new();
            for (idx, header) in headers.iter().enumerate() {
                if !KNOWN_COLUMNS.contains(&header.as_str()) {
                    extra.insert(header.clone(), record.get(idx).unwrap_or_default().to_string());
                }
            }

            cases.push(Case {
                case_number: field(&record, CASE_NUMBER_COLUMN).unwrap_or_default(),
                employer_name: field(&record, EMPLOYER_NAME_COLUMN).unwrap_or_default(),
                clean_name_1: field(&record, CLEAN_NAME_1_COLUMN).filter(|v| !v.is_empty()),
                clean_name_2: field(&record, CLEAN_NAME_2_COLUMN).filter(|v| !v.is_empty()),
                city: field(&record, CITY_COLUMN).unwrap_or_default(),
                state: field(&record, STATE_COLUMN).unwrap_or_default(),
                scrape_status,
                extra,
            });
        }

        if !headers.iter().any(|h| h == STATUS_COLUMN) {
            headers.push(STATUS_COLUMN.to_string());
        }

        Ok(Self { headers, cases })
    }

    /// Serialize the work list as CSV bytes
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;

        for case in &self.cases {
            let row: Vec<&str> = self
                .headers
                .iter()
                .map(|header| match header.as_str() {
                    CASE_NUMBER_COLUMN => case.case_number.as_str(),
                    EMPLOYER_NAME_COLUMN => case.employer_name.as_str(),
                    CLEAN_NAME_1_COLUMN => case.clean_name_1.as_deref().unwrap_or(""),
                    CLEAN_NAME_2_COLUMN => case.clean_name_2.as_deref().unwrap_or(""),
                    CITY_COLUMN => case.city.as_str(),
                    STATE_COLUMN => case.state.as_str(),
                    STATUS_COLUMN => case.scrape_status.code(),
                    other => case.extra.get(other).map(String::as_str).unwrap_or(""),
                })
                .collect();
            writer.write_record(&row)?;
        }

        writer.into_inner().context("Failed to finish work list CSV")
    }
}

/// All mutable batch state, persisted as one unit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckpointState {
    pub work_list: WorkList,
    pub results: Vec<SearchResult>,
    pub ledger: DedupLedger,
}

impl CheckpointState {
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for case in &self.work_list.cases {
            *counts.entry(case.scrape_status.name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self, manifest: Option<&CheckpointManifest>) -> CheckpointSummary {
        CheckpointSummary {
            case_count: self.work_list.len(),
            status_counts: self.status_counts(),
            result_count: self.results.len(),
            ledger_count: self.ledger.len(),
            last_checkpoint: manifest.map(|m| m.created_at),
        }
    }
}

/// Small JSON record written alongside every checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub case_count: usize,
    pub result_count: usize,
    pub ledger_count: usize,
    pub status_counts: BTreeMap<String, usize>,
}

/// Summary of checkpoint state for display
#[derive(Debug, Clone)]
pub struct CheckpointSummary {
    pub case_count: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub result_count: usize,
    pub ledger_count: usize,
    pub last_checkpoint: Option<DateTime<Utc>>,
}

impl std::fmt::Display for CheckpointSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cases: {}", self.case_count)?;
        for (status, count) in &self.status_counts {
            writeln!(f, "  {:<20} {}", status, count)?;
        }
        writeln!(f, "Directory results: {}", self.result_count)?;
        writeln!(f, "Ledger entries: {}", self.ledger_count)?;
        match self.last_checkpoint {
            Some(at) => write!(f, "Last checkpoint: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, "Last checkpoint: never"),
        }
    }
}

/// Reads and rewrites the checkpoint tables
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    work_list_path: PathBuf,
    results_path: PathBuf,
    ledger_path: PathBuf,
    manifest_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(work_list_path: PathBuf, results_path: PathBuf, ledger_path: PathBuf) -> Self {
        let manifest_dir = results_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            work_list_path,
            results_path,
            ledger_path,
            manifest_path: manifest_dir.join(MANIFEST_FILENAME),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(
            paths.work_list.clone(),
            paths.results.clone(),
            paths.ledger.clone(),
        )
    }

    pub fn work_list_path(&self) -> &Path {
        &self.work_list_path
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Load the full state. The work list must exist; missing result and
    /// ledger files mean a first run.
    pub fn load(&self) -> Result<CheckpointState> {
        let work_list = self.load_work_list()?;

        let results = if self.results_path.exists() {
            read_results(&self.results_path)?
        } else {
            debug!("No results file at {}, starting empty", self.results_path.display());
            Vec::new()
        };

        let ledger = if self.ledger_path.exists() {
            DedupLedger::from_entries(read_ledger(&self.ledger_path)?)
        } else {
            debug!("No ledger file at {}, starting empty", self.ledger_path.display());
            DedupLedger::new()
        };

        Ok(CheckpointState { work_list, results, ledger })
    }

    pub fn load_work_list(&self) -> Result<WorkList> {
        let file = fs::File::open(&self.work_list_path)
            .with_context(|| format!("Failed to open work list: {}", self.work_list_path.display()))?;
        WorkList::from_reader(file)
            .with_context(|| format!("Failed to read work list: {}", self.work_list_path.display()))
    }

    /// Load the manifest written by the last checkpoint (if any).
    /// Returns an error if the manifest version is incompatible.
    pub fn load_manifest(&self) -> Result<Option<CheckpointManifest>> {
        if !self.manifest_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.manifest_path)
            .with_context(|| format!("Failed to read manifest: {}", self.manifest_path.display()))?;
        let manifest: CheckpointManifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", self.manifest_path.display()))?;
        if manifest.version != CHECKPOINT_VERSION {
            anyhow::bail!(
                "Incompatible checkpoint version: file has version {} but current version is {}.",
                manifest.version,
                CHECKPOINT_VERSION
            );
        }
        Ok(Some(manifest))
    }

    /// Persist the work list, results, ledger and manifest together
    pub fn save(&self, state: &CheckpointState) -> Result<()> {
        let manifest = CheckpointManifest {
            version: CHECKPOINT_VERSION,
            created_at: Utc::now(),
            case_count: state.work_list.len(),
            result_count: state.results.len(),
            ledger_count: state.ledger.len(),
            status_counts: state.status_counts(),
        };

        // Serialize everything before touching the disk. Rename order matters:
        // results and ledger land before the work list marks cases terminal.
        let files = vec![
            (self.results_path.as_path(), results_to_csv_bytes(&state.results)?),
            (self.ledger_path.as_path(), ledger_to_csv_bytes(&state.ledger)?),
            (self.work_list_path.as_path(), state.work_list.to_csv_bytes()?),
            (
                self.manifest_path.as_path(),
                serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?,
            ),
        ];

        write_all_atomically(&files)?;
        debug!(
            "Checkpoint saved: {} cases, {} results, {} ledger entries",
            manifest.case_count, manifest.result_count, manifest.ledger_count
        );
        Ok(())
    }

    /// Rewrite only the work list (used when preparing name columns)
    pub fn save_work_list(&self, work_list: &WorkList) -> Result<()> {
        write_all_atomically(&[(self.work_list_path.as_path(), work_list.to_csv_bytes()?)])
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write every file to a temporary sibling and fsync it, then rename all of
/// them into place in the given order. Nothing is renamed unless every
/// temporary file is complete.
fn write_all_atomically(files: &[(&Path, Vec<u8>)]) -> Result<()> {
    let mut written: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());

    for (path, content) in files {
        let temp_path = temp_path_for(path);
        let outcome = (|| -> Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            let mut file = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            file.write_all(content)
                .with_context(|| format!("Failed to write {}", temp_path.display()))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", temp_path.display()))?;
            Ok(())
        })();

        if let Err(e) = outcome {
            let _ = fs::remove_file(&temp_path);
            for (temp, _) in &written {
                let _ = fs::remove_file(temp);
            }
            return Err(e);
        }
        written.push((temp_path, *path));
    }

    for (temp_path, path) in &written {
        fs::rename(temp_path, path)
            .with_context(|| format!("Failed to move checkpoint file into place: {}", path.display()))?;
    }

    Ok(())
}

pub fn read_results(path: &Path) -> Result<Vec<SearchResult>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open results file: {}", path.display()))?;
    let mut results = Vec::new();
    for (row_idx, row) in reader.deserialize::<SearchResult>().enumerate() {
        let row = row.with_context(|| format!("Failed to parse results row {} in {}", row_idx + 2, path.display()))?;
        results.push(row);
    }
    Ok(results)
}

pub fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open ledger file: {}", path.display()))?;
    let mut entries = Vec::new();
    for (row_idx, row) in reader.deserialize::<LedgerEntry>().enumerate() {
        let row = row.with_context(|| format!("Failed to parse ledger row {} in {}", row_idx + 2, path.display()))?;
        entries.push(row);
    }
    Ok(entries)
}

fn results_to_csv_bytes(results: &[SearchResult]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(RESULT_COLUMNS)?;
    for result in results {
        writer.serialize(result)?;
    }
    writer.into_inner().context("Failed to finish results CSV")
}

fn ledger_to_csv_bytes(ledger: &DedupLedger) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(LEDGER_COLUMNS)?;
    for entry in ledger.entries() {
        writer.serialize(entry)?;
    }
    writer.into_inner().context("Failed to finish ledger CSV")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &Path) -> CheckpointStore {
        CheckpointStore::new(
            dir.join("inputs").join("cases.csv"),
            dir.join("outputs").join("results.csv"),
            dir.join("outputs").join("ledger.csv"),
        )
    }

    #[test]
    fn test_work_list_preserves_unknown_columns() {
        let csv_text = "case_number,region,company_name,emp_1_city,emp_1_state,scrape_status\n\
                        01-RC-1,Midwest,Acme Inc,Springfield,IL,\n\
                        01-RC-2,East,Widget LLC,Albany,NY,4\n";
        let work_list = WorkList::from_reader(csv_text.as_bytes()).unwrap();

        assert_eq!(work_list.headers, vec!["case_number", "region", "company_name", "emp_1_city", "emp_1_state", "scrape_status"]);
        assert_eq!(work_list.cases[0].extra.get("region"), Some(&"Midwest".to_string()));
        assert_eq!(work_list.cases[1].scrape_status, ScrapeStatus::ServerError);

        let written = String::from_utf8(work_list.to_csv_bytes().unwrap()).unwrap();
        assert_eq!(written, csv_text);
    }

    #[test]
    fn test_missing_status_column_is_appended() {
        let csv_text = "case_number,company_name,emp_1_city,emp_1_state\n01-RC-1,Acme,Springfield,IL\n";
        let work_list = WorkList::from_reader(csv_text.as_bytes()).unwrap();
        assert_eq!(work_list.headers.last().map(String::as_str), Some(STATUS_COLUMN));
        assert_eq!(work_list.cases[0].scrape_status, ScrapeStatus::Unscraped);
    }

    #[test]
    fn test_missing_required_column_rejected() {
        let csv_text = "case_number,company_name,emp_1_city\n01-RC-1,Acme,Springfield\n";
        assert!(WorkList::from_reader(csv_text.as_bytes()).is_err());
    }

    #[test]
    fn test_invalid_status_rejected() {
        let csv_text = "case_number,company_name,emp_1_city,emp_1_state,scrape_status\n01-RC-1,Acme,Springfield,IL,42\n";
        assert!(WorkList::from_reader(csv_text.as_bytes()).is_err());
    }

    #[test]
    fn test_load_without_results_or_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(temp_dir.path());
        let work_list = WorkList::new(vec![Case::new("01-RC-1", "Acme", "Springfield", "IL")]);
        store.save_work_list(&work_list).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.work_list.len(), 1);
        assert!(state.results.is_empty());
        assert!(state.ledger.is_empty());
        assert!(store.load_manifest().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(temp_dir.path());

        let cases = vec![
            Case::new("01-RC-1", "Acme, Inc.", "Springfield", "IL")
                .with_clean_names(Some("Acme"), None)
                .with_status(ScrapeStatus::Success),
            Case::new("01-RC-2", "Widget \"Best\" LLC", "Albany, West", "NY")
                .with_status(ScrapeStatus::ServerError),
        ];
        let mut ledger = DedupLedger::new();
        ledger.add("Acme", "Springfield", "Illinois");
        let state = CheckpointState {
            work_list: WorkList::new(cases),
            results: vec![
                SearchResult::new("ACME INC", "1 Main St, Springfield", "555-0100", "HQ", "Active", true)
                    .tagged("01-RC-1", false),
            ],
            ledger,
        };

        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);

        let manifest = store.load_manifest().unwrap().unwrap();
        assert_eq!(manifest.case_count, 2);
        assert_eq!(manifest.result_count, 1);
        assert_eq!(manifest.ledger_count, 1);
        assert_eq!(manifest.status_counts.get("SUCCESS"), Some(&1));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(temp_dir.path());
        let state = CheckpointState {
            work_list: WorkList::new(vec![Case::new("01-RC-1", "Acme", "Springfield", "IL")]),
            ..Default::default()
        };
        store.save(&state).unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path().join("outputs"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_work_list_rename_leaves_results_and_ledger_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(temp_dir.path());
        // A directory at the work-list path makes its rename fail
        fs::create_dir_all(store.work_list_path()).unwrap();

        let mut ledger = DedupLedger::new();
        ledger.add("Acme", "Springfield", "Illinois");
        let state = CheckpointState {
            work_list: WorkList::new(vec![
                Case::new("01-RC-1", "Acme", "Springfield", "IL").with_status(ScrapeStatus::Success),
            ]),
            results: vec![
                SearchResult::new("ACME INC", "1 Main St", "555-0100", "HQ", "Active", false)
                    .tagged("01-RC-1", false),
            ],
            ledger,
        };

        assert!(store.save(&state).is_err());
        assert_eq!(read_results(store.results_path()).unwrap(), state.results);
        assert_eq!(
            read_ledger(store.ledger_path()).unwrap(),
            vec![LedgerEntry::new("Acme", "Springfield", "Illinois")]
        );
        assert!(store.work_list_path().is_dir());
        assert!(!store.manifest_path().exists());
    }

    #[test]
    fn test_incompatible_manifest_version() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(temp_dir.path());
        fs::create_dir_all(temp_dir.path().join("outputs")).unwrap();
        let manifest = CheckpointManifest {
            version: CHECKPOINT_VERSION + 1,
            created_at: Utc::now(),
            case_count: 0,
            result_count: 0,
            ledger_count: 0,
            status_counts: BTreeMap::new(),
        };
        fs::write(store.manifest_path(), serde_json::to_string(&manifest).unwrap()).unwrap();

        assert!(store.load_manifest().is_err());
    }

    #[test]
    fn test_checkpoint_summary() {
        let state = CheckpointState {
            work_list: WorkList::new(vec![
                Case::new("1", "A", "X", "IL").with_status(ScrapeStatus::Success),
                Case::new("2", "B", "X", "IL").with_status(ScrapeStatus::Success),
                Case::new("3", "C", "X", "ZZ").with_status(ScrapeStatus::NoGeography),
            ]),
            ..Default::default()
        };
        let summary = state.summary(None);
        assert_eq!(summary.case_count, 3);
        assert_eq!(summary.status_counts.get("SUCCESS"), Some(&2));
        assert_eq!(summary.status_counts.get("NO_GEOGRAPHY"), Some(&1));
        assert!(summary.to_string().contains("Last checkpoint: never"));
    }
}
