use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use employerfinder::checkpoint::{CheckpointState, CheckpointStore, WorkList};
use employerfinder::config::AppConfig;
use employerfinder::driver::BatchDriver;
use employerfinder::{Case, DedupLedger};

use super::fakes::{CountingRotator, ScriptedDirectory};

pub const STATE_TABLE: &str = "state_abbr,state_name\nIL,Illinois\nOH,Ohio\nNY,New York\n";

/// A temporary directory holding one run's inputs and outputs, with a config
/// pointing into it. Delays are zeroed and retries disabled; tests that need
/// them set the fields on `config` directly.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub config: AppConfig,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let mut config = AppConfig::from_default_template().expect("default config");

        config.paths.work_list = dir.path().join("inputs").join("cases_to_scrape.csv");
        config.paths.results = dir.path().join("outputs").join("directory_results.csv");
        config.paths.ledger = dir.path().join("outputs").join("already_scraped.csv");
        config.paths.state_table = dir.path().join("inputs").join("state_identifiers.csv");
        config.paths.log_file = None;

        config.throttle.search_delay_ms = 0;
        config.throttle.post_case_delay_ms = 0;
        config.rotation.settle_delay_ms = 0;
        config.retry.max_retries = 0;

        fs::create_dir_all(dir.path().join("inputs")).unwrap();
        fs::write(&config.paths.state_table, STATE_TABLE).unwrap();

        Self { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::from_config(&self.config.paths)
    }

    /// Write a work list (and empty results and ledger) as a prior checkpoint
    pub fn seed(&self, cases: Vec<Case>) {
        self.seed_with_ledger(cases, DedupLedger::new());
    }

    pub fn seed_with_ledger(&self, cases: Vec<Case>, ledger: DedupLedger) {
        let state = CheckpointState {
            work_list: WorkList::new(cases),
            results: Vec::new(),
            ledger,
        };
        self.store().save(&state).expect("seed checkpoint");
    }

    /// Write only the work list file, as a user would before the first run
    pub fn write_work_list(&self, csv: &str) {
        fs::write(&self.config.paths.work_list, csv).unwrap();
    }

    pub fn load(&self) -> CheckpointState {
        self.store().load().expect("load checkpoint")
    }

    pub fn driver(&self, directory: &ScriptedDirectory, rotator: &CountingRotator) -> BatchDriver {
        BatchDriver::from_config(self.config.clone(), directory.boxed(), rotator.boxed())
            .expect("build driver")
            .with_seed(7)
    }

    /// Bytes of every checkpoint file that currently exists
    pub fn snapshot(&self) -> Vec<(PathBuf, Vec<u8>)> {
        let store = self.store();
        [
            store.work_list_path(),
            store.results_path(),
            store.ledger_path(),
            store.manifest_path(),
        ]
        .iter()
        .filter(|p| p.exists())
        .map(|p| (p.to_path_buf(), fs::read(p).unwrap()))
        .collect()
    }
}

pub fn case(number: &str, employer: &str, state: &str) -> Case {
    Case::new(number, employer, "Springfield", state)
}
