//! Batch driver: walks the work list once, resolving each case against the
//! directory under the rotation, cooldown and burst policy, and checkpoints
//! the work list, results and ledger together.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::case::{ScrapeStatus, SearchResult};
use crate::checkpoint::{CheckpointState, CheckpointStore};
use crate::config::AppConfig;
use crate::directory::{DirectoryClient, FailureClass, SearchError};
use crate::ledger::LedgerEntry;
use crate::logger::RunLogger;
use crate::org_normalizer::{candidate_names, NameCandidates};
use crate::rate_limit::{FailureWindow, RetryHelper, RotationSchedule};
use crate::rotator::IdentityRotator;
use crate::states::StateTable;

/// What to do when a candidate's (name, city, state) is already in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The whole case is resolved as ALREADY_SCRAPED
    FinishCase,
    /// Move on to the next candidate
    SkipCandidate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub name: String,
    pub on_duplicate: DuplicatePolicy,
}

/// Ordered name guesses for one case. Later candidates are only searched
/// while no earlier result has `email_requested` set, and results from a
/// later candidate take precedence over earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    pub candidates: Vec<SearchCandidate>,
}

impl SearchPlan {
    /// A primary already in the ledger finishes the case as ALREADY_SCRAPED.
    /// A secondary already in the ledger is only skipped, and the case keeps
    /// the primary's results as SUCCESS.
    pub fn from_names(names: &NameCandidates) -> Self {
        let mut candidates = vec![SearchCandidate {
            name: names.primary.clone(),
            on_duplicate: DuplicatePolicy::FinishCase,
        }];
        if let Some(secondary) = &names.secondary {
            if secondary != &names.primary {
                candidates.push(SearchCandidate {
                    name: secondary.clone(),
                    on_duplicate: DuplicatePolicy::SkipCandidate,
                });
            }
        }
        Self { candidates }
    }

    /// Results that make further candidates pointless
    pub fn is_actionable(results: &[SearchResult]) -> bool {
        results.iter().any(|r| r.email_requested)
    }
}

/// Everything one case produced. Applied to the checkpoint state when the
/// case finishes. A classified failure still carries the searches that
/// completed before it, so their ledger rows and results are kept together.
#[derive(Debug, Clone, PartialEq)]
struct CaseOutcome {
    status: ScrapeStatus,
    results: Vec<SearchResult>,
    ledger: Vec<LedgerEntry>,
}

impl CaseOutcome {
    fn status_only(status: ScrapeStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
            ledger: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cases_seen: usize,
    pub skipped_terminal: usize,
    /// Outcome counts for cases processed in this run, keyed by status name
    pub outcomes: BTreeMap<String, usize>,
    pub searches: usize,
    pub rotations: usize,
    pub burst_pauses: usize,
    pub hard_blocks: usize,
    pub results_appended: usize,
    pub checkpoints_written: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn outcome_count(&self, status: ScrapeStatus) -> usize {
        self.outcomes.get(status.name()).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== RUN SUMMARY ===")?;
        writeln!(f, "Cases seen: {}", self.cases_seen)?;
        writeln!(f, "Skipped (already terminal): {}", self.skipped_terminal)?;
        for (status, count) in &self.outcomes {
            writeln!(f, "  {}: {}", status, count)?;
        }
        writeln!(f, "Directory searches: {}", self.searches)?;
        writeln!(f, "Identity rotations: {}", self.rotations)?;
        writeln!(f, "Hard blocks: {}", self.hard_blocks)?;
        writeln!(f, "Burst pauses: {}", self.burst_pauses)?;
        writeln!(f, "Results appended: {}", self.results_appended)?;
        writeln!(f, "Checkpoints written: {}", self.checkpoints_written)?;
        if self.interrupted {
            writeln!(f, "Run interrupted before the end of the work list")?;
        }
        write!(f, "===================")
    }
}

pub struct BatchDriver {
    config: AppConfig,
    store: CheckpointStore,
    state: CheckpointState,
    states: StateTable,
    client: Box<dyn DirectoryClient>,
    rotator: Box<dyn IdentityRotator>,
    logger: RunLogger,
    schedule: RotationSchedule,
    failures: FailureWindow,
    retry: RetryHelper,
    interrupt: Arc<AtomicBool>,
    pending_changes: usize,
    summary: RunSummary,
}

impl BatchDriver {
    pub fn new(
        config: AppConfig,
        store: CheckpointStore,
        state: CheckpointState,
        states: StateTable,
        client: Box<dyn DirectoryClient>,
        rotator: Box<dyn IdentityRotator>,
    ) -> Self {
        let schedule = RotationSchedule::new(&config.rotation, StdRng::from_entropy());
        let failures = FailureWindow::new(config.burst.horizon());
        let retry = RetryHelper::new(&config.retry);

        Self {
            config,
            store,
            state,
            states,
            client,
            rotator,
            logger: RunLogger::quiet(),
            schedule,
            failures,
            retry,
            interrupt: Arc::new(AtomicBool::new(false)),
            pending_changes: 0,
            summary: RunSummary::default(),
        }
    }

    /// Load the checkpoint and state table named in the config
    pub fn from_config(
        config: AppConfig,
        client: Box<dyn DirectoryClient>,
        rotator: Box<dyn IdentityRotator>,
    ) -> Result<Self> {
        let store = CheckpointStore::from_config(&config.paths);
        let state = store.load()?;
        let states = StateTable::load(&config.paths.state_table)?;
        Ok(Self::new(config, store, state, states, client, rotator))
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Fixed seed for the rotation cadence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.schedule = RotationSchedule::new(&self.config.rotation, StdRng::seed_from_u64(seed));
        self
    }

    /// Checked between cases; once set the run checkpoints and stops
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn logger(&self) -> &RunLogger {
        &self.logger
    }

    pub fn rotation_countdown(&self) -> i64 {
        self.schedule.remaining()
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let total = self.state.work_list.len();
        self.logger.info(&format!(
            "Starting run: {} cases, {} results, {} ledger entries",
            total,
            self.state.results.len(),
            self.state.ledger.len()
        ));
        self.logger.start_progress(total as u64);

        for index in 0..total {
            if self.interrupt.load(Ordering::SeqCst) {
                self.logger.warn("Interrupt received, stopping before the next case");
                self.summary.interrupted = true;
                break;
            }

            self.summary.cases_seen += 1;
            let outcome = match self.process_case(index, total).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.logger.error(&format!("Stopping run: {:#}", e));
                    if self.pending_changes > 0 {
                        if let Err(save_err) = self.checkpoint() {
                            self.logger.error(&format!("Final checkpoint failed: {:#}", save_err));
                        }
                    }
                    self.logger.finish_progress("Run aborted");
                    return Err(e);
                }
            };

            if let Some(outcome) = outcome {
                self.commit(index, outcome, total);
                if self.pending_changes >= self.config.checkpoint.interval.max(1) {
                    self.checkpoint()?;
                }
            }
            self.logger.advance_progress();
        }

        if self.pending_changes > 0 {
            self.checkpoint()?;
        }

        self.logger.finish_progress("Run finished");
        Ok(self.summary.clone())
    }

    /// `None` when the case was already terminal and nothing changed
    async fn process_case(&mut self, index: usize, total: usize) -> Result<Option<CaseOutcome>> {
        let case = self.state.work_list.cases[index].clone();

        if case.scrape_status.is_terminal() {
            self.summary.skipped_terminal += 1;
            debug!("Skipping {} ({})", case.case_number, case.scrape_status);
            return Ok(None);
        }

        self.logger.log_case_start(index, total, &case);
        let retried = case.scrape_status == ScrapeStatus::ServerError;

        let city = case.city.trim().to_string();
        let state = match self.states.canonical(&case.state) {
            Some(state) if !city.is_empty() => state.to_string(),
            _ => {
                debug!("No usable geography for {}: '{}', '{}'", case.case_number, case.city, case.state);
                return Ok(Some(CaseOutcome::status_only(ScrapeStatus::NoGeography)));
            }
        };

        let names = candidate_names(
            &case.employer_name,
            case.clean_name_1.as_deref(),
            case.clean_name_2.as_deref(),
            self.config.names.max_search_chars,
        );
        if names.primary.is_empty() {
            return Ok(Some(CaseOutcome::status_only(ScrapeStatus::NoSearchableName)));
        }

        if self.schedule.is_due() {
            self.rotate().await;
        }

        let plan = SearchPlan::from_names(&names);
        let mut ledger = Vec::new();
        let mut found: Vec<Vec<SearchResult>> = Vec::new();

        for candidate in &plan.candidates {
            let entry = LedgerEntry::new(candidate.name.as_str(), city.as_str(), state.as_str());
            if self.state.ledger.contains_entry(&entry) || ledger.contains(&entry) {
                match candidate.on_duplicate {
                    DuplicatePolicy::FinishCase => {
                        debug!("'{}' in {}, {} already searched", candidate.name, city, state);
                        return Ok(Some(CaseOutcome::status_only(ScrapeStatus::AlreadyScraped)));
                    }
                    DuplicatePolicy::SkipCandidate => continue,
                }
            }

            match self.search(&candidate.name, &city, &state).await {
                Ok(results) => {
                    ledger.push(entry);
                    let actionable = SearchPlan::is_actionable(&results);
                    found.push(results);
                    if actionable {
                        break;
                    }
                }
                Err(e) => {
                    self.handle_search_failure(&case.case_number, e).await?;
                    return Ok(Some(CaseOutcome {
                        status: ScrapeStatus::ServerError,
                        results: select_results(found, &case.case_number, retried),
                        ledger,
                    }));
                }
            }
        }

        let results = select_results(found, &case.case_number, retried);

        sleep(self.config.throttle.post_case_delay()).await;

        Ok(Some(CaseOutcome {
            status: ScrapeStatus::Success,
            results,
            ledger,
        }))
    }

    async fn search(&mut self, name: &str, city: &str, state: &str) -> Result<Vec<SearchResult>, SearchError> {
        sleep(self.config.throttle.search_delay()).await;
        self.schedule.record_search();
        self.summary.searches += 1;

        let client = &self.client;
        self.retry.with_retry(|| client.search(name, city, state)).await
    }

    /// Classified failures leave the case SERVER_ERROR; unclassified ones stop the run
    async fn handle_search_failure(&mut self, case_number: &str, error: SearchError) -> Result<()> {
        match error.class() {
            FailureClass::Transient => {
                warn!("Transient directory failure for {}: {}", case_number, error);
                self.schedule.penalize();
                self.record_failure().await;
            }
            FailureClass::HardBlock => {
                warn!("Directory blocked the caller during {}: {}", case_number, error);
                self.summary.hard_blocks += 1;
                self.record_failure().await;

                let cooldown = self.config.cooldown.hard_block();
                self.logger.log_pause("Access denied", cooldown.as_secs());
                sleep(cooldown).await;
                self.rotate().await;
            }
            FailureClass::Fatal => {
                return Err(anyhow!(error).context(format!("Directory search failed for case {}", case_number)));
            }
        }
        Ok(())
    }

    async fn record_failure(&mut self) {
        self.failures.record();
        if !self.failures.is_burst(self.config.burst.threshold) {
            return;
        }

        let pause = self.config.burst.pause();
        self.logger.log_pause(
            &format!("{} failures within {}s", self.failures.len(), self.config.burst.horizon_secs),
            pause.as_secs(),
        );
        self.summary.burst_pauses += 1;
        self.failures.clear();
        sleep(pause).await;
        self.schedule.force();
    }

    /// Best effort: a failed rotation is logged and the run continues
    async fn rotate(&mut self) {
        let rotator = &self.rotator;
        if let Err(e) = self.retry.with_retry(|| rotator.rotate()).await {
            self.logger.warn(&format!("Identity rotation failed: {}", e));
        }
        self.summary.rotations += 1;
        let next = self.schedule.reseed();
        self.logger.log_rotation(next);
    }

    fn commit(&mut self, index: usize, outcome: CaseOutcome, total: usize) {
        let case = &mut self.state.work_list.cases[index];
        case.scrape_status = outcome.status;
        self.logger
            .log_case_outcome(index, total, case, outcome.status, outcome.results.len());

        *self.summary.outcomes.entry(outcome.status.name().to_string()).or_insert(0) += 1;
        self.summary.results_appended += outcome.results.len();
        self.state.results.extend(outcome.results);
        for entry in outcome.ledger {
            self.state.ledger.insert(entry);
        }
        self.pending_changes += 1;
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.store.save(&self.state).context("Checkpoint failed")?;
        self.pending_changes = 0;
        self.summary.checkpoints_written += 1;
        self.logger.log_checkpoint(
            self.state.work_list.len(),
            self.state.results.len(),
            self.state.ledger.len(),
        );
        info!("Checkpoint written to {}", self.store.work_list_path().display());
        Ok(())
    }
}

/// The last candidate that returned listings wins
fn select_results(found: Vec<Vec<SearchResult>>, case_number: &str, retried: bool) -> Vec<SearchResult> {
    found
        .into_iter()
        .rev()
        .find(|results| !results.is_empty())
        .unwrap_or_default()
        .into_iter()
        .map(|result| result.tagged(case_number, retried))
        .collect()
}
