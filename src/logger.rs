use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::case::{Case, ScrapeStatus};
use crate::driver::RunSummary;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,    // Only show progress bar and final summary
    Summary = 1,   // One line per case (default)
    Detailed = 2,  // Rotations, pauses, warnings
    Debug = 3,     // Everything, including per-search detail
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// Operator-facing run log: console lines, progress bar and an optional
/// append-only log file that is written as messages arrive.
pub struct RunLogger {
    verbosity: VerbosityLevel,
    console: bool,
    progress_bar: Mutex<Option<ProgressBar>>,
    log_file: Option<Mutex<File>>,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            console: true,
            progress_bar: Mutex::new(None),
            log_file: None,
        }
    }

    /// Also append every emitted line to `path`
    pub fn with_log_file(verbosity: VerbosityLevel, path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            log_file: Some(Mutex::new(file)),
            ..Self::new(verbosity)
        })
    }

    /// No console output and no progress bar
    pub fn quiet() -> Self {
        Self {
            console: false,
            ..Self::new(VerbosityLevel::Silent)
        }
    }

    pub fn info(&self, message: &str) {
        self.emit(VerbosityLevel::Summary, "INFO", message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(VerbosityLevel::Detailed, "WARN", message);
    }

    pub fn error(&self, message: &str) {
        // Errors are never filtered out
        self.emit(VerbosityLevel::Silent, "ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        self.emit(VerbosityLevel::Debug, "DEBUG", message);
    }

    fn emit(&self, min_level: VerbosityLevel, level: &str, message: &str) {
        let line = format!("[{}] {}: {}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), level, message);

        // The file keeps warnings even when the console is less verbose
        if min_level <= VerbosityLevel::Detailed || self.verbosity >= min_level {
            self.write_to_file(&line);
        }

        if !self.console || self.verbosity < min_level {
            return;
        }

        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.println(line);
                return;
            }
        }
        eprintln!("{}", line);
    }

    fn write_to_file(&self, line: &str) {
        if let Some(file) = &self.log_file {
            if let Ok(mut file) = file.lock() {
                // A failing log file must not stop the run
                let _ = writeln!(file, "{}", line);
            }
        }
    }

    pub fn start_progress(&self, total: u64) {
        if !self.console {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        if let Ok(mut guard) = self.progress_bar.lock() {
            *guard = Some(pb);
        }
    }

    pub fn set_progress_message(&self, message: &str) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(message.to_string());
            }
        }
    }

    pub fn advance_progress(&self) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.inc(1);
            }
        }
    }

    pub fn finish_progress(&self, final_message: &str) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
        self.info(final_message);
    }

    pub fn log_case_start(&self, index: usize, total: usize, case: &Case) {
        self.set_progress_message(&case.case_number);
        self.debug(&format!(
            "[{}/{}] {} '{}' ({}, {})",
            index + 1,
            total,
            case.case_number,
            case.employer_name,
            case.city,
            case.state
        ));
    }

    pub fn log_case_outcome(&self, index: usize, total: usize, case: &Case, status: ScrapeStatus, result_count: usize) {
        let message = format!(
            "[{}/{}] {} '{}' -> {} ({} results)",
            index + 1,
            total,
            case.case_number,
            case.employer_name,
            status,
            result_count
        );
        match status {
            ScrapeStatus::ServerError => self.warn(&message),
            _ => self.info(&message),
        }
    }

    pub fn log_rotation(&self, next_countdown: i64) {
        self.warn(&format!("Rotated network identity, next rotation in {} searches", next_countdown));
    }

    pub fn log_pause(&self, reason: &str, seconds: u64) {
        self.warn(&format!("{}: pausing for {}s", reason, seconds));
    }

    pub fn log_checkpoint(&self, cases: usize, results: usize, ledger: usize) {
        self.debug(&format!(
            "Checkpoint written: {} cases, {} results, {} ledger entries",
            cases, results, ledger
        ));
    }

    /// Printed regardless of verbosity
    pub fn print_final_summary(&self, summary: &RunSummary) {
        self.write_to_file(&summary.to_string());
        if !self.console {
            return;
        }

        print!("\x1b[2K\r");
        let _ = io::stdout().flush();
        println!("\n{}", summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(5), VerbosityLevel::Debug);
    }

    #[test]
    fn test_log_file_receives_lines_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let logger = RunLogger::with_log_file(VerbosityLevel::Summary, &path).unwrap();

        logger.info("first case done");
        logger.warn("rotation failed");
        logger.debug("hidden detail");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("INFO: first case done"));
        assert!(content.contains("WARN: rotation failed"));
        assert!(!content.contains("hidden detail"));
    }

    #[test]
    fn test_log_file_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");

        RunLogger::with_log_file(VerbosityLevel::Silent, &path).unwrap().error("one");
        RunLogger::with_log_file(VerbosityLevel::Silent, &path).unwrap().error("two");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
