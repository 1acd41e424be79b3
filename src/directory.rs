//! Employer directory lookup boundary.
//!
//! The driver only sees [`DirectoryClient`]; the shipped implementation shells
//! out to an external search command that prints one JSON listing per line.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::case::SearchResult;
use crate::config::DirectoryConfig;
use crate::rate_limit::Retryable;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Rate limited by directory: {0}")]
    RateLimited(String),

    #[error("Directory server error: {0}")]
    ServerError(String),

    #[error("Access denied by directory: {0}")]
    AccessDenied(String),

    #[error("Results page not ready: {0}")]
    PageNotReady(String),

    #[error("Unexpected directory failure: {0}")]
    Unexpected(String),
}

/// How the driver reacts to a failed search once retries are exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Mark the case for retry on a later run and keep going
    Transient,
    /// Cool down and rotate before touching the directory again
    HardBlock,
    /// Stop the run
    Fatal,
}

impl SearchError {
    pub fn class(&self) -> FailureClass {
        match self {
            SearchError::RateLimited(_)
            | SearchError::ServerError(_)
            | SearchError::PageNotReady(_) => FailureClass::Transient,
            SearchError::AccessDenied(_) => FailureClass::HardBlock,
            SearchError::Unexpected(_) => FailureClass::Fatal,
        }
    }
}

impl Retryable for SearchError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::RateLimited(_) | SearchError::ServerError(_) | SearchError::PageNotReady(_)
        )
    }
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Search the directory for an employer name within a city and state.
    /// An empty vector means the search succeeded with no listings.
    async fn search(&self, name: &str, city: &str, state: &str) -> Result<Vec<SearchResult>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct ListingJsonLine {
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    phone: String,
    #[serde(default, rename = "type")]
    listing_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    email_requested: bool,
}

/// Runs the configured search command once per query
pub struct CommandDirectoryClient {
    config: DirectoryConfig,
}

impl CommandDirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Argument list with `{name}`, `{city}` and `{state}` filled in
    pub fn build_args(&self, name: &str, city: &str, state: &str) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{name}", name)
                    .replace("{city}", city)
                    .replace("{state}", state)
            })
            .collect()
    }

    fn classify_exit(&self, code: Option<i32>, stderr: &str) -> SearchError {
        let detail = stderr.trim().to_string();
        match code {
            Some(c) if c == self.config.rate_limited_exit_code => SearchError::RateLimited(detail),
            Some(c) if c == self.config.server_error_exit_code => SearchError::ServerError(detail),
            Some(c) if c == self.config.access_denied_exit_code => SearchError::AccessDenied(detail),
            Some(c) if c == self.config.not_ready_exit_code => SearchError::PageNotReady(detail),
            Some(c) => SearchError::Unexpected(format!("exit {}: {}", c, detail)),
            None => SearchError::Unexpected(format!("terminated by signal: {}", detail)),
        }
    }
}

#[async_trait]
impl DirectoryClient for CommandDirectoryClient {
    async fn search(&self, name: &str, city: &str, state: &str) -> Result<Vec<SearchResult>, SearchError> {
        debug!("Searching directory for '{}' in {}, {}", name, city, state);

        let output = Command::new(&self.config.command)
            .args(self.build_args(name, city, state))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SearchError::Unexpected(format!("Failed to spawn {}: {}", self.config.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.classify_exit(output.status.code(), &stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let results = parse_listing_output(&stdout)?;
        debug!("Directory returned {} listings for '{}'", results.len(), name);
        Ok(results)
    }
}

/// Parse JSON-lines listing output. Blank lines are skipped; any other
/// malformed line means the page layout changed and is reported as unexpected.
pub fn parse_listing_output(output: &str) -> Result<Vec<SearchResult>, SearchError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<ListingJsonLine>(line)
                .map(|parsed| {
                    SearchResult::new(
                        parsed.name,
                        parsed.address,
                        parsed.phone,
                        parsed.listing_type,
                        parsed.status,
                        parsed.email_requested,
                    )
                })
                .map_err(|e| SearchError::Unexpected(format!("Unparseable listing '{}': {}", line, e)))
        })
        .collect()
}
