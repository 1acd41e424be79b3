use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Per-case progress marker persisted in the work list.
///
/// The persisted form is the integer code used by earlier runs of the work
/// list (blank for unscraped). Comparisons are always on the enum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScrapeStatus {
    #[default]
    Unscraped,
    Success,              // 1
    NoSearchableName,     // 2
    NoGeography,          // 3
    ServerError,          // 4
    AlreadyScraped,       // 5
}

#[derive(Error, Debug, PartialEq)]
#[error("Unknown scrape status '{0}'")]
pub struct UnknownStatus(pub String);

impl ScrapeStatus {
    pub const ALL: [ScrapeStatus; 6] = [
        ScrapeStatus::Unscraped,
        ScrapeStatus::Success,
        ScrapeStatus::NoSearchableName,
        ScrapeStatus::NoGeography,
        ScrapeStatus::ServerError,
        ScrapeStatus::AlreadyScraped,
    ];

    /// Terminal cases are skipped on every later run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScrapeStatus::Success
                | ScrapeStatus::NoSearchableName
                | ScrapeStatus::NoGeography
                | ScrapeStatus::AlreadyScraped
        )
    }

    /// Value written to the `scrape_status` column
    pub fn code(&self) -> &'static str {
        match self {
            ScrapeStatus::Unscraped => "",
            ScrapeStatus::Success => "1",
            ScrapeStatus::NoSearchableName => "2",
            ScrapeStatus::NoGeography => "3",
            ScrapeStatus::ServerError => "4",
            ScrapeStatus::AlreadyScraped => "5",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScrapeStatus::Unscraped => "UNSCRAPED",
            ScrapeStatus::Success => "SUCCESS",
            ScrapeStatus::NoSearchableName => "NO_SEARCHABLE_NAME",
            ScrapeStatus::NoGeography => "NO_GEOGRAPHY",
            ScrapeStatus::ServerError => "SERVER_ERROR",
            ScrapeStatus::AlreadyScraped => "ALREADY_SCRAPED",
        }
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScrapeStatus {
    type Err = UnknownStatus;

    /// Accepts the integer codes and the upper-case names
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        ScrapeStatus::ALL
            .into_iter()
            .find(|status| status.code() == trimmed || status.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// One employer/location record to resolve against the directory
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub case_number: String,
    /// Employer name as it appears in the case dataset
    pub employer_name: String,
    pub clean_name_1: Option<String>,
    pub clean_name_2: Option<String>,
    pub city: String,
    /// State as given in the dataset (usually a two-letter code)
    pub state: String,
    pub scrape_status: ScrapeStatus,
    /// Work-list columns the driver does not interpret, keyed by header
    pub extra: BTreeMap<String, String>,
}

impl Case {
    pub fn new(
        case_number: impl Into<String>,
        employer_name: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            case_number: case_number.into(),
            employer_name: employer_name.into(),
            clean_name_1: None,
            clean_name_2: None,
            city: city.into(),
            state: state.into(),
            scrape_status: ScrapeStatus::Unscraped,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_clean_names(mut self, clean_name_1: Option<&str>, clean_name_2: Option<&str>) -> Self {
        self.clean_name_1 = clean_name_1.map(str::to_string);
        self.clean_name_2 = clean_name_2.map(str::to_string);
        self
    }

    pub fn with_status(mut self, status: ScrapeStatus) -> Self {
        self.scrape_status = status;
        self
    }
}

/// One directory listing returned for a search.
///
/// Produced by the directory client; the driver only attaches the owning
/// case number and the retry flag before appending it to the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub directory_name: String,
    pub directory_address: String,
    pub directory_phone: String,
    pub directory_type: String,
    pub status_text: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub email_requested: bool,
    #[serde(default)]
    pub case_number: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub retried: bool,
}

impl SearchResult {
    pub fn new(
        directory_name: impl Into<String>,
        directory_address: impl Into<String>,
        directory_phone: impl Into<String>,
        directory_type: impl Into<String>,
        status_text: impl Into<String>,
        email_requested: bool,
    ) -> Self {
        Self {
            directory_name: directory_name.into(),
            directory_address: directory_address.into(),
            directory_phone: directory_phone.into(),
            directory_type: directory_type.into(),
            status_text: status_text.into(),
            email_requested,
            case_number: String::new(),
            retried: false,
        }
    }

    /// Attach the owning case and whether it was processed on a retry pass
    pub fn tagged(mut self, case_number: &str, retried: bool) -> Self {
        self.case_number = case_number.to_string();
        self.retried = retried;
        self
    }
}

/// Accepts `true`/`false` in any case, `1`/`0` and blank (false).
/// Older result files were written with capitalized booleans.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid boolean '{}'", other))),
    }
}
