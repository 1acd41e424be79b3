pub mod case;
pub mod checkpoint;
pub mod cli;
pub mod commands;
pub mod config;
pub mod directory;
pub mod driver;
pub mod ledger;
pub mod logger;
pub mod org_normalizer;
pub mod rate_limit;
pub mod rotator;
pub mod states;

pub use case::{Case, ScrapeStatus, SearchResult};
pub use checkpoint::{CheckpointState, CheckpointStore, WorkList};
pub use directory::{DirectoryClient, FailureClass, SearchError};
pub use driver::{BatchDriver, RunSummary};
pub use ledger::{DedupLedger, LedgerEntry};
pub use rotator::{IdentityRotator, RotateError};
