//! Scripted stand-ins for the directory and the identity rotator.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use employerfinder::directory::{DirectoryClient, SearchError};
use employerfinder::rotator::{IdentityRotator, RotateError};
use employerfinder::SearchResult;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub name: String,
    pub city: String,
    pub state: String,
}

#[derive(Default)]
struct DirectoryScript {
    responses: HashMap<String, VecDeque<Result<Vec<SearchResult>, SearchError>>>,
    calls: Vec<SearchCall>,
}

/// Answers searches from per-name queues; an unscripted name finds nothing.
/// Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct ScriptedDirectory {
    inner: Arc<Mutex<DirectoryScript>>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, name: &str, response: Result<Vec<SearchResult>, SearchError>) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .responses
            .entry(name.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn listings(&self, name: &str, results: Vec<SearchResult>) -> &Self {
        self.respond(name, Ok(results))
    }

    pub fn fail(&self, name: &str, error: SearchError) -> &Self {
        self.respond(name, Err(error))
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    pub fn searched_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.name).collect()
    }

    pub fn boxed(&self) -> Box<dyn DirectoryClient> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl DirectoryClient for ScriptedDirectory {
    async fn search(&self, name: &str, city: &str, state: &str) -> Result<Vec<SearchResult>, SearchError> {
        let mut script = self.inner.lock().unwrap();
        script.calls.push(SearchCall {
            name: name.to_string(),
            city: city.to_string(),
            state: state.to_string(),
        });
        script
            .responses
            .get_mut(name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Records when each rotation happened
#[derive(Clone, Default)]
pub struct CountingRotator {
    rotations: Arc<Mutex<Vec<Instant>>>,
}

impl CountingRotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.rotations.lock().unwrap().len()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.rotations.lock().unwrap().clone()
    }

    pub fn boxed(&self) -> Box<dyn IdentityRotator> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl IdentityRotator for CountingRotator {
    async fn rotate(&self) -> Result<(), RotateError> {
        self.rotations.lock().unwrap().push(Instant::now());
        Ok(())
    }
}

/// A listing with the fields tests care about
pub fn listing(name: &str, email_requested: bool) -> SearchResult {
    SearchResult::new(name, "1 Main St", "555-0100", "Corporate Office", "Active", email_requested)
}
