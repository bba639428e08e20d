//! Deterministic fixture replay for reproducible evaluation runs.
//!
//! When a fixture file is configured and loads, the store is the sole source
//! of truth for the whole episode: search queries and fetch URLs are answered
//! from pre-recorded results, and a miss is a structured "unsupported" error,
//! never a fall-through to live providers.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use taskrig_core::SearchResult;

use crate::textprep::scrub;

fn fixtures_path_from_env() -> Option<String> {
    std::env::var("TASKRIG_FIXTURES")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    searches: BTreeMap<String, Vec<SearchResult>>,
    #[serde(default)]
    fetches: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureStore {
    searches: BTreeMap<String, Vec<SearchResult>>,
    fetches: BTreeMap<String, String>,
    loaded: bool,
}

impl FixtureStore {
    /// Load from `TASKRIG_FIXTURES` if set. Load failure degrades to an empty
    /// store (every lookup misses) rather than failing process startup.
    pub fn from_env() -> Self {
        match fixtures_path_from_env() {
            Some(path) => Self::load(Path::new(&path)),
            None => Self::default(),
        }
    }

    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "fixture file unreadable; using empty store");
                return Self::default();
            }
        };
        let parsed: FixtureFile = match serde_json::from_str(&raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "fixture file unparsable; using empty store");
                return Self::default();
            }
        };

        // Query keys are normalized at load time so lookup is a plain map get.
        let mut searches = BTreeMap::new();
        for (k, v) in parsed.searches {
            searches.insert(scrub(&k), v);
        }
        let mut fetches = BTreeMap::new();
        for (k, v) in parsed.fetches {
            fetches.insert(k.trim().to_string(), v);
        }

        tracing::info!(
            path = %path.display(),
            searches = searches.len(),
            fetches = fetches.len(),
            "fixture store loaded"
        );
        Self {
            searches,
            fetches,
            loaded: true,
        }
    }

    /// True when a fixture file was successfully loaded.
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn lookup_search(&self, query: &str) -> Option<&[SearchResult]> {
        self.searches.get(&scrub(query)).map(|v| v.as_slice())
    }

    pub fn lookup_fetch(&self, url: &str) -> Option<&str> {
        self.fetches.get(url.trim()).map(|s| s.as_str())
    }
}
