//! Per-user search selections, kept in one JSON file keyed by user id

use crate::catalog::{AttributeCatalog, SelectionOption};
use crate::error::{Error, Result};
use crate::matching::Threshold;
use crate::persist;
use crate::store::{FilterOptions, SearchParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub synergy_level: Threshold,
    pub selected_skin_tones: Vec<String>,
    pub selected_rarities: Vec<String>,
    pub filter_options: FilterOptions,
    pub last_search: Option<DateTime<Utc>>,
    pub last_results_count: usize,
    pub last_search_params: Option<SearchParams>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            synergy_level: Threshold::Two,
            selected_skin_tones: Vec::new(),
            selected_rarities: Vec::new(),
            filter_options: FilterOptions::default(),
            last_search: None,
            last_results_count: 0,
            last_search_params: None,
        }
    }
}

/// A user's selections laid over the catalog
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    pub skin_tones: Vec<SelectionOption>,
    pub rarities: Vec<SelectionOption>,
    pub synergy_level: Threshold,
    pub filter_options: FilterOptions,
}

impl SessionState {
    pub fn apply_to_catalog(&self, catalog: &AttributeCatalog) -> SelectionView {
        SelectionView {
            skin_tones: catalog.skin_tone_options(&self.selected_skin_tones),
            rarities: catalog.rarity_options(&self.selected_rarities),
            synergy_level: self.synergy_level,
            filter_options: self.filter_options,
        }
    }

    /// Record a finished search
    pub fn record_search(&mut self, params: &SearchParams, filter_options: FilterOptions) {
        self.synergy_level = params.synergy_level;
        self.selected_skin_tones = params.selected_skin_tones.clone();
        self.selected_rarities = params.selected_rarities.clone();
        self.filter_options = filter_options;
        self.last_search = Some(params.search_date);
        self.last_results_count = params.found_nfts;
        self.last_search_params = Some(params.clone());
    }
}

/// File-backed session states
///
/// All users share one file, so writers take `lock` across the whole
/// read-modify-write. Clones share the lock.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, SessionState> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return BTreeMap::new(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Session file {} unreadable: {}", self.path.display(), e);
            BTreeMap::new()
        })
    }

    /// State of one user, defaults when unknown or unreadable
    pub fn load(&self, user_id: &str) -> SessionState {
        self.read_all().remove(user_id).unwrap_or_default()
    }

    #[instrument(skip(self, state))]
    pub fn save(&self, user_id: &str, state: &SessionState) -> Result<()> {
        self.update(user_id, |current| *current = state.clone())
    }

    /// Modify one user's state in place and write it back
    pub fn update<F>(&self, user_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionState),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Internal { source: None })?;

        let mut all = self.read_all();
        f(all.entry(user_id.to_string()).or_default());
        persist::write_json_atomic(&self.path, &all)
    }
}
