use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

use crate::domain::models::Show;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Serialize, Deserialize, Default)]
struct StoreFile {
    shows: BTreeMap<String, Show>, // name_on_disk -> show
}

#[derive(Debug, Default)]
struct StoreState {
    shows: BTreeMap<String, Show>,
    revision: u64,
}

/// JSON-file backed show catalog. One record per `name_on_disk`.
///
/// Readers get clones; writers go through [`ShowStore::save`]. Every save
/// bumps a revision counter that cached views use to detect staleness.
#[derive(Debug, Default)]
pub struct ShowStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ShowStore {
    /// Opens the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt one is an error.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let shows = if path.exists() {
            let content = fs::read_to_string(path)?;
            let file: StoreFile = serde_json::from_str(&content)?;
            file.shows
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), shows = shows.len(), "opened show store");
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(StoreState { shows, revision: 0 }),
            locks: Mutex::default(),
        })
    }

    /// A store that never touches the disk.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn find(&self, name_on_disk: &str) -> Option<Show> {
        self.state().shows.get(name_on_disk).cloned()
    }

    /// Every show, ordered by disk name.
    pub fn all(&self) -> Vec<Show> {
        self.state().shows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().shows.len()
    }

    pub fn revision(&self) -> u64 {
        self.state().revision
    }

    /// Inserts a new show, refusing to replace an existing record.
    pub fn create(&self, name_on_disk: &str) -> StoreResult<Show> {
        let name_on_disk = name_on_disk.trim();
        if name_on_disk.is_empty() {
            return Err(StoreError::MissingDiskName);
        }
        let mut state = self.state();
        if state.shows.contains_key(name_on_disk) {
            return Err(StoreError::DuplicateShow(name_on_disk.to_string()));
        }
        let show = Show::new(name_on_disk);
        state.shows.insert(show.name_on_disk.clone(), show.clone());
        state.revision += 1;
        self.persist(&state)?;
        Ok(show)
    }

    pub fn create_or_get(&self, name_on_disk: &str) -> StoreResult<Show> {
        match self.create(name_on_disk) {
            Err(StoreError::DuplicateShow(name)) => {
                self.find(&name).ok_or(StoreError::NotFound(name))
            }
            other => other,
        }
    }

    /// Normalizes and writes `show`, replacing any record with the same disk name.
    pub fn save(&self, show: &Show) -> StoreResult<Show> {
        if show.name_on_disk.trim().is_empty() {
            return Err(StoreError::MissingDiskName);
        }
        let mut show = show.clone();
        show.normalize();
        let mut state = self.state();
        state.shows.insert(show.name_on_disk.clone(), show.clone());
        state.revision += 1;
        self.persist(&state)?;
        Ok(show)
    }

    pub fn remove(&self, name_on_disk: &str) -> StoreResult<Show> {
        let mut state = self.state();
        let show = state
            .shows
            .remove(name_on_disk)
            .ok_or_else(|| StoreError::NotFound(name_on_disk.to_string()))?;
        state.revision += 1;
        self.persist(&state)?;
        Ok(show)
    }

    /// Per-show mutex. Hold it across a find/mutate/save sequence so two
    /// workers never interleave updates to the same show.
    pub fn show_lock(&self, name_on_disk: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name_on_disk.to_string())
            .or_default()
            .clone()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let file = StoreFile {
            shows: state.shows.clone(),
        };
        // Staged in the same directory; the rename replaces the catalog atomically.
        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, &file)?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
