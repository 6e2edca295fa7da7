//! Persistence store
//!
//! A single file holds every table (shadow copies, app state, preferences,
//! projects). Updates are applied to a copy of the tables, written
//! atomically, and only then become visible, so a failed write leaves both
//! the file and the in-memory tables as they were.

pub mod format;
pub mod guard;

use chrono::{DateTime, Utc};
use format::{FormatError, ProjectRow, ShadowRow, Tables};
use guard::{GuardReport, GuardState, IntegrityGuard, StoreSlot};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use format::PreferenceValue;

/// Store handle shared between the controller and the persistence worker
pub type SharedDatabase = Arc<Mutex<Database>>;

pub const DEFAULT_STORE_FILE: &str = "settings.db";

/// Live store, its backup slot and its corruption marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub live: PathBuf,
    pub backup: PathBuf,
    pub marker: PathBuf,
}

impl StorePaths {
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            live: dir.join(file_name),
            backup: dir.join(format!("{}.bak", file_name)),
            marker: dir.join(format!("{}.corrupt", file_name)),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Format(FormatError),
    /// The store is closed (during a restore)
    Closed,
    /// Restore requested while no corruption marker exists
    NoCorruption,
    NoBackup(PathBuf),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Format(e) => write!(f, "{}", e),
            Self::Closed => write!(f, "store is closed"),
            Self::NoCorruption => write!(f, "store is not flagged as corrupt"),
            Self::NoBackup(path) => write!(f, "no backup found at {:?}", path),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<FormatError> for StoreError {
    fn from(e: FormatError) -> Self {
        StoreError::Format(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowRecord {
    pub path: PathBuf,
    pub content: String,
    pub is_dirty: bool,
    pub updated_at: DateTime<Utc>,
}

impl ShadowRecord {
    fn from_row(key: &str, row: &ShadowRow) -> Self {
        Self {
            path: PathBuf::from(key),
            content: row.content.clone(),
            is_dirty: row.is_dirty,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub path: PathBuf,
    pub name: String,
    pub last_opened: DateTime<Utc>,
}

fn key_of(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

enum Backing {
    File(PathBuf),
    Memory,
}

/// Open store: the tables plus where they are committed
struct Store {
    backing: Backing,
    tables: Tables,
}

impl Store {
    /// Open the store at `path`, creating an empty one if none exists
    fn open_file(path: &Path) -> Result<Self, StoreError> {
        let tables = if path.exists() {
            format::verify_file(path)?
        } else {
            let tables = Tables::default();
            format::write_atomic(path, &format::encode(&tables)?)?;
            tables
        };
        Ok(Self {
            backing: Backing::File(path.to_path_buf()),
            tables,
        })
    }

    fn volatile() -> Self {
        Self {
            backing: Backing::Memory,
            tables: Tables::default(),
        }
    }

    fn is_volatile(&self) -> bool {
        matches!(self.backing, Backing::Memory)
    }

    fn update<R>(&mut self, f: impl FnOnce(&mut Tables) -> R) -> Result<R, StoreError> {
        let mut next = self.tables.clone();
        let result = f(&mut next);
        if let Backing::File(path) = &self.backing {
            format::write_atomic(path, &format::encode(&next)?)?;
        }
        self.tables = next;
        Ok(result)
    }
}

/// Reopen whatever store can be opened: the live file, else a fresh file,
/// else memory
fn open_usable(live: &Path) -> Store {
    match Store::open_file(live) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("Could not open store {:?}: {}", live, e);
            if live.exists() {
                if let Err(e) = std::fs::remove_file(live) {
                    tracing::warn!("Could not remove unusable store: {}", e);
                }
            }
            Store::open_file(live).unwrap_or_else(|e| {
                tracing::error!("Falling back to in-memory store: {}", e);
                Store::volatile()
            })
        }
    }
}

pub struct Database {
    paths: StorePaths,
    slot: StoreSlot,
    report: GuardReport,
    store: Option<Store>,
}

impl Database {
    /// Run the integrity guard and open the store it settles on. Nothing
    /// reads the store before this returns.
    pub fn init(paths: StorePaths) -> Result<Self, StoreError> {
        if let Some(parent) = paths.live.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (report, slot) = IntegrityGuard::new(paths.clone()).run();
        let store = match &slot {
            StoreSlot::Volatile => Store::volatile(),
            StoreSlot::Live | StoreSlot::CorruptMarked { .. } => open_usable(&paths.live),
        };
        tracing::info!(
            "Store opened at {:?} ({})",
            paths.live,
            if store.is_volatile() { "in memory" } else { "on disk" }
        );
        Ok(Self {
            paths,
            slot,
            report,
            store: Some(store),
        })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn slot(&self) -> &StoreSlot {
        &self.slot
    }

    pub fn report(&self) -> &GuardReport {
        &self.report
    }

    /// True while a corrupt store is parked at the marker path
    pub fn has_corruption(&self) -> bool {
        matches!(self.slot, StoreSlot::CorruptMarked { .. })
    }

    pub fn is_volatile(&self) -> bool {
        self.store.as_ref().map_or(true, Store::is_volatile)
    }

    /// Replace the live store with the backup and drop the marker.
    ///
    /// On failure the store is reopened (the current live file if it still
    /// verifies, else a fresh one), the marker is kept, and the error is
    /// returned.
    pub fn restore_backup(&mut self) -> Result<(), StoreError> {
        if !self.has_corruption() {
            return Err(StoreError::NoCorruption);
        }
        // release every handle on the live store before replacing it
        self.store = None;

        match self.replace_live_with_backup() {
            Ok(store) => {
                self.store = Some(store);
                if let Err(e) = std::fs::remove_file(&self.paths.marker) {
                    tracing::warn!("Failed to remove corruption marker: {}", e);
                }
                self.slot = StoreSlot::Live;
                self.report.state = GuardState::Healthy;
                tracing::info!("Store restored from {:?}", self.paths.backup);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Store restore failed: {}", e);
                self.store = Some(open_usable(&self.paths.live));
                Err(e)
            }
        }
    }

    fn replace_live_with_backup(&self) -> Result<Store, StoreError> {
        let paths = &self.paths;
        if !paths.backup.exists() {
            return Err(StoreError::NoBackup(paths.backup.clone()));
        }
        let bytes = std::fs::read(&paths.backup)?;
        format::decode(&bytes)?;
        format::write_atomic(&paths.live, &bytes)?;
        Store::open_file(&paths.live)
    }

    /// Keep the fresh store and forget the corrupt one
    pub fn dismiss_corruption(&mut self) -> Result<(), StoreError> {
        if !self.has_corruption() {
            return Err(StoreError::NoCorruption);
        }
        if self.paths.marker.exists() {
            std::fs::remove_file(&self.paths.marker)?;
        }
        self.slot = StoreSlot::Live;
        self.report.state = GuardState::Healthy;
        tracing::info!("Corruption marker dismissed");
        Ok(())
    }

    /// Release the store; later operations fail with [`StoreError::Closed`]
    pub fn close(&mut self) {
        self.store = None;
    }

    fn tables(&self) -> Result<&Tables, StoreError> {
        self.store.as_ref().map(|s| &s.tables).ok_or(StoreError::Closed)
    }

    fn update<R>(&mut self, f: impl FnOnce(&mut Tables) -> R) -> Result<R, StoreError> {
        self.store.as_mut().ok_or(StoreError::Closed)?.update(f)
    }

    // shadow_files

    pub fn write_shadow(&mut self, path: &Path, content: &str, is_dirty: bool) -> Result<(), StoreError> {
        let row = ShadowRow {
            content: content.to_string(),
            is_dirty,
            updated_at: Utc::now(),
        };
        self.update(|t| {
            t.shadow_files.insert(key_of(path), row);
        })
    }

    pub fn read_shadow(&self, path: &Path) -> Result<Option<ShadowRecord>, StoreError> {
        let key = key_of(path);
        Ok(self
            .tables()?
            .shadow_files
            .get(&key)
            .map(|row| ShadowRecord::from_row(&key, row)))
    }

    /// Returns true if a record was removed
    pub fn clear_shadow(&mut self, path: &Path) -> Result<bool, StoreError> {
        let key = key_of(path);
        if !self.tables()?.shadow_files.contains_key(&key) {
            return Ok(false);
        }
        self.update(|t| t.shadow_files.remove(&key).is_some())
    }

    /// Records holding unsaved changes, most recent first
    pub fn dirty_shadows(&self) -> Result<Vec<ShadowRecord>, StoreError> {
        let mut records: Vec<_> = self
            .tables()?
            .shadow_files
            .iter()
            .filter(|(_, row)| row.is_dirty)
            .map(|(key, row)| ShadowRecord::from_row(key, row))
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    // app_state

    pub fn set_app_state(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|t| {
            t.app_state.insert(key.to_string(), value.to_string());
        })
    }

    pub fn app_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables()?.app_state.get(key).cloned())
    }

    // preferences

    pub fn set_preference(&mut self, key: &str, value: PreferenceValue) -> Result<(), StoreError> {
        self.update(|t| {
            t.preferences.insert(key.to_string(), value);
        })
    }

    pub fn preference(&self, key: &str) -> Result<Option<PreferenceValue>, StoreError> {
        Ok(self.tables()?.preferences.get(key).cloned())
    }

    pub fn all_preferences(&self) -> Result<BTreeMap<String, PreferenceValue>, StoreError> {
        Ok(self.tables()?.preferences.clone())
    }

    // projects

    /// Insert or refresh a project; its name is the file name of `path`
    pub fn add_project(&mut self, path: &Path) -> Result<Project, StoreError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key_of(path));
        let row = ProjectRow {
            name: name.clone(),
            last_opened: Utc::now(),
        };
        let last_opened = row.last_opened;
        self.update(|t| {
            t.projects.insert(key_of(path), row);
        })?;
        Ok(Project {
            path: path.to_path_buf(),
            name,
            last_opened,
        })
    }

    /// Projects, most recently opened first
    pub fn projects(&self) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<_> = self
            .tables()?
            .projects
            .iter()
            .map(|(key, row)| Project {
                path: PathBuf::from(key),
                name: row.name.clone(),
                last_opened: row.last_opened,
            })
            .collect();
        projects.sort_by(|a, b| {
            b.last_opened
                .cmp(&a.last_opened)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(projects)
    }

    pub fn remove_project(&mut self, path: &Path) -> Result<bool, StoreError> {
        let key = key_of(path);
        if !self.tables()?.projects.contains_key(&key) {
            return Ok(false);
        }
        self.update(|t| t.projects.remove(&key).is_some())
    }

    /// Mark a known project as just opened. Returns false if unknown.
    pub fn touch_project(&mut self, path: &Path) -> Result<bool, StoreError> {
        let key = key_of(path);
        if !self.tables()?.projects.contains_key(&key) {
            return Ok(false);
        }
        self.update(|t| {
            if let Some(row) = t.projects.get_mut(&key) {
                row.last_opened = Utc::now();
            }
            true
        })
    }
}
