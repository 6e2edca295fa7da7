//! Raw load/save of documents
//!
//! The controller only needs three operations on named blobs, so they sit
//! behind [`DocumentFs`]. Production uses the local filesystem; tests swap in
//! [`MemoryDocumentFs`] to observe writes and inject failures.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait DocumentFs: Send + Sync {
    fn load(&self, path: &Path) -> io::Result<String>;

    fn save(&self, path: &Path, content: &str) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

/// Local filesystem; saves go through a temp file and a rename
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDocumentFs;

impl DocumentFs for StdDocumentFs {
    fn load(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn save(&self, path: &Path, content: &str) -> io::Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let mut temp_name = std::ffi::OsString::from(".");
        temp_name.push(file_name);
        temp_name.push(".livedoc-tmp");
        let temp_path = path.with_file_name(temp_name);
        {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Called with the target path just before each in-memory save
pub type SaveObserver = Arc<dyn Fn(&Path) + Send + Sync>;

/// In-memory files shared between clones
#[derive(Default, Clone)]
pub struct MemoryDocumentFs {
    inner: Arc<Mutex<MemoryFsState>>,
    observer: Arc<Mutex<Option<SaveObserver>>>,
}

impl std::fmt::Debug for MemoryDocumentFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDocumentFs")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct MemoryFsState {
    files: HashMap<PathBuf, String>,
    fail_loads: bool,
    fail_saves: bool,
    saves: usize,
}

impl MemoryDocumentFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryFsState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: &str) {
        self.state().files.insert(path.into(), content.to_string());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.state().files.get(path).cloned()
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state().files.remove(path.as_ref())
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.state().fail_loads = fail;
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.state().fail_saves = fail;
    }

    /// Run `observer` before every save attempt, failed ones included
    pub fn set_save_observer(&self, observer: impl Fn(&Path) + Send + Sync + 'static) {
        let observer: SaveObserver = Arc::new(observer);
        *self.observer.lock().unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.state().saves
    }
}

impl DocumentFs for MemoryDocumentFs {
    fn load(&self, path: &Path) -> io::Result<String> {
        let state = self.state();
        if state.fail_loads {
            return Err(io::Error::other("load failure injected"));
        }
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{:?} not found", path)))
    }

    fn save(&self, path: &Path, content: &str) -> io::Result<()> {
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(observer) = observer {
            observer(path);
        }
        let mut state = self.state();
        if state.fail_saves {
            return Err(io::Error::other("save failure injected"));
        }
        state.files.insert(path.to_path_buf(), content.to_string());
        state.saves += 1;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }
}
