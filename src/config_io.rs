//! Runtime configuration I/O: system directory detection, config file
//! loading and saving.

use crate::config::{Config, ConfigError};
use crate::store::StorePaths;
use serde_json::Value;
use std::path::{Path, PathBuf};

// ============================================================================
// Directories
// ============================================================================

/// Directories the application reads from and writes to
#[derive(Debug, Clone)]
pub struct DirectoryContext {
    /// Persistent state (the store and its backups)
    /// e.g., ~/.local/share/livedoc on Linux
    pub data_dir: PathBuf,

    /// User configuration
    /// e.g., ~/.config/livedoc on Linux
    pub config_dir: PathBuf,

    /// Where new projects go unless the user picks a folder
    /// e.g., ~/Documents on Linux
    pub documents_dir: PathBuf,
}

impl DirectoryContext {
    /// Create a DirectoryContext from the system directories
    /// This should ONLY be called from main()
    pub fn from_system() -> std::io::Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine data directory",
                )
            })?
            .join("livedoc");
        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine config directory",
                )
            })?
            .join("livedoc");
        // without a documents folder, projects live next to where we were started
        let documents_dir = match dirs::document_dir() {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        Ok(Self {
            data_dir,
            config_dir,
            documents_dir,
        })
    }

    /// Both directories under `root`
    pub fn for_testing(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            config_dir: root.join("config"),
            documents_dir: root.join("documents"),
        }
    }

    /// Put the data directory somewhere else, keeping the config directory
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(Config::FILENAME)
    }

    /// Live, backup and corruption marker paths for the configured store
    pub fn store_paths(&self, config: &Config) -> StorePaths {
        StorePaths::new(&self.data_dir, &config.store.file_name)
    }

    /// Folder offered for a new project
    pub fn default_project_root(&self) -> PathBuf {
        self.documents_dir.join("livedoc")
    }

    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

// ============================================================================
// Loading and saving
// ============================================================================

/// Load the configuration: `explicit` if given (it must exist), else the user
/// config file if present, else defaults
pub fn load_config(dirs: &DirectoryContext, explicit: Option<&Path>) -> Result<Config, ConfigError> {
    match explicit {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            Config::load_from_file(path)
        }
        None => Config::load_or_default(&dirs.config_path()),
    }
}

/// Write only the settings that differ from the defaults, so later default
/// changes still reach users who never touched them
pub fn save_user_config(dirs: &DirectoryContext, config: &Config) -> Result<(), ConfigError> {
    config.validate()?;
    let current =
        serde_json::to_value(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
    let defaults = serde_json::to_value(Config::default())
        .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
    let diff = json_diff(&defaults, &current).unwrap_or_else(|| Value::Object(Default::default()));

    std::fs::create_dir_all(&dirs.config_dir).map_err(|e| ConfigError::IoError(e.to_string()))?;
    let contents =
        serde_json::to_string_pretty(&diff).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
    let path = dirs.config_path();
    std::fs::write(&path, contents).map_err(|e| ConfigError::IoError(e.to_string()))?;
    tracing::debug!("Saved config to {}", path.display());
    Ok(())
}

/// Parts of `current` that differ from `defaults`. Nulls are dropped.
fn json_diff(defaults: &Value, current: &Value) -> Option<Value> {
    match (defaults, current) {
        (_, Value::Null) => None,
        (Value::Object(d), Value::Object(c)) => {
            let filtered: serde_json::Map<String, Value> = c
                .iter()
                .filter_map(|(k, v)| {
                    let diff = match d.get(k) {
                        Some(default) => json_diff(default, v),
                        None => Some(v.clone()),
                    };
                    diff.map(|diff| (k.clone(), diff))
                })
                .collect();
            if filtered.is_empty() {
                None
            } else {
                Some(Value::Object(filtered))
            }
        }
        (d, c) if d == c => None,
        (_, c) => Some(c.clone()),
    }
}

/// Read the stylesheet named in the config, if any
pub fn load_stylesheet(config: &Config) -> Result<Option<String>, ConfigError> {
    let Some(path) = &config.preview.stylesheet else {
        return Ok(None);
    };
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))
}
