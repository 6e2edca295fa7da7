use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Document editing and autosave behaviour
    #[serde(default)]
    pub editor: EditorConfig,

    /// Rendered view settings
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Persistence store settings
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditorConfig {
    /// Quiet period after the last edit before the shadow copy is written
    /// (default: 1000)
    #[serde(default = "default_shadow_debounce_ms")]
    pub shadow_debounce_ms: u64,

    /// Keep shadow copies of unsaved edits and restore them on open
    /// (default: true)
    #[serde(default = "default_true")]
    pub recovery_enabled: bool,

    /// Initial content of a new document
    #[serde(default = "default_untitled_template")]
    pub untitled_template: String,
}

fn default_shadow_debounce_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_untitled_template() -> String {
    "# Untitled\n\n".to_string()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            shadow_debounce_ms: default_shadow_debounce_ms(),
            recovery_enabled: true,
            untitled_template: default_untitled_template(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PreviewConfig {
    /// Allow typing directly into the rendered view. Edits made there
    /// replace the source with plain text. (default: false)
    #[serde(default = "default_false")]
    pub visual_edit: bool,

    /// CSS file injected into the rendered view
    #[serde(default)]
    pub stylesheet: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// File name of the store inside the data directory
    #[serde(default = "default_store_file_name")]
    pub file_name: String,
}

fn default_store_file_name() -> String {
    crate::store::DEFAULT_STORE_FILE.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_name: default_store_file_name(),
        }
    }
}

impl Config {
    pub const FILENAME: &'static str = "config.json";

    /// Load configuration from a JSON file. Missing fields take their
    /// defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, else the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.editor.shadow_debounce_ms == 0 {
            return Err(ConfigError::ValidationError(
                "shadow_debounce_ms must be greater than 0".to_string(),
            ));
        }
        let name = &self.store.file_name;
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "store file_name must be a plain file name, got {:?}",
                name
            )));
        }
        Ok(())
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
