//! Global tracing subscriber
//!
//! Logs go to a file so they never interleave with command output.
//! `RUST_LOG` overrides the default `info` filter.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Default log file in the system temp directory
pub fn default_log_file() -> PathBuf {
    std::env::temp_dir().join("livedoc.log")
}

/// Install the global subscriber writing to `log_file` (truncated).
/// Returns false if a subscriber was already installed.
pub fn init_global(log_file: &Path) -> Result<bool> {
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    let file = std::fs::File::create(log_file)
        .with_context(|| format!("Failed to create log file {:?}", log_file))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Logging to {:?}", log_file);
    }
    Ok(installed)
}
