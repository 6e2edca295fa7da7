//! Restoring the previous session
//!
//! The last open path and cursor line live in the store's app state table.
//! Restoring only reads the store, so it must run after the integrity guard
//! has settled on a store.

use super::{DocumentController, OpenOutcome, LAST_CURSOR_LINE, LAST_OPEN_PATH};
use anyhow::Result;
use std::path::PathBuf;

impl DocumentController {
    /// Reopen the document that was open last time and put the cursor back.
    /// Returns the reopened path, or `None` when there is nothing to restore.
    pub fn restore_session(&mut self) -> Result<Option<PathBuf>> {
        let (last_path, last_line) = {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            (db.app_state(LAST_OPEN_PATH)?, db.app_state(LAST_CURSOR_LINE)?)
        };

        let Some(path) = last_path.map(PathBuf::from) else {
            tracing::debug!("No previous session to restore");
            return Ok(None);
        };
        if !self.fs.exists(&path) {
            tracing::info!("Last open file {:?} no longer exists", path);
            return Ok(None);
        }
        if self.open(&path)? != OpenOutcome::Opened {
            return Ok(None);
        }

        if let Some(line) = last_line.and_then(|l| l.parse::<usize>().ok()) {
            self.set_cursor_line(line);
        }
        tracing::info!("Restored session: {:?} at line {}", path, self.cursor_line());
        Ok(Some(path))
    }
}
