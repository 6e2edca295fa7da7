//! Open, save and discard

use super::{DocumentController, DocumentError, EditOrigin, LAST_OPEN_PATH};
use crate::model::document::Document;
use crate::model::position::SourcePoint;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Result of asking to open a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// The current document has unsaved changes; resolve with
    /// [`DocumentController::resolve_pending_open`]
    NeedsDecision(PathBuf),
    Cancelled,
}

/// Caller's answer to [`OpenOutcome::NeedsDecision`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenDecision {
    SaveAndOpen,
    DiscardAndOpen,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// No target was chosen; nothing was written
    Cancelled,
}

impl DocumentController {
    /// Open `path`, unless the current document is dirty, in which case the
    /// request is parked until the caller decides what to do with the
    /// unsaved changes
    pub fn open(&mut self, path: &Path) -> Result<OpenOutcome> {
        if self.document.is_dirty() {
            tracing::debug!("Open of {:?} waits for a decision on unsaved changes", path);
            self.pending_open = Some(path.to_path_buf());
            return Ok(OpenOutcome::NeedsDecision(path.to_path_buf()));
        }
        self.open_now(path)?;
        Ok(OpenOutcome::Opened)
    }

    pub fn resolve_pending_open(&mut self, decision: OpenDecision) -> Result<OpenOutcome> {
        let path = self
            .pending_open
            .take()
            .ok_or(DocumentError::NoPendingOpen)?;
        match decision {
            OpenDecision::Cancel => {
                tracing::debug!("Open of {:?} cancelled", path);
                Ok(OpenOutcome::Cancelled)
            }
            OpenDecision::SaveAndOpen => {
                if let Err(e) = self.save() {
                    self.pending_open = Some(path);
                    return Err(e);
                }
                self.open_now(&path)?;
                Ok(OpenOutcome::Opened)
            }
            OpenDecision::DiscardAndOpen => {
                // nothing is dropped until the target is known to be readable
                let disk_content = match self.load_for_open(&path) {
                    Ok(content) => content,
                    Err(e) => {
                        self.pending_open = Some(path);
                        return Err(e);
                    }
                };
                if let Some(current) = self.document.path().file().map(Path::to_path_buf) {
                    let cleared = self
                        .worker
                        .clear_shadow_sync(&current)
                        .with_context(|| format!("Failed to drop unsaved changes of {:?}", current));
                    if let Err(e) = self.report(cleared) {
                        self.pending_open = Some(path);
                        return Err(e);
                    }
                }
                self.shadow_timer.cancel();
                self.switch_to(&path, disk_content)?;
                Ok(OpenOutcome::Opened)
            }
        }
    }

    /// Load `path` and make it the active document, regardless of unsaved
    /// changes in the current one. On error nothing changes.
    fn open_now(&mut self, path: &Path) -> Result<()> {
        let disk_content = self.load_for_open(path)?;
        self.switch_to(path, disk_content)
    }

    fn load_for_open(&mut self, path: &Path) -> Result<String> {
        let loaded = self
            .fs
            .load(path)
            .with_context(|| format!("Failed to open {:?}", path));
        self.report(loaded)
    }

    /// Release the current path and install `path` with its disk content
    fn switch_to(&mut self, path: &Path, disk_content: String) -> Result<()> {
        let released = self.release_active_path();
        self.report(released)?;

        let content = self.reconcile(path, &disk_content);
        let restored_shadow = content != disk_content;
        self.install(
            Document::opened(path.to_path_buf(), disk_content, content),
            EditOrigin::Open,
        );
        self.pending_open = None;
        self.worker
            .set_app_state(LAST_OPEN_PATH, path.to_string_lossy().into_owned());

        tracing::info!("Opened {:?} (unsaved changes restored: {})", path, restored_shadow);
        self.status_message = Some(if restored_shadow {
            format!("Opened {} with unsaved changes restored", path.display())
        } else {
            format!("Opened {}", path.display())
        });
        Ok(())
    }

    /// Canonical content for `path` given its disk content: the shadow copy
    /// if it holds unsaved changes, else the disk content
    fn reconcile(&self, path: &Path, disk_content: &str) -> String {
        if !self.options.recovery_enabled {
            return disk_content.to_string();
        }
        let shadow = self
            .db
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_shadow(path);
        match shadow {
            Ok(Some(record)) if record.is_dirty => {
                tracing::debug!(
                    "Applying unsaved shadow copy of {:?} from {}",
                    path,
                    record.updated_at
                );
                record.content
            }
            Ok(Some(_)) => {
                tracing::debug!("Shadow copy of {:?} is clean, using disk", path);
                disk_content.to_string()
            }
            Ok(None) => disk_content.to_string(),
            Err(e) => {
                tracing::warn!("Failed to read shadow copy of {:?}, using disk: {}", path, e);
                disk_content.to_string()
            }
        }
    }

    /// Last step before the active path changes: no pending edit may be
    /// left for the old path
    pub fn release_active_path(&mut self) -> Result<()> {
        self.flush_shadow()
            .context("Failed to save unsaved changes before switching files")
    }

    /// Write the content to its file, then record a clean shadow copy
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.document.path().file().map(Path::to_path_buf) else {
            let missing: Result<()> = Err(DocumentError::SaveTargetMissing.into());
            return self.report(missing);
        };
        let written = self.write_to_disk(&path);
        self.report(written)?;
        self.shadow_timer.cancel();
        self.record_clean_shadow(&path);
        self.document.mark_saved_as(path.clone());
        self.status_message = Some(format!("Saved {}", path.display()));
        Ok(())
    }

    /// Save under `target`, which becomes the active path. `None` stands for
    /// a dismissed path prompt.
    pub fn save_as(&mut self, target: Option<PathBuf>) -> Result<SaveOutcome> {
        let Some(target) = target else {
            tracing::debug!("Save cancelled, no target chosen");
            return Ok(SaveOutcome::Cancelled);
        };
        if self.document.path().file() == Some(target.as_path()) {
            self.save()?;
            return Ok(SaveOutcome::Saved(target));
        }

        // the old path's pending edit lands before anything touches the target
        if let Err(e) = self.release_active_path() {
            tracing::warn!("{:#}", e);
        }
        let written = self.write_to_disk(&target);
        self.report(written)?;
        self.record_clean_shadow(&target);
        self.document.mark_saved_as(target.clone());
        self.worker
            .set_app_state(LAST_OPEN_PATH, target.to_string_lossy().into_owned());
        self.status_message = Some(format!("Saved {}", target.display()));
        Ok(SaveOutcome::Saved(target))
    }

    fn write_to_disk(&self, path: &Path) -> Result<()> {
        self.fs
            .save(path, self.document.content())
            .with_context(|| format!("Failed to save {:?}", path))?;
        tracing::info!("Saved {:?}", path);
        Ok(())
    }

    fn record_clean_shadow(&self, path: &Path) {
        if let Err(e) = self
            .worker
            .write_shadow_sync(path, self.document.content().to_string(), false)
        {
            // a stale dirty record would override the saved file on next open
            tracing::warn!("Failed to mark shadow copy of {:?} clean: {:#}", path, e);
            if let Err(e) = self.worker.clear_shadow_sync(path) {
                tracing::warn!("Failed to clear shadow copy of {:?}: {:#}", path, e);
            }
        }
    }

    /// Throw away unsaved changes: clear the shadow copy and reload from
    /// disk (or reset an untitled document to the template)
    pub fn discard(&mut self) -> Result<()> {
        let Some(path) = self.document.path().file().map(Path::to_path_buf) else {
            self.shadow_timer.cancel();
            let template = Document::untitled(&self.options.untitled_template);
            self.install(template, EditOrigin::Discard);
            return Ok(());
        };

        let loaded = self
            .fs
            .load(&path)
            .with_context(|| format!("Failed to reload {:?}", path));
        let disk_content = self.report(loaded)?;

        let cleared = self
            .worker
            .clear_shadow_sync(&path)
            .with_context(|| format!("Failed to drop unsaved changes of {:?}", path));
        self.report(cleared)?;
        self.shadow_timer.cancel();

        let content = self.reconcile(&path, &disk_content);
        let cursor_line = self.document.cursor_line();
        self.install(
            Document::opened(path.clone(), disk_content, content),
            EditOrigin::Discard,
        );
        let line = self.document.set_cursor_line(cursor_line);
        self.source_cursor = SourcePoint::new(line, 0).clamp_to(self.document.content());
        self.status_message = Some(format!("Discarded changes to {}", path.display()));
        Ok(())
    }
}
