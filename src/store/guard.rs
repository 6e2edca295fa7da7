//! Startup integrity check of the persistence store
//!
//! Runs once, before anything reads the store. A store that passes its
//! structural check is copied over the single backup slot. A store that
//! fails is moved aside to the marker path, so that a fresh empty store can
//! take its place until the user decides whether to restore the backup.

use super::format::{self, FormatError};
use super::StorePaths;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unchecked,
    /// The live store verified (or does not exist yet)
    Healthy,
    /// The live store failed its check and could not be moved aside
    Corrupt,
    /// A corrupt store sits at the marker path
    CorruptFlagged,
}

/// Which store the session runs on after the check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSlot {
    Live,
    /// The previous store was moved to `marker`; the live path holds a
    /// fresh store
    CorruptMarked { marker: PathBuf },
    /// Nothing usable on disk; the session keeps its store in memory
    Volatile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardReport {
    pub state: GuardState,
    pub backup_rotated: bool,
    /// Failure that sent the store into a corrupt state
    pub error: Option<String>,
}

impl GuardReport {
    fn new(state: GuardState) -> Self {
        Self {
            state,
            backup_rotated: false,
            error: None,
        }
    }
}

pub struct IntegrityGuard {
    paths: StorePaths,
    state: GuardState,
}

impl IntegrityGuard {
    pub fn new(paths: StorePaths) -> Self {
        Self {
            paths,
            state: GuardState::Unchecked,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Check the live store and settle on a slot. Only the first call does
    /// any work; later calls report the settled state again.
    pub fn run(&mut self) -> (GuardReport, StoreSlot) {
        if self.state != GuardState::Unchecked {
            tracing::warn!("Integrity guard already ran ({:?})", self.state);
            let slot = match self.state {
                GuardState::CorruptFlagged => StoreSlot::CorruptMarked {
                    marker: self.paths.marker.clone(),
                },
                GuardState::Corrupt => StoreSlot::Volatile,
                _ => StoreSlot::Live,
            };
            return (GuardReport::new(self.state), slot);
        }

        let (report, slot) = self.check();
        self.state = report.state;
        tracing::info!("Store integrity check: {:?}", report.state);
        (report, slot)
    }

    fn check(&self) -> (GuardReport, StoreSlot) {
        let paths = &self.paths;
        let leftover_marker = paths.marker.exists();
        let flagged = || StoreSlot::CorruptMarked {
            marker: paths.marker.clone(),
        };

        if !paths.live.exists() {
            tracing::debug!("No store at {:?} yet", paths.live);
            return if leftover_marker {
                (GuardReport::new(GuardState::CorruptFlagged), flagged())
            } else {
                (GuardReport::new(GuardState::Healthy), StoreSlot::Live)
            };
        }

        match format::verify_file(&paths.live) {
            Ok(_) if leftover_marker => {
                // the live store is the empty replacement from an earlier
                // run; rotating it would overwrite the last good backup
                tracing::info!(
                    "Corruption marker {:?} still present, keeping backup",
                    paths.marker
                );
                (GuardReport::new(GuardState::CorruptFlagged), flagged())
            }
            Ok(_) => {
                let mut report = GuardReport::new(GuardState::Healthy);
                match std::fs::copy(&paths.live, &paths.backup) {
                    Ok(_) => {
                        report.backup_rotated = true;
                        tracing::debug!("Backup rotated to {:?}", paths.backup);
                    }
                    Err(e) => tracing::warn!("Failed to rotate store backup: {}", e),
                }
                (report, StoreSlot::Live)
            }
            Err(e) => self.mark_corrupt(e),
        }
    }

    fn mark_corrupt(&self, cause: FormatError) -> (GuardReport, StoreSlot) {
        let paths = &self.paths;
        tracing::warn!("Store {:?} failed integrity check: {}", paths.live, cause);

        if paths.marker.exists() {
            if let Err(e) = std::fs::remove_file(&paths.marker) {
                tracing::warn!("Failed to remove old corruption marker: {}", e);
            }
        }
        match std::fs::rename(&paths.live, &paths.marker) {
            Ok(()) => {
                let mut report = GuardReport::new(GuardState::CorruptFlagged);
                report.error = Some(cause.to_string());
                (
                    report,
                    StoreSlot::CorruptMarked {
                        marker: paths.marker.clone(),
                    },
                )
            }
            Err(e) => {
                tracing::error!("Failed to move corrupt store aside: {}", e);
                let mut report = GuardReport::new(GuardState::Corrupt);
                report.error = Some(format!("{} (could not move aside: {})", cause, e));
                (report, StoreSlot::Volatile)
            }
        }
    }
}
