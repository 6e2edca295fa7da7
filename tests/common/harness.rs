// DocumentTestHarness - controller over a temp-dir store, in-memory files and
// a manual clock, optionally wired to a live preview host

#![allow(dead_code)]

use livedoc::app::{ControllerOptions, DocumentController, OpenOutcome};
use livedoc::model::markdown::MarkdownConverter;
use livedoc::preview::host::PreviewHost;
use livedoc::services::fs::MemoryDocumentFs;
use livedoc::services::time_source::TestTimeSource;
use livedoc::store::{Database, SharedDatabase, ShadowRecord, StorePaths, DEFAULT_STORE_FILE};
use livedoc::sync::transport::duplex;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// How long to wait for the preview thread before failing a test
pub const PREVIEW_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DocumentTestHarness {
    dir: TempDir,
    pub paths: StorePaths,
    pub db: SharedDatabase,
    pub fs: MemoryDocumentFs,
    pub clock: Arc<TestTimeSource>,
    pub controller: DocumentController,
    options: ControllerOptions,
    preview: Option<PreviewHost>,
}

impl DocumentTestHarness {
    pub fn new() -> Self {
        Self::with_options(ControllerOptions::default())
    }

    pub fn with_options(options: ControllerOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::new(dir.path(), DEFAULT_STORE_FILE);
        let fs = MemoryDocumentFs::new();
        let clock = TestTimeSource::shared();
        let db = open_db(&paths);
        let controller = new_controller(&db, &fs, &clock, &options);
        Self {
            dir,
            paths,
            db,
            fs,
            clock,
            controller,
            options,
            preview: None,
        }
    }

    pub fn store_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Simulate quitting and starting again: the controller closes (flushing
    /// pending work), the store goes through its startup check again, and a
    /// new controller starts on the same files
    pub fn restart(&mut self) {
        self.detach_preview();
        self.controller.close().unwrap();
        self.db = open_db(&self.paths);
        self.controller = new_controller(&self.db, &self.fs, &self.clock, &self.options);
    }

    pub fn open(&mut self, path: &str) -> OpenOutcome {
        self.controller.open(Path::new(path)).unwrap()
    }

    /// Let `ms` pass on the clock and drive the controller's timers
    pub fn advance(&mut self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
        self.controller.tick();
    }

    pub fn shadow(&self, path: &str) -> Option<ShadowRecord> {
        self.db.lock().unwrap().read_shadow(Path::new(path)).unwrap()
    }

    pub fn seed_shadow(&self, path: &str, content: &str, is_dirty: bool) {
        self.db
            .lock()
            .unwrap()
            .write_shadow(Path::new(path), content, is_dirty)
            .unwrap();
    }

    /// Wait until the worker has committed `count` shadow writes in total
    pub fn wait_for_shadow_writes(&self, count: usize) {
        let deadline = Instant::now() + PREVIEW_TIMEOUT;
        while self.controller.worker_stats().shadow_writes < count {
            assert!(
                Instant::now() < deadline,
                "only {} of {} shadow writes landed",
                self.controller.worker_stats().shadow_writes,
                count
            );
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Close the controller so every queued store write has landed
    pub fn settle(&mut self) {
        self.controller.close().unwrap();
    }

    // ------------------------------------------------------------------
    // Preview
    // ------------------------------------------------------------------

    /// Spawn a preview host, connect it and wait until the controller has
    /// seen it become ready
    pub fn attach_preview(&mut self) {
        let (editor_end, render_end) = duplex();
        self.preview = Some(PreviewHost::spawn(render_end).unwrap());
        self.controller.attach_preview(editor_end);
        assert!(
            self.pump_until(|c| c.preview_link().is_some_and(|l| l.is_ready())),
            "preview never became ready"
        );
    }

    pub fn detach_preview(&mut self) {
        if let Some(mut host) = self.preview.take() {
            host.shutdown();
        }
    }

    pub fn preview(&self) -> &PreviewHost {
        self.preview.as_ref().expect("preview not attached")
    }

    /// Pump preview messages into the controller until `predicate` holds
    pub fn pump_until(&mut self, predicate: impl Fn(&DocumentController) -> bool) -> bool {
        let deadline = Instant::now() + PREVIEW_TIMEOUT;
        loop {
            self.controller.pump_preview();
            if predicate(&self.controller) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl Drop for DocumentTestHarness {
    fn drop(&mut self) {
        self.detach_preview();
    }
}

fn open_db(paths: &StorePaths) -> SharedDatabase {
    Arc::new(Mutex::new(Database::init(paths.clone()).unwrap()))
}

fn new_controller(
    db: &SharedDatabase,
    fs: &MemoryDocumentFs,
    clock: &Arc<TestTimeSource>,
    options: &ControllerOptions,
) -> DocumentController {
    DocumentController::new(
        Arc::clone(db),
        Arc::new(fs.clone()),
        Arc::new(MarkdownConverter::new()),
        clock.clone(),
        options.clone(),
    )
    .unwrap()
}
