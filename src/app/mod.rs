//! Document controller
//!
//! Owns the single writable copy of the document text. Every change, whatever
//! its origin, goes through [`DocumentController::apply_mutation`] (or
//! [`DocumentController::install`] for whole-document replacement), which
//! keeps the dirty flag derived, pushes the new render to the preview and
//! re-arms the shadow autosave timer.

mod file_operations;
mod preview_messages;
mod session;

pub use file_operations::{OpenDecision, OpenOutcome, SaveOutcome};

use crate::config::Config;
use crate::model::document::{Document, DocumentPath};
use crate::model::outline::{self, Outline};
use crate::model::position::SourcePoint;
use crate::model::source_map::{Converter, SourceMapBuilder, SourceMappedRender};
use crate::services::debounce::Debouncer;
use crate::services::fs::DocumentFs;
use crate::services::persistence_worker::{PersistenceWorker, WorkerStats};
use crate::services::time_source::SharedTimeSource;
use crate::store::SharedDatabase;
use crate::sync::link::PreviewLink;
use crate::sync::transport::Endpoint;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// App state key holding the path of the last opened document
pub const LAST_OPEN_PATH: &str = "last_open_path";
/// App state key holding the last cursor line
pub const LAST_CURSOR_LINE: &str = "last_cursor_line";

/// Where a content change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    User,
    Insert,
    Assistant,
    Reorder,
    VisualEdit,
    Discard,
    Open,
}

impl EditOrigin {
    /// Changes that originate from the user and must reach the shadow store
    fn is_edit(self) -> bool {
        !matches!(self, Self::Discard | Self::Open)
    }
}

/// Surface holding keyboard focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSurface {
    Source,
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Save requested for a document without a path
    SaveTargetMissing,
    NoPendingOpen,
    InvalidReorder { from: usize, to: usize },
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SaveTargetMissing => write!(f, "Document has no file to save to"),
            Self::NoPendingOpen => write!(f, "No open request is waiting for a decision"),
            Self::InvalidReorder { from, to } => {
                write!(f, "Cannot move section {} to position {}", from, to)
            }
        }
    }
}

impl std::error::Error for DocumentError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    pub shadow_debounce: Duration,
    /// Apply and write shadow copies
    pub recovery_enabled: bool,
    pub untitled_template: String,
    pub visual_edit: bool,
    pub stylesheet: Option<String>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), None)
    }
}

impl ControllerOptions {
    pub fn from_config(config: &Config, stylesheet: Option<String>) -> Self {
        Self {
            shadow_debounce: Duration::from_millis(config.editor.shadow_debounce_ms),
            recovery_enabled: config.editor.recovery_enabled,
            untitled_template: config.editor.untitled_template.clone(),
            visual_edit: config.preview.visual_edit,
            stylesheet,
        }
    }
}

pub struct DocumentController {
    document: Document,
    db: SharedDatabase,
    worker: PersistenceWorker,
    fs: Arc<dyn DocumentFs>,
    builder: SourceMapBuilder,
    link: Option<PreviewLink>,
    shadow_timer: Debouncer,
    options: ControllerOptions,
    /// Byte offset of the caret in the source surface
    source_cursor: usize,
    active_surface: ActiveSurface,
    visual_edit: bool,
    /// Last caret reported by the preview, in rendered characters
    preview_caret: Option<usize>,
    pending_open: Option<PathBuf>,
    status_message: Option<String>,
    closed: bool,
}

impl DocumentController {
    /// Controller over an untitled document. The store must already have
    /// passed its integrity check.
    pub fn new(
        db: SharedDatabase,
        fs: Arc<dyn DocumentFs>,
        converter: Arc<dyn Converter>,
        time_source: SharedTimeSource,
        options: ControllerOptions,
    ) -> Result<Self> {
        let worker = PersistenceWorker::spawn(Arc::clone(&db))?;
        Ok(Self {
            document: Document::untitled(&options.untitled_template),
            db,
            worker,
            fs,
            builder: SourceMapBuilder::new(converter),
            link: None,
            shadow_timer: Debouncer::new(options.shadow_debounce, time_source),
            visual_edit: options.visual_edit,
            options,
            source_cursor: 0,
            active_surface: ActiveSurface::Source,
            preview_caret: None,
            pending_open: None,
            status_message: None,
            closed: false,
        })
    }

    /// Connect the rendering context. Everything it needs is queued until it
    /// reports ready.
    pub fn attach_preview(&mut self, endpoint: Endpoint) {
        let mut link = PreviewLink::new(endpoint);
        if let Some(css) = &self.options.stylesheet {
            link.push_css(css.clone());
        }
        link.set_edit_mode(self.visual_edit);
        link.push_content(self.builder.build(self.document.content()).html);
        self.link = Some(link);
    }

    pub fn preview_link(&self) -> Option<&PreviewLink> {
        self.link.as_ref()
    }

    pub fn content(&self) -> &str {
        self.document.content()
    }

    pub fn dirty(&self) -> bool {
        self.document.is_dirty()
    }

    pub fn cursor_line(&self) -> usize {
        self.document.cursor_line()
    }

    pub fn source_cursor(&self) -> usize {
        self.source_cursor
    }

    pub fn path(&self) -> &DocumentPath {
        self.document.path()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn active_surface(&self) -> ActiveSurface {
        self.active_surface
    }

    pub fn visual_edit(&self) -> bool {
        self.visual_edit
    }

    pub fn preview_caret(&self) -> Option<usize> {
        self.preview_caret
    }

    pub fn pending_open(&self) -> Option<&Path> {
        self.pending_open.as_deref()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some(message);
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.worker.stats()
    }

    /// True while an autosave is waiting for the edit burst to end
    pub fn shadow_pending(&self) -> bool {
        self.shadow_timer.is_armed()
    }

    pub fn outline(&self) -> Outline {
        Outline::parse(self.document.content())
    }

    pub fn render(&self) -> SourceMappedRender {
        self.builder.build(self.document.content())
    }

    /// Replace the content as an edit from `origin`. Returns false if the
    /// text did not change.
    pub fn apply_mutation(&mut self, origin: EditOrigin, text: String) -> bool {
        if !self.document.set_content(text) {
            if origin == EditOrigin::VisualEdit {
                // the preview replaced our render with plain text either way
                self.push_render(origin);
            }
            return false;
        }
        self.source_cursor = self.source_cursor.min(self.document.content().len());
        while !self.document.content().is_char_boundary(self.source_cursor) {
            self.source_cursor -= 1;
        }
        self.after_mutation(origin);
        true
    }

    /// Replace the whole document (open, discard)
    fn install(&mut self, document: Document, origin: EditOrigin) {
        self.document = document;
        self.source_cursor = 0;
        self.after_mutation(origin);
    }

    fn after_mutation(&mut self, origin: EditOrigin) {
        tracing::trace!(
            "{:?} mutation, {} bytes, dirty={}",
            origin,
            self.document.content().len(),
            self.document.is_dirty()
        );
        self.push_render(origin);
        if origin.is_edit() && self.document.path().is_file() && self.options.recovery_enabled {
            self.shadow_timer.arm();
        }
    }

    fn push_render(&mut self, origin: EditOrigin) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if origin == EditOrigin::VisualEdit {
            // the preview shows its own edited text, not our last render
            link.invalidate_content();
        }
        link.push_content(self.builder.build(self.document.content()).html);
    }

    pub fn set_content(&mut self, text: String) -> bool {
        self.apply_mutation(EditOrigin::User, text)
    }

    /// Insert `snippet` at the start of the cursor line
    pub fn insert_at_cursor(&mut self, snippet: &str) -> bool {
        let at = SourcePoint::new(self.document.cursor_line(), 0).clamp_to(self.document.content());
        let mut text = self.document.content().to_string();
        text.insert_str(at, snippet);
        self.apply_mutation(EditOrigin::Insert, text)
    }

    /// Replace the document with generated text
    pub fn apply_assistant_text(&mut self, text: String) -> bool {
        self.apply_mutation(EditOrigin::Assistant, text)
    }

    /// Move outline section `from` before section `to`
    pub fn reorder_sections(&mut self, from: usize, to: usize) -> Result<bool> {
        match outline::move_section(self.document.content(), from, to) {
            Some(text) => Ok(self.apply_mutation(EditOrigin::Reorder, text)),
            None => Err(DocumentError::InvalidReorder { from, to }.into()),
        }
    }

    /// Move the source cursor. The preview scrolls along and the line is
    /// remembered for the next session.
    pub fn set_cursor_line(&mut self, line: usize) -> usize {
        let line = self.document.set_cursor_line(line);
        self.source_cursor = SourcePoint::new(line, 0).clamp_to(self.document.content());
        if let Some(link) = self.link.as_mut() {
            link.scroll_to_line(line);
        }
        self.worker.set_app_state(LAST_CURSOR_LINE, line.to_string());
        line
    }

    pub fn set_visual_edit(&mut self, enabled: bool) {
        self.visual_edit = enabled;
        if let Some(link) = self.link.as_mut() {
            link.set_edit_mode(enabled);
        }
    }

    pub fn set_stylesheet(&mut self, css: String) {
        if let Some(link) = self.link.as_mut() {
            link.push_css(css.clone());
        }
        self.options.stylesheet = Some(css);
    }

    /// Tab from the source surface: focus moves to the preview, and in
    /// visual-edit mode its caret goes back to where it was
    pub fn focus_preview(&mut self) {
        self.active_surface = ActiveSurface::Preview;
        if !self.visual_edit {
            return;
        }
        if let (Some(link), Some(caret)) = (self.link.as_mut(), self.preview_caret) {
            link.set_cursor(caret);
        }
    }

    /// Drive timers; call from the main loop
    pub fn tick(&mut self) {
        if self.shadow_timer.fire_if_due() {
            self.commit_shadow();
        }
    }

    fn commit_shadow(&mut self) {
        if let Some(path) = self.document.path().file() {
            tracing::debug!("Autosaving shadow copy of {:?}", path);
            self.worker.submit_shadow(
                path,
                self.document.content().to_string(),
                self.document.is_dirty(),
            );
        }
    }

    /// Cancel the autosave timer and, if it was pending, write the shadow
    /// copy now and wait for it
    pub fn flush_shadow(&mut self) -> Result<()> {
        if !self.shadow_timer.cancel() {
            return Ok(());
        }
        match self.document.path().file() {
            Some(path) => {
                tracing::debug!("Flushing pending shadow copy of {:?}", path);
                self.worker.write_shadow_sync(
                    path,
                    self.document.content().to_string(),
                    self.document.is_dirty(),
                )
            }
            None => Ok(()),
        }
    }

    /// Flush and stop background work. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.flush_shadow();
        self.worker.shutdown();
        tracing::info!("Document controller closed");
        result
    }

    /// Record an error at the controller boundary and hand it back
    fn report<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::warn!("{:#}", e);
            self.status_message = Some(format!("{:#}", e));
        }
        result
    }
}

impl Drop for DocumentController {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Final shadow flush failed: {:#}", e);
        }
    }
}
