//! State of the rendering context
//!
//! `PreviewSurface` is what lives on the far side of the sync channel: the
//! parsed DOM, the position index over it, the injected stylesheet and the
//! caret. It only learns about the editor through [`EditorMessage`]s and
//! only reports back through [`PreviewMessage`]s.

use super::dom::{Dom, DomRef};
use super::translator::{PositionTranslator, RenderPoint};
use crate::sync::protocol::{EditorMessage, PreviewMessage};

/// Interaction performed directly on the rendered view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Type text at the caret (visual-edit mode only)
    Type { text: String },
    /// Replace the whole surface with plain text (visual-edit mode only)
    ReplaceAll { text: String },
    /// Move the caret to a character offset of the rendered text
    MoveCaret { offset: usize },
    PressTab,
}

/// Read-only view of the surface, for callers outside the rendering context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub generation: u64,
    /// Last HTML applied by `update-content`; empty after an in-place edit
    pub html: String,
    pub text: String,
    pub stylesheet: String,
    pub edit_mode: bool,
    pub caret: usize,
    /// Source line of the block scrolled into view
    pub scroll_line: Option<usize>,
    pub tagged_blocks: usize,
}

pub struct PreviewSurface {
    generation: u64,
    dom: Dom,
    translator: PositionTranslator,
    current_html: String,
    stylesheet: String,
    edit_mode: bool,
    /// Character offset into the rendered text
    caret: usize,
    scroll_target: Option<DomRef>,
}

impl Default for PreviewSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSurface {
    pub fn new() -> Self {
        Self {
            generation: 0,
            dom: Dom::empty(0),
            translator: PositionTranslator::default(),
            current_html: String::new(),
            stylesheet: String::new(),
            edit_mode: false,
            caret: 0,
            scroll_target: None,
        }
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn translator(&self) -> &PositionTranslator {
        &self.translator
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        SurfaceSnapshot {
            generation: self.generation,
            html: self.current_html.clone(),
            text: self.dom.inner_text(),
            stylesheet: self.stylesheet.clone(),
            edit_mode: self.edit_mode,
            caret: self.caret,
            scroll_line: self.scroll_line(),
            tagged_blocks: self.translator.len(),
        }
    }

    fn scroll_line(&self) -> Option<usize> {
        let target = self.scroll_target?;
        self.translator
            .blocks()
            .find(|block| block.dom_ref == target)
            .map(|block| block.source_line_start)
    }

    /// Apply a message from the editor. Every message is idempotent.
    pub fn handle(&mut self, message: EditorMessage) {
        match message {
            EditorMessage::UpdateContent { html } => {
                if html == self.current_html {
                    tracing::trace!("Content unchanged, skipping re-render");
                    return;
                }
                let scroll_line = self.scroll_line();
                self.replace_dom(Dom::parse(&html, self.generation + 1));
                self.current_html = html;
                if let Some(line) = scroll_line {
                    self.scroll_to(line);
                }
            }
            EditorMessage::UpdateCss { css } => self.stylesheet = css,
            EditorMessage::ScrollToLine { line } => self.scroll_to(line),
            EditorMessage::SetCursor { offset } => {
                if self.edit_mode {
                    self.caret = offset.min(self.text_len());
                } else {
                    tracing::trace!("Ignoring set-cursor outside visual-edit mode");
                }
            }
            EditorMessage::SetEditMode { enabled } => self.edit_mode = enabled,
        }
    }

    /// Apply a local interaction, returning the messages it produces for the
    /// editor
    pub fn interact(&mut self, action: UserAction) -> Vec<PreviewMessage> {
        match action {
            UserAction::Type { text } => {
                if !self.edit_mode {
                    return Vec::new();
                }
                let root = self.dom.root();
                let inserted = match self.dom.point_at_text_offset(root, self.caret) {
                    Some((node, offset)) => self.dom.insert_text(node, offset, &text),
                    None => false,
                };
                if !inserted {
                    let mut plain = self.dom.inner_text();
                    plain.push_str(&text);
                    self.replace_dom(Dom::from_plain_text(&plain, self.generation + 1));
                }
                self.current_html.clear();
                self.caret += text.chars().count();
                vec![
                    PreviewMessage::PreviewEdit {
                        text: self.dom.inner_text(),
                    },
                    PreviewMessage::PreviewCursor { offset: self.caret },
                ]
            }
            UserAction::ReplaceAll { text } => {
                if !self.edit_mode {
                    return Vec::new();
                }
                self.replace_dom(Dom::from_plain_text(&text, self.generation + 1));
                self.current_html.clear();
                vec![PreviewMessage::PreviewEdit { text }]
            }
            UserAction::MoveCaret { offset } => {
                self.caret = offset.min(self.text_len());
                if self.edit_mode {
                    vec![PreviewMessage::PreviewCursor { offset: self.caret }]
                } else {
                    Vec::new()
                }
            }
            UserAction::PressTab => vec![PreviewMessage::PreviewTab {
                target: self.resolve_caret(),
            }],
        }
    }

    /// Source position under the caret in visual-edit mode, or at the start
    /// of the block scrolled into view otherwise
    fn resolve_caret(&self) -> Option<crate::model::position::SourcePoint> {
        let point = if self.edit_mode {
            let (node, offset) = self.dom.point_at_text_offset(self.dom.root(), self.caret)?;
            RenderPoint { node, offset }
        } else {
            RenderPoint::start_of(self.scroll_target?)
        };
        self.translator.render_ref_to_line(&self.dom, point)
    }

    fn scroll_to(&mut self, line: usize) {
        match self.translator.line_to_render_ref(line) {
            Some(block) => self.scroll_target = Some(block.dom_ref),
            None => tracing::trace!("No block at or before line {}", line),
        }
    }

    fn replace_dom(&mut self, dom: Dom) {
        self.generation = dom.generation();
        self.translator = PositionTranslator::index(&dom);
        self.dom = dom;
        // refs into the old tree no longer resolve
        self.scroll_target = None;
        self.caret = self.caret.min(self.text_len());
    }

    fn text_len(&self) -> usize {
        self.dom.text_len(self.dom.root())
    }
}
