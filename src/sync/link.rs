//! Editor side of the sync channel
//!
//! Outbound messages are withheld until the rendering context reports
//! `preview-ready`. While waiting, each message kind has a single slot that
//! keeps only the most recent value. The last value of every kind is also
//! remembered so a restarted rendering context can be brought up to date
//! when it announces itself again.

use super::protocol::{self, EditorMessage, PreviewMessage};
use super::transport::{Endpoint, TryRecv};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LinkState {
    css: Option<String>,
    edit_mode: Option<bool>,
    content: Option<String>,
    scroll_line: Option<usize>,
    cursor: Option<usize>,
}

impl LinkState {
    fn absorb(&mut self, newer: LinkState) {
        if newer.css.is_some() {
            self.css = newer.css;
        }
        if newer.edit_mode.is_some() {
            self.edit_mode = newer.edit_mode;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
        if newer.scroll_line.is_some() {
            self.scroll_line = newer.scroll_line;
        }
        if newer.cursor.is_some() {
            self.cursor = newer.cursor;
        }
    }

    /// Messages in flush order: css, edit mode, content, scroll, cursor
    fn messages(&self) -> Vec<EditorMessage> {
        let mut out = Vec::new();
        if let Some(css) = &self.css {
            out.push(EditorMessage::UpdateCss { css: css.clone() });
        }
        if let Some(enabled) = self.edit_mode {
            out.push(EditorMessage::SetEditMode { enabled });
        }
        if let Some(html) = &self.content {
            out.push(EditorMessage::UpdateContent { html: html.clone() });
        }
        if let Some(line) = self.scroll_line {
            out.push(EditorMessage::ScrollToLine { line });
        }
        if let Some(offset) = self.cursor {
            out.push(EditorMessage::SetCursor { offset });
        }
        out
    }
}

pub struct PreviewLink {
    endpoint: Endpoint,
    ready: bool,
    disconnected: bool,
    /// Values set before the first ready, latest per kind
    pending: LinkState,
    /// Last value sent per kind
    known: LinkState,
    /// Forces the next content push through even if unchanged
    content_stale: bool,
    frames_sent: usize,
}

impl PreviewLink {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ready: false,
            disconnected: false,
            pending: LinkState::default(),
            known: LinkState::default(),
            content_stale: false,
            frames_sent: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Number of frames handed to the transport
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    pub fn push_content(&mut self, html: String) {
        if !self.ready {
            self.pending.content = Some(html);
            return;
        }
        if !self.content_stale && self.known.content.as_deref() == Some(html.as_str()) {
            tracing::trace!("Skipping unchanged content push");
            return;
        }
        self.content_stale = false;
        self.known.content = Some(html.clone());
        self.send(EditorMessage::UpdateContent { html });
    }

    /// The rendered view no longer shows the last pushed content (it was
    /// edited in place), so the next push must not be deduplicated
    pub fn invalidate_content(&mut self) {
        self.content_stale = true;
    }

    pub fn push_css(&mut self, css: String) {
        if !self.ready {
            self.pending.css = Some(css);
            return;
        }
        self.known.css = Some(css.clone());
        self.send(EditorMessage::UpdateCss { css });
    }

    pub fn set_edit_mode(&mut self, enabled: bool) {
        if !self.ready {
            self.pending.edit_mode = Some(enabled);
            return;
        }
        self.known.edit_mode = Some(enabled);
        self.send(EditorMessage::SetEditMode { enabled });
    }

    pub fn scroll_to_line(&mut self, line: usize) {
        if !self.ready {
            self.pending.scroll_line = Some(line);
            return;
        }
        self.known.scroll_line = Some(line);
        self.send(EditorMessage::ScrollToLine { line });
    }

    pub fn set_cursor(&mut self, offset: usize) {
        if !self.ready {
            self.pending.cursor = Some(offset);
            return;
        }
        self.known.cursor = Some(offset);
        self.send(EditorMessage::SetCursor { offset });
    }

    /// Receive every queued render → editor message. `preview-ready` is
    /// handled here (withheld state is flushed) and also returned.
    pub fn drain(&mut self) -> Vec<PreviewMessage> {
        let mut received = Vec::new();
        loop {
            match self.endpoint.try_recv_frame() {
                Ok(frame) => match protocol::decode::<PreviewMessage>(&frame) {
                    Ok(message) => {
                        tracing::trace!("Preview message: {:?}", message);
                        if message == PreviewMessage::PreviewReady {
                            self.on_ready();
                        }
                        received.push(message);
                    }
                    Err(e) => tracing::warn!("Dropping malformed preview frame: {}", e),
                },
                Err(TryRecv::Empty) => break,
                Err(TryRecv::Closed) => {
                    if !self.disconnected {
                        tracing::info!("Preview channel closed");
                    }
                    self.disconnected = true;
                    break;
                }
            }
        }
        received
    }

    fn on_ready(&mut self) {
        let resend = self.ready;
        self.ready = true;
        self.known.absorb(std::mem::take(&mut self.pending));
        self.content_stale = false;
        let messages = self.known.messages();
        tracing::debug!(
            "Preview ready ({}), sending {} messages",
            if resend { "restarted" } else { "first" },
            messages.len()
        );
        for message in messages {
            self.send(message);
        }
    }

    fn send(&mut self, message: EditorMessage) {
        if self.disconnected {
            tracing::debug!("Preview disconnected, dropping {:?}", message);
            return;
        }
        let frame = match protocol::encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode preview message: {}", e);
                return;
            }
        };
        if self.endpoint.send_frame(frame) {
            self.frames_sent += 1;
        } else {
            tracing::info!("Preview channel closed");
            self.disconnected = true;
        }
    }
}
