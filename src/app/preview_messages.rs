//! Dispatch of messages coming back from the rendering context

use super::{ActiveSurface, DocumentController, EditOrigin};
use crate::sync::protocol::PreviewMessage;

impl DocumentController {
    /// Handle every message the preview has sent since the last call.
    /// Returns the number of messages handled.
    pub fn pump_preview(&mut self) -> usize {
        let Some(link) = self.link.as_mut() else {
            return 0;
        };
        let messages = link.drain();
        let count = messages.len();
        for message in messages {
            self.handle_preview_message(message);
        }
        count
    }

    fn handle_preview_message(&mut self, message: PreviewMessage) {
        match message {
            PreviewMessage::PreviewReady => {
                tracing::debug!("Preview ready");
            }
            PreviewMessage::PreviewCursor { offset } => {
                self.preview_caret = Some(offset);
            }
            PreviewMessage::PreviewEdit { text } => {
                // last writer wins; formatting lost in the preview stays lost
                self.apply_mutation(EditOrigin::VisualEdit, text);
            }
            PreviewMessage::PreviewTab { target } => {
                self.active_surface = ActiveSurface::Source;
                match target {
                    Some(point) => {
                        let line = self.document.set_cursor_line(point.line);
                        self.source_cursor = point.clamp_to(self.document.content());
                        tracing::trace!("Tab from preview to line {} offset {}", line, point.offset);
                    }
                    None => tracing::debug!("Tab from preview at an unresolved position"),
                }
            }
        }
    }
}
