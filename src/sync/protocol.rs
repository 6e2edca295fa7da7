//! Messages exchanged between the editing and rendering contexts
//!
//! Every frame is a JSON object `{ "type": "<kebab-case>", ...payload }`.

use crate::model::position::SourcePoint;
use serde::{Deserialize, Serialize};

/// Editor → render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EditorMessage {
    UpdateContent { html: String },
    UpdateCss { css: String },
    ScrollToLine { line: usize },
    SetCursor { offset: usize },
    SetEditMode { enabled: bool },
}

/// Render → editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PreviewMessage {
    PreviewReady,
    PreviewCursor { offset: usize },
    PreviewEdit { text: String },
    PreviewTab { target: Option<SourcePoint> },
}

pub fn encode<T: Serialize>(message: &T) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

pub fn decode<'a, T: Deserialize<'a>>(frame: &'a str) -> serde_json::Result<T> {
    serde_json::from_str(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let frame = encode(&EditorMessage::ScrollToLine { line: 12 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"type": "scroll-to-line", "line": 12}));

        let frame = encode(&PreviewMessage::PreviewReady).unwrap();
        assert_eq!(frame, r#"{"type":"preview-ready"}"#);
    }

    #[test]
    fn test_preview_tab_target() {
        let resolved: PreviewMessage =
            decode(r#"{"type":"preview-tab","target":{"line":4,"offset":2}}"#).unwrap();
        assert_eq!(
            resolved,
            PreviewMessage::PreviewTab {
                target: Some(SourcePoint::new(4, 2))
            }
        );
        let unresolved: PreviewMessage = decode(r#"{"type":"preview-tab","target":null}"#).unwrap();
        assert_eq!(unresolved, PreviewMessage::PreviewTab { target: None });
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(decode::<PreviewMessage>(r#"{"type":"preview-explode"}"#).is_err());
        assert!(decode::<EditorMessage>(r#"{"html":"<p>"}"#).is_err());
        assert!(decode::<EditorMessage>("not json").is_err());
    }
}
