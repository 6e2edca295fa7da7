use serde::{Deserialize, Serialize};

/// A position in the source text as resolved from the rendered view.
///
/// `offset` counts characters of rendered text from the start of the block
/// that begins on `line`. Markup characters never appear in rendered text,
/// so the offset is approximate when applied back to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePoint {
    pub line: usize,
    pub offset: usize,
}

impl SourcePoint {
    pub fn new(line: usize, offset: usize) -> Self {
        Self { line, offset }
    }

    /// Byte offset into `source` for this point.
    ///
    /// The line is clamped to the lines that exist and the offset to the
    /// length of that line.
    pub fn clamp_to(&self, source: &str) -> usize {
        let target = self.line.max(1);
        let mut line_start = 0;
        let mut line_text = "";
        let mut next_start = 0;
        for (idx, text) in source.split('\n').enumerate() {
            line_start = next_start;
            line_text = text;
            next_start += text.len() + 1;
            if idx + 1 >= target {
                break;
            }
        }
        let within = line_text
            .char_indices()
            .nth(self.offset)
            .map(|(byte, _)| byte)
            .unwrap_or(line_text.len());
        line_start + within
    }
}
