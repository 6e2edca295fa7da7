//! Source map builder
//!
//! Tags every structural block produced by a [`Converter`] with the 1-based
//! source line it originates from (`data-line="N"` on the block's opening
//! element). The preview side indexes those tags to translate positions in
//! both directions.
//!
//! Building is a pure function of the source text. Callers re-run it after
//! every content change; any debouncing belongs to the UI layer.

use std::fmt::Write as _;
use std::sync::Arc;

/// Attribute carrying the originating source line of a rendered block
pub const LINE_ATTR: &str = "data-line";

/// Byte offset → line lookup for a source text
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first character of every line
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            starts,
            len: text.len(),
        }
    }

    /// 1-based line containing `offset`, or `None` past the end of the text
    pub fn line_of(&self, offset: usize) -> Option<usize> {
        if offset > self.len {
            return None;
        }
        Some(self.starts.partition_point(|&start| start <= offset))
    }

    /// Byte offset at which the 1-based `line` starts
    pub fn line_start(&self, line: usize) -> Option<usize> {
        line.checked_sub(1).and_then(|i| self.starts.get(i).copied())
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

/// One piece of converter output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Opening of a structural block.
    ///
    /// `open` is the start of the opening tag up to (not including) the
    /// point where attributes may be appended, e.g. `<p` or
    /// `<ol start="3"`. `rest` completes it, e.g. `>` or `><code>`.
    BlockStart {
        open: String,
        rest: String,
        line: Option<usize>,
    },
    /// Markup emitted verbatim
    Markup(String),
}

/// Line-annotated output of a converter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub fragments: Vec<Fragment>,
}

/// Turns source markup into renderable output with per-block line annotations
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    fn convert(&self, source: &str) -> RenderOutput;
}

/// HTML tagged with source lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMappedRender {
    pub html: String,
    /// Sorted, de-duplicated lines carrying a tag
    pub tagged_lines: Vec<usize>,
}

#[derive(Clone)]
pub struct SourceMapBuilder {
    converter: Arc<dyn Converter>,
}

impl SourceMapBuilder {
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self { converter }
    }

    pub fn converter_name(&self) -> &str {
        self.converter.name()
    }

    pub fn build(&self, source: &str) -> SourceMappedRender {
        let output = self.converter.convert(source);
        let mut html = String::with_capacity(source.len() * 2);
        let mut tagged_lines = Vec::new();
        let mut untagged = 0usize;

        for fragment in output.fragments {
            match fragment {
                Fragment::BlockStart { open, rest, line } => {
                    html.push_str(&open);
                    match line {
                        Some(line) => {
                            let _ = write!(html, " {}=\"{}\"", LINE_ATTR, line);
                            tagged_lines.push(line);
                        }
                        None => untagged += 1,
                    }
                    html.push_str(&rest);
                }
                Fragment::Markup(markup) => html.push_str(&markup),
            }
        }

        tagged_lines.sort_unstable();
        tagged_lines.dedup();

        tracing::trace!(
            "Source map built with {}: {} tagged lines, {} untagged blocks",
            self.converter.name(),
            tagged_lines.len(),
            untagged
        );

        SourceMappedRender { html, tagged_lines }
    }
}
