//! Position translator
//!
//! Maps source lines to tagged blocks of the rendered DOM and positions
//! inside the DOM back to source lines. The index only holds weak
//! [`DomRef`]s; it is rebuilt whenever the DOM is replaced.

use super::dom::{Dom, DomRef};
use crate::model::position::SourcePoint;
use crate::model::source_map::LINE_ATTR;
use std::collections::BTreeMap;

/// A tagged structural block of the rendered view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBlock {
    /// 1-based source line; 0 for the preamble
    pub source_line_start: usize,
    pub title: String,
    /// Heading depth 1..=6; 0 for preamble and non-heading blocks
    pub nesting_level: u8,
    pub dom_ref: DomRef,
}

/// A point inside the rendered DOM.
///
/// For a text node `offset` is a character index into it; for an element it
/// is the number of leading children before the point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPoint {
    pub node: DomRef,
    pub offset: usize,
}

impl RenderPoint {
    /// The point at the start of `node`
    pub fn start_of(node: DomRef) -> Self {
        Self { node, offset: 0 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionTranslator {
    blocks: BTreeMap<usize, RenderedBlock>,
}

impl PositionTranslator {
    /// Index every element carrying a line tag. When several elements share
    /// a line (a list and its first item) the outermost, first in document
    /// order, wins.
    pub fn index(dom: &Dom) -> Self {
        let mut blocks = BTreeMap::new();
        for node in dom.descendants(dom.root()) {
            let Some(line) = dom.attr(node, LINE_ATTR).and_then(parse_line) else {
                continue;
            };
            blocks.entry(line).or_insert_with(|| {
                let nesting_level = heading_level(dom.tag(node).unwrap_or_default());
                let title = if nesting_level > 0 {
                    dom.text_content(node).trim().to_string()
                } else {
                    String::new()
                };
                RenderedBlock {
                    source_line_start: line,
                    title,
                    nesting_level,
                    dom_ref: node,
                }
            });
        }
        tracing::trace!("Indexed {} tagged blocks", blocks.len());
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &RenderedBlock> {
        self.blocks.values()
    }

    /// Block starting exactly at `line`, or else the nearest block starting
    /// before it. `None` when no block starts at or before `line`.
    pub fn line_to_render_ref(&self, line: usize) -> Option<&RenderedBlock> {
        if line == 0 {
            return self.blocks.get(&0);
        }
        self.blocks.range(..=line).next_back().map(|(_, block)| block)
    }

    /// Resolve a DOM point to the line of its nearest tagged ancestor plus
    /// the number of rendered characters between that block's start and the
    /// point. `None` if no ancestor is tagged or the point is stale.
    pub fn render_ref_to_line(&self, dom: &Dom, point: RenderPoint) -> Option<SourcePoint> {
        let (block, line) = dom
            .ancestors(point.node)
            .find_map(|n| dom.attr(n, LINE_ATTR).and_then(parse_line).map(|l| (n, l)))?;
        let offset = dom.text_offset_within(block, point.node, point.offset)?;
        Some(SourcePoint::new(line, offset))
    }
}

fn parse_line(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}

fn heading_level(tag: &str) -> u8 {
    match tag {
        "h1" => 1,
        "h2" => 2,
        "h3" => 3,
        "h4" => 4,
        "h5" => 5,
        "h6" => 6,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = "<h1 data-line=\"1\">Title</h1>\n\
        <p data-line=\"3\">Some <em>body</em> text</p>\n\
        <ul data-line=\"5\">\n<li data-line=\"5\">one</li>\n<li data-line=\"6\">two</li>\n</ul>\n\
        <div>untagged <span>inner</span></div>\n\
        <h2 data-line=\"10\">Next</h2>\n";

    fn setup() -> (Dom, PositionTranslator) {
        let dom = Dom::parse(HTML, 1);
        let translator = PositionTranslator::index(&dom);
        (dom, translator)
    }

    #[test]
    fn test_index_blocks() {
        let (dom, translator) = setup();
        let lines: Vec<_> = translator.blocks().map(|b| b.source_line_start).collect();
        assert_eq!(lines, vec![1, 3, 5, 6, 10]);

        let h2 = translator.line_to_render_ref(10).unwrap();
        assert_eq!(h2.title, "Next");
        assert_eq!(h2.nesting_level, 2);
        // outer list wins over its first item
        let list = translator.line_to_render_ref(5).unwrap();
        assert_eq!(dom.tag(list.dom_ref), Some("ul"));
    }

    #[test]
    fn test_exact_and_nearest_preceding() {
        let (_, translator) = setup();
        assert_eq!(translator.line_to_render_ref(3).unwrap().source_line_start, 3);
        assert_eq!(translator.line_to_render_ref(4).unwrap().source_line_start, 3);
        assert_eq!(translator.line_to_render_ref(9).unwrap().source_line_start, 6);
        assert_eq!(translator.line_to_render_ref(500).unwrap().source_line_start, 10);
    }

    #[test]
    fn test_no_preceding_block() {
        let dom = Dom::parse("<p>plain</p><p data-line=\"4\">x</p>", 1);
        let translator = PositionTranslator::index(&dom);
        assert!(translator.line_to_render_ref(0).is_none());
        assert!(translator.line_to_render_ref(3).is_none());
        assert!(translator.line_to_render_ref(4).is_some());
        assert!(PositionTranslator::default().line_to_render_ref(1).is_none());
    }

    #[test]
    fn test_render_ref_to_line_counts_rendered_chars() {
        let (dom, translator) = setup();
        let p = translator.line_to_render_ref(3).unwrap().dom_ref;
        let em = dom.children(p)[1];
        let body = dom.children(em)[0];

        let point = translator
            .render_ref_to_line(&dom, RenderPoint { node: body, offset: 2 })
            .unwrap();
        // "Some " + "bo"
        assert_eq!(point, SourcePoint::new(3, 7));
    }

    #[test]
    fn test_render_ref_in_nested_item() {
        let (dom, translator) = setup();
        let item = translator.line_to_render_ref(6).unwrap().dom_ref;
        let text = dom.children(item)[0];
        let point = translator
            .render_ref_to_line(&dom, RenderPoint { node: text, offset: 3 })
            .unwrap();
        assert_eq!(point, SourcePoint::new(6, 3));
    }

    #[test]
    fn test_untagged_ancestor_is_unresolved() {
        let (dom, translator) = setup();
        let span = dom
            .descendants(dom.root())
            .into_iter()
            .find(|&n| dom.tag(n) == Some("span"))
            .unwrap();
        assert_eq!(
            translator.render_ref_to_line(&dom, RenderPoint::start_of(span)),
            None
        );
    }

    #[test]
    fn test_stale_point_is_unresolved() {
        let (dom, translator) = setup();
        let stale = translator.line_to_render_ref(1).unwrap().dom_ref;
        let replaced = Dom::parse(HTML, 2);
        assert!(dom.contains(stale));
        assert_eq!(
            translator.render_ref_to_line(&replaced, RenderPoint::start_of(stale)),
            None
        );
    }

    #[test]
    fn test_round_trip_is_stable() {
        let (dom, translator) = setup();
        for line in 1..12 {
            let Some(block) = translator.line_to_render_ref(line) else {
                continue;
            };
            let back = translator
                .render_ref_to_line(&dom, RenderPoint::start_of(block.dom_ref))
                .unwrap();
            let again = translator.line_to_render_ref(back.line).unwrap();
            assert_eq!(again.dom_ref, block.dom_ref, "line {}", line);
        }
    }
}
