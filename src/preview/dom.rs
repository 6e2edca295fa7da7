//! Document tree of the rendered view
//!
//! The rendering context parses every `update-content` payload into an
//! arena of nodes. Nodes are addressed by [`DomRef`], which carries the
//! generation of the tree it was taken from: once the tree is replaced, old
//! refs stop resolving instead of pointing at unrelated nodes.

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Weak handle to a node of a particular tree generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomRef {
    generation: u64,
    index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<usize>,
    kind: NodeKind,
    children: Vec<usize>,
}

/// Elements that never have children
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is raw text up to the matching close tag
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements separated from their neighbours by a blank line in plain text
const BLOCK_ELEMENTS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "pre",
    "blockquote",
    "div",
    "ul",
    "ol",
    "table",
    "hr",
];

/// Elements separated from their neighbours by a single line break
const LINE_ELEMENTS: &[&str] = &["li", "tr", "br"];

#[derive(Debug, Clone)]
pub struct Dom {
    generation: u64,
    nodes: Vec<Node>,
}

impl Dom {
    /// Tree holding only the root element
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            nodes: vec![Node {
                parent: None,
                kind: NodeKind::Element {
                    tag: "#root".to_string(),
                    attrs: Vec::new(),
                },
                children: Vec::new(),
            }],
        }
    }

    /// Parse an HTML fragment. Unknown or unbalanced markup is tolerated:
    /// stray close tags are ignored and unclosed elements end with their
    /// parent.
    pub fn parse(html: &str, generation: u64) -> Self {
        let mut dom = Self::empty(generation);
        TreeBuilder::new(&mut dom).run(html);
        dom
    }

    /// Tree of `<p>` blocks holding plain text, one per blank-line separated
    /// paragraph
    pub fn from_plain_text(text: &str, generation: u64) -> Self {
        let mut dom = Self::empty(generation);
        for paragraph in text.split("\n\n") {
            let p = dom.push_element(0, "p", Vec::new());
            if !paragraph.is_empty() {
                dom.push_text(p, paragraph.to_string());
            }
        }
        dom
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn root(&self) -> DomRef {
        self.make_ref(0)
    }

    fn make_ref(&self, index: usize) -> DomRef {
        DomRef {
            generation: self.generation,
            index,
        }
    }

    fn index_of(&self, node: DomRef) -> Option<usize> {
        (node.generation == self.generation && node.index < self.nodes.len()).then_some(node.index)
    }

    /// True if `node` was taken from this tree
    pub fn contains(&self, node: DomRef) -> bool {
        self.index_of(node).is_some()
    }

    pub fn kind(&self, node: DomRef) -> Option<&NodeKind> {
        self.index_of(node).map(|i| &self.nodes[i].kind)
    }

    pub fn tag(&self, node: DomRef) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attr(&self, node: DomRef, name: &str) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn parent(&self, node: DomRef) -> Option<DomRef> {
        let index = self.index_of(node)?;
        self.nodes[index].parent.map(|p| self.make_ref(p))
    }

    pub fn children(&self, node: DomRef) -> Vec<DomRef> {
        match self.index_of(node) {
            Some(index) => self.nodes[index]
                .children
                .iter()
                .map(|&c| self.make_ref(c))
                .collect(),
            None => Vec::new(),
        }
    }

    /// `node` followed by its ancestors up to the root
    pub fn ancestors(&self, node: DomRef) -> impl Iterator<Item = DomRef> + '_ {
        std::iter::successors(self.contains(node).then_some(node), move |&n| self.parent(n))
    }

    /// Pre-order traversal of the subtree rooted at `node`
    pub fn descendants(&self, node: DomRef) -> Vec<DomRef> {
        let mut out = Vec::new();
        let Some(start) = self.index_of(node) else {
            return out;
        };
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            out.push(self.make_ref(index));
            stack.extend(self.nodes[index].children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of every text node under `node`
    pub fn text_content(&self, node: DomRef) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|n| match self.kind(n) {
                Some(NodeKind::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Length of [`Dom::text_content`] in characters
    pub fn text_len(&self, node: DomRef) -> usize {
        self.descendants(node)
            .into_iter()
            .map(|n| match self.kind(n) {
                Some(NodeKind::Text(text)) => text.chars().count(),
                _ => 0,
            })
            .sum()
    }

    /// Characters of text under `container` that precede the point
    /// `(node, offset)`.
    ///
    /// For a text node `offset` is a character index into it; for an element
    /// it is the number of leading children before the point. Returns `None`
    /// if `node` is not inside `container`.
    pub fn text_offset_within(&self, container: DomRef, node: DomRef, offset: usize) -> Option<usize> {
        if !self.ancestors(node).any(|a| a == container) {
            return None;
        }
        let mut count = 0;
        for n in self.descendants(container) {
            if n == node {
                break;
            }
            if let Some(NodeKind::Text(text)) = self.kind(n) {
                count += text.chars().count();
            }
        }
        let inner = match self.kind(node)? {
            NodeKind::Text(text) => offset.min(text.chars().count()),
            NodeKind::Element { .. } => self
                .children(node)
                .into_iter()
                .take(offset)
                .map(|child| self.text_len(child))
                .sum(),
        };
        Some(count + inner)
    }

    /// Inverse of [`Dom::text_offset_within`]: the text node and character
    /// index reached after `offset` characters of `container`'s text.
    /// Offsets past the end land at the end of the last text node; a
    /// container without text yields `(container, 0)`.
    pub fn point_at_text_offset(&self, container: DomRef, offset: usize) -> Option<(DomRef, usize)> {
        if !self.contains(container) {
            return None;
        }
        let mut remaining = offset;
        let mut last = None;
        for n in self.descendants(container) {
            if let Some(NodeKind::Text(text)) = self.kind(n) {
                let len = text.chars().count();
                if remaining <= len {
                    return Some((n, remaining));
                }
                remaining -= len;
                last = Some((n, len));
            }
        }
        Some(last.unwrap_or((container, 0)))
    }

    /// Insert `text` into a text node at a character index
    pub fn insert_text(&mut self, node: DomRef, offset: usize, text: &str) -> bool {
        let Some(index) = self.index_of(node) else {
            return false;
        };
        match &mut self.nodes[index].kind {
            NodeKind::Text(existing) => {
                let byte = existing
                    .char_indices()
                    .nth(offset)
                    .map(|(b, _)| b)
                    .unwrap_or(existing.len());
                existing.insert_str(byte, text);
                true
            }
            NodeKind::Element { .. } => false,
        }
    }

    /// Plain text of the whole tree with block structure turned into line
    /// breaks. All markup is lost.
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        self.write_inner_text(0, &mut out);
        while out.ends_with('\n') {
            out.pop();
        }
        out
    }

    fn write_inner_text(&self, index: usize, out: &mut String) {
        match &self.nodes[index].kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element { tag, .. } => {
                let breaks = if BLOCK_ELEMENTS.contains(&tag.as_str()) {
                    2
                } else if LINE_ELEMENTS.contains(&tag.as_str()) {
                    1
                } else {
                    0
                };
                ensure_breaks(out, breaks);
                if tag == "br" {
                    out.push('\n');
                }
                if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for &child in &self.nodes[index].children {
                    self.write_inner_text(child, out);
                }
                ensure_breaks(out, breaks);
            }
        }
    }

    fn push_element(&mut self, parent: usize, tag: &str, attrs: Vec<(String, String)>) -> usize {
        self.push_node(
            parent,
            NodeKind::Element {
                tag: tag.to_string(),
                attrs,
            },
        )
    }

    fn push_text(&mut self, parent: usize, text: String) -> usize {
        self.push_node(parent, NodeKind::Text(text))
    }

    fn push_node(&mut self, parent: usize, kind: NodeKind) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            kind,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);
        index
    }
}

fn ensure_breaks(out: &mut String, count: usize) {
    if out.is_empty() || count == 0 {
        return;
    }
    let existing = out.chars().rev().take_while(|&c| c == '\n').count();
    for _ in existing..count {
        out.push('\n');
    }
}

/// Builds the arena from quick-xml events in lenient mode. End tags are
/// matched against our own stack so stray or misnested ones are dropped.
struct TreeBuilder<'d> {
    dom: &'d mut Dom,
    /// Open elements, innermost last; index 0 is the root
    stack: Vec<usize>,
}

impl<'d> TreeBuilder<'d> {
    fn new(dom: &'d mut Dom) -> Self {
        Self {
            dom,
            stack: vec![0],
        }
    }

    fn current(&self) -> usize {
        *self.stack.last().unwrap_or(&0)
    }

    fn run(mut self, html: &str) {
        let mut reader = Reader::from_str(html);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    let tag = tag_name(start.name().as_ref());
                    let parent = self.current();
                    let index = self.dom.push_element(parent, &tag, attributes(&start));
                    if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                        match reader.read_text(start.name()) {
                            Ok(body) => {
                                if !body.is_empty() {
                                    self.dom.push_text(index, body.into_owned());
                                }
                            }
                            Err(e) => {
                                tracing::debug!("Unterminated <{}> in preview markup: {}", tag, e);
                                break;
                            }
                        }
                    } else if !VOID_ELEMENTS.contains(&tag.as_str()) {
                        self.stack.push(index);
                    }
                }
                Ok(Event::Empty(start)) => {
                    let tag = tag_name(start.name().as_ref());
                    let parent = self.current();
                    self.dom.push_element(parent, &tag, attributes(&start));
                }
                Ok(Event::End(end)) => self.close(&tag_name(end.name().as_ref())),
                Ok(Event::Text(text)) => self.text(&String::from_utf8_lossy(&text), true),
                Ok(Event::CData(data)) => self.text(&String::from_utf8_lossy(&data), false),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        "Stopping at malformed preview markup (byte {}): {}",
                        reader.buffer_position(),
                        e
                    );
                    break;
                }
            }
        }
    }

    fn text(&mut self, raw: &str, escaped: bool) {
        let in_pre = self.stack.iter().any(|&i| {
            matches!(&self.dom.nodes[i].kind, NodeKind::Element { tag, .. } if tag == "pre")
        });
        // whitespace between block tags is formatting, not content
        if !in_pre && raw.contains('\n') && raw.trim().is_empty() {
            return;
        }
        let text = if escaped {
            decode_entities(raw)
        } else {
            raw.to_string()
        };
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        self.dom.push_text(parent, text);
    }

    fn close(&mut self, name: &str) {
        let position = self.stack.iter().rposition(|&i| {
            matches!(&self.dom.nodes[i].kind, NodeKind::Element { tag, .. } if tag == name)
        });
        match position {
            Some(pos) if pos > 0 => self.stack.truncate(pos),
            _ => tracing::trace!("Ignoring stray close tag </{}>", name),
        }
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn attributes(start: &BytesStart<'_>) -> Vec<(String, String)> {
    start
        .html_attributes()
        .map_while(Result::ok)
        .map(|attr| {
            let name = tag_name(attr.key.as_ref());
            let value = decode_entities(&String::from_utf8_lossy(&attr.value));
            (name, value)
        })
        .collect()
}

/// HTML entity decoding; text with a malformed reference is kept verbatim
fn decode_entities(raw: &str) -> String {
    match unescape_with(raw, resolve_html5_entity) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.to_string(),
    }
}
