//! Heading outline and section reordering

use super::source_map::LineIndex;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// One section of the document outline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    /// 1-based line of the heading; 0 for the preamble
    pub source_line_start: usize,
    pub title: String,
    /// Heading depth 1..=6; 0 for the preamble
    pub nesting_level: u8,
}

impl OutlineEntry {
    pub fn is_preamble(&self) -> bool {
        self.nesting_level == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    pub entries: Vec<OutlineEntry>,
}

impl Outline {
    pub fn parse(source: &str) -> Self {
        let index = LineIndex::new(source);
        let mut entries = Vec::new();
        let mut current: Option<OutlineEntry> = None;

        for (event, range) in Parser::new(source).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    current = Some(OutlineEntry {
                        source_line_start: index.line_of(range.start).unwrap_or(1),
                        title: String::new(),
                        nesting_level: level as u8,
                    });
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(entry) = current.as_mut() {
                        entry.title.push_str(&text);
                    }
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                _ => {}
            }
        }

        let first_heading_line = entries.first().map(|e| e.source_line_start);
        let has_preamble = match first_heading_line {
            Some(line) => source
                .lines()
                .take(line - 1)
                .any(|l| !l.trim().is_empty()),
            None => !source.trim().is_empty(),
        };
        if has_preamble {
            entries.insert(
                0,
                OutlineEntry {
                    source_line_start: 0,
                    title: String::new(),
                    nesting_level: 0,
                },
            );
        }

        Self { entries }
    }

    /// Index of the section containing the 1-based `line`
    pub fn section_at_line(&self, line: usize) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|entry| entry.source_line_start <= line)
    }

    /// Half-open range of 0-based line indices covered by section `idx`,
    /// including its subsections
    fn section_lines(&self, idx: usize, total_lines: usize) -> Option<(usize, usize)> {
        let entry = self.entries.get(idx)?;
        if entry.is_preamble() {
            return None;
        }
        let start = entry.source_line_start - 1;
        let end = self.entries[idx + 1..]
            .iter()
            .find(|next| next.nesting_level <= entry.nesting_level)
            .map(|next| next.source_line_start - 1)
            .unwrap_or(total_lines);
        Some((start, end))
    }
}

/// Move section `from` (with its subsections) so it starts where section `to`
/// starts; `to == entries.len()` moves it to the end of the document.
///
/// Returns `None` when the move is not possible: the preamble cannot move,
/// nothing can be placed before the preamble, and a section cannot move into
/// itself.
pub fn move_section(source: &str, from: usize, to: usize) -> Option<String> {
    let outline = Outline::parse(source);
    if from == to || to > outline.entries.len() {
        return None;
    }

    let had_trailing_newline = source.ends_with('\n') || source.is_empty();
    let normalized = if had_trailing_newline {
        source.to_string()
    } else {
        format!("{}\n", source)
    };
    let lines: Vec<&str> = normalized.split_inclusive('\n').collect();

    let (start, end) = outline.section_lines(from, lines.len())?;
    let insert_at = match outline.entries.get(to) {
        Some(entry) if entry.is_preamble() => return None,
        Some(entry) => entry.source_line_start - 1,
        None => lines.len(),
    };
    if insert_at > start && insert_at < end {
        return None;
    }

    let moved: Vec<&str> = lines[start..end].to_vec();
    let mut remaining: Vec<&str> = Vec::with_capacity(lines.len());
    remaining.extend_from_slice(&lines[..start]);
    remaining.extend_from_slice(&lines[end..]);
    let target = if insert_at >= end {
        insert_at - (end - start)
    } else {
        insert_at
    };

    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    result.extend_from_slice(&remaining[..target]);
    result.extend_from_slice(&moved);
    result.extend_from_slice(&remaining[target..]);

    let mut text = result.concat();
    if !had_trailing_newline {
        text.pop();
    }
    Some(text)
}
