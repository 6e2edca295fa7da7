//! Markdown converter built on pulldown-cmark
//!
//! Block-level start events are replaced with [`Fragment::BlockStart`] so the
//! source map builder can attach line tags; every other event is rendered by
//! pulldown-cmark's own HTML writer in batches.

use super::source_map::{Converter, Fragment, LineIndex, RenderOutput};
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use pulldown_cmark_escape::escape_html;

#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    options: Options,
}

impl MarkdownConverter {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        Self { options }
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for MarkdownConverter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn convert(&self, source: &str) -> RenderOutput {
        let index = LineIndex::new(source);
        let mut sink = FragmentSink::default();

        for (event, range) in Parser::new_ext(source, self.options).into_offset_iter() {
            let line = index.line_of(range.start);
            match event {
                Event::Start(Tag::Paragraph) => sink.block("<p", ">", line),
                Event::Start(Tag::Heading { level, id, .. }) => {
                    let mut open = format!("<h{}", level as usize);
                    if let Some(id) = id {
                        open.push_str(&format!(" id=\"{}\"", escape_attr(&id)));
                    }
                    sink.block(&open, ">", line);
                }
                Event::Start(Tag::BlockQuote(_)) => sink.block("<blockquote", ">\n", line),
                Event::Start(Tag::CodeBlock(kind)) => {
                    let rest = match kind {
                        CodeBlockKind::Fenced(info) => {
                            match info.split_whitespace().next() {
                                Some(lang) => {
                                    format!("><code class=\"language-{}\">", escape_attr(lang))
                                }
                                None => "><code>".to_string(),
                            }
                        }
                        CodeBlockKind::Indented => "><code>".to_string(),
                    };
                    sink.block("<pre", &rest, line);
                }
                Event::Start(Tag::List(Some(1))) => sink.block("<ol", ">\n", line),
                Event::Start(Tag::List(Some(start))) => {
                    sink.block(&format!("<ol start=\"{}\"", start), ">\n", line)
                }
                Event::Start(Tag::List(None)) => sink.block("<ul", ">\n", line),
                Event::Start(Tag::Item) => sink.block("<li", ">", line),
                Event::Rule => sink.block("<hr", " />\n", line),
                Event::Start(Tag::Table(alignments)) => {
                    sink.block("<div class=\"table-block\"", ">\n", line);
                    sink.event(Event::Start(Tag::Table(alignments)));
                }
                Event::End(TagEnd::Table) => {
                    sink.event(Event::End(TagEnd::Table));
                    sink.markup("</div>\n");
                }
                Event::Start(Tag::HtmlBlock) => sink.block("<div class=\"html-block\"", ">\n", line),
                Event::End(TagEnd::HtmlBlock) => sink.markup("</div>\n"),
                other => sink.event(other),
            }
        }

        sink.finish()
    }
}

/// Collects fragments, batching plain events for the HTML writer
#[derive(Default)]
struct FragmentSink<'a> {
    fragments: Vec<Fragment>,
    pending: Vec<Event<'a>>,
}

impl<'a> FragmentSink<'a> {
    fn event(&mut self, event: Event<'a>) {
        self.pending.push(event);
    }

    fn block(&mut self, open: &str, rest: &str, line: Option<usize>) {
        self.flush();
        self.fragments.push(Fragment::BlockStart {
            open: open.to_string(),
            rest: rest.to_string(),
            line,
        });
    }

    fn markup(&mut self, markup: &str) {
        self.flush();
        self.fragments.push(Fragment::Markup(markup.to_string()));
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut html_out = String::new();
        html::push_html(&mut html_out, self.pending.drain(..));
        if !html_out.is_empty() {
            self.fragments.push(Fragment::Markup(html_out));
        }
    }

    fn finish(mut self) -> RenderOutput {
        self.flush();
        RenderOutput {
            fragments: self.fragments,
        }
    }
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    // writing into a String cannot fail
    let _ = escape_html(&mut escaped, value);
    escaped
}
