// Property-based tests using proptest
// These tests generate random documents and edit sequences and verify invariants

mod common;

use common::harness::DocumentTestHarness;
use livedoc::model::markdown::MarkdownConverter;
use livedoc::model::position::SourcePoint;
use livedoc::model::source_map::{SourceMapBuilder, SourceMappedRender};
use livedoc::preview::dom::Dom;
use livedoc::preview::translator::{PositionTranslator, RenderPoint};
use proptest::prelude::*;
use std::path::Path;
use std::sync::Arc;

fn render(source: &str) -> SourceMappedRender {
    SourceMapBuilder::new(Arc::new(MarkdownConverter::new())).build(source)
}

/// Strategy for one markdown block
fn block_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-z]{1,8}( [a-z]{1,8}){0,4}",
        1 => "[a-z]{1,8}".prop_map(|w| format!("# {}", w)),
        1 => "[a-z]{1,8}".prop_map(|w| format!("## {}", w)),
        1 => prop::collection::vec("[a-z]{1,8}", 1..4).prop_map(|items| {
            items
                .iter()
                .map(|item| format!("- {}", item))
                .collect::<Vec<_>>()
                .join("\n")
        }),
        1 => "[a-z]{1,8}".prop_map(|w| format!("```\n{}\n```", w)),
        1 => "[a-z]{1,8}".prop_map(|w| format!("> {}", w)),
    ]
}

fn document_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(block_strategy(), 0..8).prop_map(|blocks| blocks.join("\n\n"))
}

/// Generate random controller operations
#[derive(Debug, Clone)]
enum DocOp {
    Edit(String),
    Revert,
    Save,
    Discard,
    Wait(u64),
}

fn doc_op_strategy() -> impl Strategy<Value = DocOp> {
    prop_oneof![
        4 => "[a-c]{0,4}".prop_map(DocOp::Edit),
        1 => Just(DocOp::Revert),
        1 => Just(DocOp::Save),
        1 => Just(DocOp::Discard),
        2 => (0u64..1500).prop_map(DocOp::Wait),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    /// Property test: a line maps to the tagged block starting at it, or else
    /// the nearest tagged block before it
    #[test]
    fn prop_line_lookup_is_nearest_preceding(source in document_strategy()) {
        let render = render(&source);
        let dom = Dom::parse(&render.html, 1);
        let translator = PositionTranslator::index(&dom);
        let line_count = source.split('\n').count();

        for line in 1..=line_count + 2 {
            let expected = render.tagged_lines.iter().copied().filter(|&l| l <= line).max();
            let found = translator.line_to_render_ref(line).map(|b| b.source_line_start);
            prop_assert_eq!(
                found,
                expected,
                "line {} of {:?}\nhtml: {}",
                line,
                source,
                render.html
            );
        }
    }

    /// Property test: every tagged line lands on a block that maps back to it
    #[test]
    fn prop_mapping_round_trips(source in document_strategy()) {
        let render = render(&source);
        let dom = Dom::parse(&render.html, 1);
        let translator = PositionTranslator::index(&dom);
        prop_assert_eq!(translator.len(), render.tagged_lines.len());

        for &line in &render.tagged_lines {
            let block = translator.line_to_render_ref(line).unwrap();
            prop_assert_eq!(block.source_line_start, line);
            let back = translator.render_ref_to_line(&dom, RenderPoint::start_of(block.dom_ref));
            prop_assert_eq!(back, Some(SourcePoint::new(line, 0)));
        }
    }

    /// Property test: rendering is a pure function of the source
    #[test]
    fn prop_render_is_deterministic(source in document_strategy()) {
        prop_assert_eq!(render(&source), render(&source));
    }

    /// Property test: clamped source points always land on a char boundary
    /// inside the text
    #[test]
    fn prop_clamp_stays_in_bounds(
        source in "[a-zé\n]{0,40}",
        line in 0usize..20,
        offset in 0usize..20,
    ) {
        let at = SourcePoint::new(line, offset).clamp_to(&source);
        prop_assert!(at <= source.len());
        prop_assert!(source.is_char_boundary(at));
    }

    /// Property test: dirty always equals "content differs from disk", and
    /// saved content is what reopening yields
    #[test]
    fn prop_dirty_tracks_disk(ops in prop::collection::vec(doc_op_strategy(), 1..30)) {
        let mut h = DocumentTestHarness::new();
        h.fs.insert("/doc.md", "base");
        h.open("/doc.md");

        for op in &ops {
            match op {
                DocOp::Edit(text) => {
                    h.controller.set_content(text.clone());
                }
                DocOp::Revert => {
                    let disk = h.fs.get(Path::new("/doc.md")).unwrap();
                    h.controller.set_content(disk);
                }
                DocOp::Save => h.controller.save().unwrap(),
                DocOp::Discard => h.controller.discard().unwrap(),
                DocOp::Wait(ms) => h.advance(*ms),
            }
            let disk = h.fs.get(Path::new("/doc.md")).unwrap();
            prop_assert_eq!(
                h.controller.dirty(),
                h.controller.content() != disk,
                "after {:?}",
                op
            );
        }

        let content = h.controller.content().to_string();
        let dirty = h.controller.dirty();
        h.restart();
        h.open("/doc.md");
        prop_assert_eq!(h.controller.content(), content.as_str());
        prop_assert_eq!(h.controller.dirty(), dirty);
    }
}
