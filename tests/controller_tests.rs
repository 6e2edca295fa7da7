// Document controller integration tests: reconciliation on open, shadow
// autosave, save/discard and the open-with-unsaved-changes decision

mod common;

use common::harness::DocumentTestHarness;
use livedoc::app::{ControllerOptions, DocumentError, OpenDecision, OpenOutcome, SaveOutcome};
use livedoc::model::document::DocumentPath;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[test]
fn test_dirty_shadow_wins_over_disk() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "Y");
    h.seed_shadow("/notes.md", "X", true);

    assert_eq!(h.open("/notes.md"), OpenOutcome::Opened);
    assert_eq!(h.controller.content(), "X");
    assert!(h.controller.dirty());
    assert_eq!(h.controller.document().saved_content(), "Y");
}

#[test]
fn test_clean_shadow_is_ignored() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "Y");
    h.seed_shadow("/notes.md", "stale", false);

    h.open("/notes.md");
    assert_eq!(h.controller.content(), "Y");
    assert!(!h.controller.dirty());
}

#[test]
fn test_open_without_shadow_uses_disk() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "# Notes\n");
    h.open("/notes.md");
    assert_eq!(h.controller.content(), "# Notes\n");
    assert_eq!(
        h.controller.path(),
        &DocumentPath::File(PathBuf::from("/notes.md"))
    );
    assert!(h.controller.status_message().unwrap().contains("/notes.md"));
}

#[test]
fn test_unreadable_shadow_falls_back_to_disk() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "Y");
    h.seed_shadow("/notes.md", "X", true);
    h.db.lock().unwrap().close();

    h.open("/notes.md");
    assert_eq!(h.controller.content(), "Y");
    assert!(!h.controller.dirty());
}

#[test]
fn test_recovery_disabled_ignores_shadow() {
    let mut h = DocumentTestHarness::with_options(ControllerOptions {
        recovery_enabled: false,
        ..ControllerOptions::default()
    });
    h.fs.insert("/notes.md", "Y");
    h.seed_shadow("/notes.md", "X", true);

    h.open("/notes.md");
    assert_eq!(h.controller.content(), "Y");
    h.controller.set_content("edit".into());
    assert!(!h.controller.shadow_pending());
}

#[test]
fn test_open_missing_file_keeps_current_document() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.open("/a.md");

    assert!(h.controller.open(Path::new("/missing.md")).is_err());
    assert_eq!(h.controller.content(), "A");
    assert_eq!(h.controller.path().file(), Some(Path::new("/a.md")));
    assert!(h.controller.status_message().unwrap().contains("missing.md"));
}

#[test]
fn test_rapid_edits_write_one_shadow() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "");
    h.open("/notes.md");

    let mut text = String::new();
    for c in "hello world".chars() {
        text.push(c);
        h.controller.set_content(text.clone());
        h.advance(100);
    }
    assert!(h.controller.shadow_pending());
    assert!(h.shadow("/notes.md").is_none());

    h.advance(1000);
    assert!(!h.controller.shadow_pending());
    h.settle();

    let record = h.shadow("/notes.md").unwrap();
    assert_eq!(record.content, "hello world");
    assert!(record.is_dirty);
    assert_eq!(h.controller.worker_stats().shadow_writes, 1);
}

#[test]
fn test_unsaved_edits_survive_restart() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "disk");
    h.open("/notes.md");
    h.controller.set_content("typed before the crash".into());
    h.advance(1000);

    h.restart();
    h.open("/notes.md");
    assert_eq!(h.controller.content(), "typed before the crash");
    assert!(h.controller.dirty());
}

#[test]
fn test_close_flushes_pending_shadow() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "disk");
    h.open("/notes.md");
    h.controller.set_content("not yet autosaved".into());
    assert!(h.controller.shadow_pending());

    h.settle();
    let record = h.shadow("/notes.md").unwrap();
    assert_eq!(record.content, "not yet autosaved");
    assert!(record.is_dirty);
}

#[test]
fn test_save_writes_disk_and_clean_shadow() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "old");
    h.open("/notes.md");
    h.controller.set_content("new".into());
    h.advance(1000);

    h.controller.save().unwrap();
    assert_eq!(h.fs.get(Path::new("/notes.md")).as_deref(), Some("new"));
    assert!(!h.controller.dirty());
    assert!(!h.controller.shadow_pending());

    let record = h.shadow("/notes.md").unwrap();
    assert_eq!(record.content, "new");
    assert!(!record.is_dirty);

    h.restart();
    h.open("/notes.md");
    assert_eq!(h.controller.content(), "new");
    assert!(!h.controller.dirty());
}

#[test]
fn test_failed_save_keeps_changes() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "old");
    h.open("/notes.md");
    h.controller.set_content("new".into());
    h.fs.set_fail_saves(true);

    assert!(h.controller.save().is_err());
    assert!(h.controller.dirty());
    assert_eq!(h.fs.get(Path::new("/notes.md")).as_deref(), Some("old"));
    assert!(h.controller.status_message().is_some());
}

#[test]
fn test_save_untitled_requires_target() {
    let mut h = DocumentTestHarness::new();
    h.controller.set_content("draft".into());

    let err = h.controller.save().unwrap_err();
    assert_eq!(
        err.downcast_ref::<DocumentError>(),
        Some(&DocumentError::SaveTargetMissing)
    );
    assert!(h.controller.dirty());
    assert_eq!(h.fs.save_count(), 0);
}

#[test]
fn test_save_as_cancelled_writes_nothing() {
    let mut h = DocumentTestHarness::new();
    h.controller.set_content("draft".into());
    assert_eq!(h.controller.save_as(None).unwrap(), SaveOutcome::Cancelled);
    assert_eq!(h.fs.save_count(), 0);
    assert!(h.controller.dirty());
}

#[test]
fn test_save_as_adopts_new_path() {
    let mut h = DocumentTestHarness::new();
    h.controller.set_content("draft".into());

    let outcome = h.controller.save_as(Some(PathBuf::from("/draft.md"))).unwrap();
    assert_eq!(outcome, SaveOutcome::Saved(PathBuf::from("/draft.md")));
    assert_eq!(h.controller.path().file(), Some(Path::new("/draft.md")));
    assert!(!h.controller.dirty());
    assert_eq!(h.fs.get(Path::new("/draft.md")).as_deref(), Some("draft"));
    assert!(!h.shadow("/draft.md").unwrap().is_dirty);
}

/// Save target and the watched path's shadow content at that moment
type SaveLog = Arc<Mutex<Vec<(PathBuf, Option<String>)>>>;

/// Records, for every disk save, the target and what the store held for
/// `watched` at that moment
fn observe_saves(h: &DocumentTestHarness, watched: &str) -> SaveLog {
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();
    let db = h.db.clone();
    let watched = PathBuf::from(watched);
    h.fs.set_save_observer(move |target| {
        let record = db.lock().unwrap().read_shadow(&watched).unwrap();
        seen.lock()
            .unwrap()
            .push((target.to_path_buf(), record.map(|r| r.content)));
    });
    log
}

#[test]
fn test_save_as_flushes_old_path_before_writing_target() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.open("/a.md");
    h.controller.set_content("A edited".into());
    assert!(h.controller.shadow_pending());
    let saves = observe_saves(&h, "/a.md");

    h.controller.save_as(Some(PathBuf::from("/b.md"))).unwrap();
    assert_eq!(
        *saves.lock().unwrap(),
        vec![(PathBuf::from("/b.md"), Some("A edited".to_string()))]
    );
    assert!(!h.controller.shadow_pending());
    assert!(!h.shadow("/b.md").unwrap().is_dirty);
}

#[test]
fn test_failed_save_as_still_flushes_old_path() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.open("/a.md");
    h.controller.set_content("A edited".into());
    let saves = observe_saves(&h, "/a.md");
    h.fs.set_fail_saves(true);

    assert!(h.controller.save_as(Some(PathBuf::from("/b.md"))).is_err());
    assert_eq!(saves.lock().unwrap().len(), 1);
    assert_eq!(h.controller.path().file(), Some(Path::new("/a.md")));
    assert!(h.controller.dirty());
    let record = h.shadow("/a.md").unwrap();
    assert_eq!(record.content, "A edited");
    assert!(record.is_dirty);
    assert!(h.fs.get(Path::new("/b.md")).is_none());
}

#[test]
fn test_discard_reverts_to_disk() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "line 1\nline 2\nline 3\n");
    h.open("/notes.md");
    h.controller
        .set_content("line 1\nline 2\nline 3\nscratch\nmore scratch\n".into());
    h.controller.set_cursor_line(5);
    h.advance(1000);
    h.controller.flush_shadow().unwrap();

    h.controller.discard().unwrap();
    assert_eq!(h.controller.content(), "line 1\nline 2\nline 3\n");
    assert!(!h.controller.dirty());
    assert_eq!(h.controller.cursor_line(), 4);
    assert!(h.shadow("/notes.md").is_none());
}

#[test]
fn test_discard_untitled_resets_template() {
    let mut h = DocumentTestHarness::new();
    h.controller.set_content("scratch".into());
    h.controller.discard().unwrap();
    assert_eq!(h.controller.content(), "# Untitled\n\n");
    assert!(!h.controller.dirty());
}

#[test]
fn test_discard_with_unreadable_disk_changes_nothing() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "disk");
    h.open("/notes.md");
    h.controller.set_content("edit".into());
    h.fs.set_fail_loads(true);

    assert!(h.controller.discard().is_err());
    assert_eq!(h.controller.content(), "edit");
    assert!(h.controller.dirty());
}

#[test]
fn test_switching_files_flushes_pending_shadow() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.fs.insert("/b.md", "B");
    h.open("/a.md");

    // edited and typed back: clean, but an autosave is still pending
    h.controller.set_content("A2".into());
    h.controller.set_content("A".into());
    assert!(!h.controller.dirty());
    assert!(h.controller.shadow_pending());

    assert_eq!(h.open("/b.md"), OpenOutcome::Opened);
    let record = h.shadow("/a.md").unwrap();
    assert_eq!(record.content, "A");
    assert!(!record.is_dirty);
    assert!(!h.controller.shadow_pending());
}

#[test]
fn test_open_while_dirty_needs_decision() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.fs.insert("/b.md", "B");
    h.open("/a.md");
    h.controller.set_content("A edited".into());

    assert_eq!(
        h.open("/b.md"),
        OpenOutcome::NeedsDecision(PathBuf::from("/b.md"))
    );
    assert_eq!(h.controller.pending_open(), Some(Path::new("/b.md")));
    assert_eq!(h.controller.content(), "A edited");

    assert_eq!(
        h.controller.resolve_pending_open(OpenDecision::Cancel).unwrap(),
        OpenOutcome::Cancelled
    );
    assert_eq!(h.controller.pending_open(), None);
    assert_eq!(h.controller.content(), "A edited");
}

#[test]
fn test_save_and_open() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.fs.insert("/b.md", "B");
    h.open("/a.md");
    h.controller.set_content("A edited".into());
    h.open("/b.md");

    assert_eq!(
        h.controller
            .resolve_pending_open(OpenDecision::SaveAndOpen)
            .unwrap(),
        OpenOutcome::Opened
    );
    assert_eq!(h.fs.get(Path::new("/a.md")).as_deref(), Some("A edited"));
    assert_eq!(h.controller.content(), "B");
    assert!(!h.shadow("/a.md").unwrap().is_dirty);
}

#[test]
fn test_save_and_open_keeps_request_when_save_fails() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.fs.insert("/b.md", "B");
    h.open("/a.md");
    h.controller.set_content("A edited".into());
    h.open("/b.md");
    h.fs.set_fail_saves(true);

    assert!(h
        .controller
        .resolve_pending_open(OpenDecision::SaveAndOpen)
        .is_err());
    assert_eq!(h.controller.pending_open(), Some(Path::new("/b.md")));
    assert_eq!(h.controller.content(), "A edited");
}

#[test]
fn test_discard_and_open() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.fs.insert("/b.md", "B");
    h.open("/a.md");
    h.controller.set_content("A edited".into());
    h.advance(1000);
    h.open("/b.md");

    h.controller
        .resolve_pending_open(OpenDecision::DiscardAndOpen)
        .unwrap();
    assert_eq!(h.controller.content(), "B");
    assert!(h.shadow("/a.md").is_none());
    assert_eq!(h.fs.get(Path::new("/a.md")).as_deref(), Some("A"));
}

#[test]
fn test_discard_and_open_unreadable_target_keeps_changes() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/a.md", "A");
    h.open("/a.md");
    h.controller.set_content("A edited".into());
    h.advance(1000);
    h.wait_for_shadow_writes(1);
    h.controller.set_content("A edited twice".into());
    assert_eq!(
        h.open("/b.md"),
        OpenOutcome::NeedsDecision(PathBuf::from("/b.md"))
    );

    assert!(h
        .controller
        .resolve_pending_open(OpenDecision::DiscardAndOpen)
        .is_err());
    assert_eq!(h.controller.content(), "A edited twice");
    assert!(h.controller.dirty());
    assert_eq!(h.shadow("/a.md").unwrap().content, "A edited");
    assert!(h.controller.shadow_pending());
    h.advance(1000);
    h.wait_for_shadow_writes(2);
    assert_eq!(h.shadow("/a.md").unwrap().content, "A edited twice");

    // the request is still there once the target appears
    h.fs.insert("/b.md", "B");
    assert_eq!(
        h.controller
            .resolve_pending_open(OpenDecision::DiscardAndOpen)
            .unwrap(),
        OpenOutcome::Opened
    );
    assert_eq!(h.controller.content(), "B");
    assert!(h.shadow("/a.md").is_none());
}

#[test]
fn test_discard_with_unreadable_disk_keeps_shadow() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "disk");
    h.open("/notes.md");
    h.controller.set_content("edit".into());
    h.advance(1000);
    h.wait_for_shadow_writes(1);
    h.fs.set_fail_loads(true);

    assert!(h.controller.discard().is_err());
    let record = h.shadow("/notes.md").unwrap();
    assert_eq!(record.content, "edit");
    assert!(record.is_dirty);
}

#[test]
fn test_resolve_without_request() {
    let mut h = DocumentTestHarness::new();
    let err = h
        .controller
        .resolve_pending_open(OpenDecision::SaveAndOpen)
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<DocumentError>(),
        Some(&DocumentError::NoPendingOpen)
    );
}

#[test]
fn test_restore_session() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "a\nb\nc\nd\n");
    h.open("/notes.md");
    h.controller.set_cursor_line(3);

    h.restart();
    let restored = h.controller.restore_session().unwrap();
    assert_eq!(restored, Some(PathBuf::from("/notes.md")));
    assert_eq!(h.controller.cursor_line(), 3);
}

#[test]
fn test_restore_session_skips_vanished_file() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "text");
    h.open("/notes.md");
    h.fs.remove("/notes.md");
    h.restart();

    assert_eq!(h.controller.restore_session().unwrap(), None);
    assert_eq!(h.controller.path(), &DocumentPath::Untitled);
}

#[test]
fn test_assistant_and_insert_edits_are_autosaved() {
    let mut h = DocumentTestHarness::new();
    h.fs.insert("/notes.md", "# Title\nbody\n");
    h.open("/notes.md");

    h.controller.set_cursor_line(2);
    assert!(h.controller.insert_at_cursor("inserted\n"));
    assert!(h.controller.shadow_pending());
    assert_eq!(h.controller.content(), "# Title\ninserted\nbody\n");

    assert!(h
        .controller
        .apply_assistant_text("# Title\ngenerated\n".into()));
    h.advance(1000);
    h.settle();
    assert_eq!(h.shadow("/notes.md").unwrap().content, "# Title\ngenerated\n");
}
