use super::*;
use crate::kernel::search::presentation::plain_text;
use crate::kernel::services::adapters::editor::MemoryBuffers;
use std::fs;
use tempfile::{tempdir, TempDir};

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn create_session(rt: &tokio::runtime::Runtime, settings: SearchSettings) -> SearchSession {
    SearchSession::new(ScanService::new(rt.handle().clone(), settings))
}

/// a.rs 第 3 行一个 foo，b.rs 第 10 行两个 foo
fn fixture() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.rs");
    let b = dir.path().join("b.rs");
    fs::write(&a, "fn main() {\n    // entry\n    let x = foo();\n}\n").unwrap();
    let mut b_text: String = (1..=9).map(|i| format!("// {i}\n")).collect();
    b_text.push_str("foo(1); foo(2);\n");
    fs::write(&b, b_text).unwrap();
    (dir, a, b)
}

fn search(session: &mut SearchSession, root: &Path, text: &str) {
    session.set_root_path(root);
    session.set_search_text(text);
    session.submit();
    assert!(session.finish_scan(Duration::from_secs(5)));
}

fn never(_: &str, _: &str) -> bool {
    panic!("confirmation not expected");
}

#[test]
fn test_initial_and_empty_query_status() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    assert_eq!(session.status(), "Type to search across files");
    assert!(session.summary().is_none());

    let (dir, _, _) = fixture();
    search(&mut session, dir.path(), "foo");
    assert_eq!(session.index().total_matches(), 3);

    session.set_search_text("");
    assert!(session.index().is_empty());
    assert!(!session.has_pending_search());
    assert_eq!(session.status(), "Type to search across files");
}

#[test]
fn test_missing_root_sets_status() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let dir = tempdir().unwrap();

    session.set_root_path(dir.path().join("missing"));
    session.set_search_text("foo");
    session.submit();

    assert!(!session.is_searching());
    assert_eq!(
        session.status(),
        "No folder opened. Please open a folder first."
    );
}

#[test]
fn test_scan_fills_index_and_status() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, b) = fixture();

    search(&mut session, dir.path(), "foo");

    let index = session.index();
    assert_eq!(index.total_matches(), 3);
    assert_eq!(index.count_for(&a), 1);
    assert_eq!(index.count_for(&b), 2);
    assert_eq!(index.line(&b, 10).unwrap().text, "foo(1); foo(2);");
    assert_eq!(session.last_total(), 3);
    assert_eq!(session.status(), "Found 3 matches in 2 files");
    assert_eq!(
        session.summary().map(|s| s.to_string()).as_deref(),
        Some("3 results in 2 files")
    );

    search(&mut session, dir.path(), "nothing-here");
    assert_eq!(session.status(), "No results found");
    assert!(session.summary().is_none());
}

#[test]
fn test_debounced_search_runs_from_tick() {
    let rt = create_runtime();
    let settings = SearchSettings {
        debounce_ms: 60_000,
        max_messages_per_tick: 1,
        ..SearchSettings::default()
    };
    let mut session = create_session(&rt, settings);
    let (dir, _, _) = fixture();

    session.set_root_path(dir.path());
    session.set_search_text("foo");
    assert!(session.has_pending_search());

    assert!(!session.tick(Instant::now()));
    assert!(!session.is_searching());

    assert!(session.tick(Instant::now() + Duration::from_secs(61)));
    assert!(!session.has_pending_search());

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.is_searching() {
        assert!(Instant::now() < deadline, "scan did not finish");
        session.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(session.index().total_matches(), 3);
}

#[test]
fn test_superseded_scan_leaves_no_results() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let dir = tempdir().unwrap();
    for i in 0..30 {
        fs::write(dir.path().join(format!("old{i}.txt")), "alpha\n".repeat(200)).unwrap();
    }
    fs::write(dir.path().join("new.txt"), "beta\n").unwrap();

    session.set_root_path(dir.path());
    session.set_search_text("alpha");
    session.submit();
    session.set_search_text("beta");
    session.submit();
    assert!(session.finish_scan(Duration::from_secs(5)));

    let index = session.index();
    assert_eq!(index.files(), &[dir.path().join("new.txt")]);
    assert_eq!(index.total_matches(), 1);
}

#[test]
fn test_query_edit_drops_buffered_results() {
    let rt = create_runtime();
    let settings = SearchSettings {
        debounce_ms: 60_000,
        ..SearchSettings::default()
    };
    let mut session = create_session(&rt, settings);
    let (dir, _, b) = fixture();
    session.set_replace_text("bar");

    session.set_root_path(dir.path());
    session.set_search_text("foo");
    session.submit();
    // 让旧扫描把结果都送进 channel
    std::thread::sleep(Duration::from_millis(200));

    session.set_search_text("zzz");
    assert!(!session.tick(Instant::now()));
    assert!(session.index().is_empty());
    assert!(session.summary().is_none());
    assert_eq!(session.status(), "Searching…");
    assert!(session.has_pending_search());

    // 新扫描开始前不能拿旧模式去替换
    let mut editors = MemoryBuffers::new();
    assert!(session.show_preview(&b, 10).unwrap().is_none());
    assert_eq!(session.replace_one(&b, 10, &mut editors).unwrap(), 0);
    assert!(fs::read_to_string(&b).unwrap().contains("foo(1); foo(2);"));

    assert!(session.tick(Instant::now() + Duration::from_secs(61)));
    assert!(session.finish_scan(Duration::from_secs(5)));
    assert!(session.index().is_empty());
    assert_eq!(session.status(), "No results found");
}

#[test]
fn test_invalid_regex_reports_status() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, _, _) = fixture();

    session.toggle_regex();
    search(&mut session, dir.path(), "(");

    assert!(session.index().is_empty());
    assert!(session.status().starts_with("Invalid pattern:"));
}

#[test]
fn test_replace_one_updates_index_and_reloads_buffer() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, b) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");

    let mut editors = MemoryBuffers::new();
    let id = editors.open(&b, &fs::read_to_string(&b).unwrap());
    editors.buffer_mut(id).unwrap().insert("unsaved ");
    let events = session.subscribe();

    assert_eq!(session.replace_one(&b, 10, &mut editors).unwrap(), 1);

    let on_disk = fs::read_to_string(&b).unwrap();
    assert!(on_disk.ends_with("bar(1); foo(2);\n"));
    assert_eq!(session.index().count_for(&a), 1);
    assert_eq!(session.index().count_for(&b), 1);
    assert_eq!(session.index().line(&b, 10).unwrap().text, "bar(1); foo(2);");
    assert_eq!(session.status(), "Replaced in b.rs");

    let buffer = editors.buffer(id).unwrap();
    assert_eq!(buffer.text(), on_disk);
    assert!(!buffer.modified);
    assert_eq!(buffer.cursor_line(), 9);

    assert_eq!(
        events.try_recv().unwrap(),
        ReplaceEvent::FileWritten {
            path: b.clone(),
            replaced: 1
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        ReplaceEvent::FileReloaded {
            path: b.clone(),
            buffer: id,
            keep_line_visible: Some(10)
        }
    );

    // 第二次替换消耗掉该行最后一个匹配
    session.replace_one(&b, 10, &mut editors).unwrap();
    assert!(!session.index().contains_file(&b));
    assert!(fs::read_to_string(&b).unwrap().ends_with("bar(1); bar(2);\n"));
}

#[test]
fn test_replace_one_failure_keeps_index() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, _, b) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");

    fs::remove_file(&b).unwrap();
    let mut editors = MemoryBuffers::new();
    let err = session.replace_one(&b, 10, &mut editors).unwrap_err();

    assert_eq!(err.path(), b.as_path());
    assert_eq!(session.index().count_for(&b), 2);
    assert!(session.status().starts_with("Failed to replace:"));
}

#[test]
fn test_replace_all_in_file_confirms_once_and_is_idempotent() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, b) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");
    let mut editors = MemoryBuffers::new();

    let mut asked = Vec::new();
    let mut decline = |title: &str, message: &str| {
        asked.push((title.to_string(), message.to_string()));
        false
    };
    assert_eq!(
        session
            .replace_all_in_file(&b, &mut editors, &mut decline)
            .unwrap(),
        0
    );
    assert_eq!(
        asked,
        vec![(
            "Replace All in File".to_string(),
            "Replace all 2 occurrences in b.rs?".to_string()
        )]
    );
    assert_eq!(session.index().count_for(&b), 2);

    let mut accept = |_: &str, _: &str| true;
    let replaced = session
        .replace_all_in_file(&b, &mut editors, &mut accept)
        .unwrap();
    assert_eq!(replaced, 2);
    assert!(!session.index().contains_file(&b));
    assert_eq!(session.index().count_for(&a), 1);
    assert_eq!(session.status(), "Replaced 2 occurrences in b.rs");
    let after = fs::read_to_string(&b).unwrap();
    assert!(after.ends_with("bar(1); bar(2);\n"));

    // 没有剩余匹配：不弹确认，不写盘
    let mut never = never;
    assert_eq!(
        session
            .replace_all_in_file(&b, &mut editors, &mut never)
            .unwrap(),
        0
    );
    assert_eq!(fs::read_to_string(&b).unwrap(), after);
}

#[test]
fn test_replace_all_in_file_failure_keeps_index() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, b) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");
    let events = session.subscribe();

    fs::remove_file(&b).unwrap();
    let mut editors = MemoryBuffers::new();
    let mut accept = |_: &str, _: &str| true;
    let err = session
        .replace_all_in_file(&b, &mut editors, &mut accept)
        .unwrap_err();

    assert!(matches!(err, ReplaceError::Io { .. }));
    assert_eq!(session.index().count_for(&b), 2);
    assert_eq!(session.index().count_for(&a), 1);
    assert_eq!(session.index().total_matches(), 3);
    assert!(session.status().starts_with("Failed to replace:"));
    assert!(events.try_recv().is_err());
}

#[test]
fn test_anchored_regex_replace_all_then_rescan_is_empty() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let dir = tempdir().unwrap();
    let path = dir.path().join("lines.txt");
    fs::write(&path, "foo a\nfoo b\nfoo c\n").unwrap();

    session.toggle_regex();
    search(&mut session, dir.path(), "^foo");
    assert_eq!(session.index().total_matches(), 3);
    session.set_replace_text("bar");

    let mut editors = MemoryBuffers::new();
    let mut confirm = |_: &str, _: &str| true;
    let report = session.replace_all(&mut editors, &mut confirm);
    assert_eq!(report.total_replaced, 3);
    assert_eq!(fs::read_to_string(&path).unwrap(), "bar a\nbar b\nbar c\n");

    session.submit();
    assert!(session.finish_scan(Duration::from_secs(5)));
    assert!(session.index().is_empty());
}

#[test]
fn test_replace_all_then_rescan_is_empty() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, _) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");

    let mut editors = MemoryBuffers::new();
    let id = editors.open(&a, &fs::read_to_string(&a).unwrap());

    let mut asked = Vec::new();
    let mut confirm = |title: &str, message: &str| {
        asked.push(format!("{title}: {message}"));
        true
    };
    let report = session.replace_all(&mut editors, &mut confirm);

    assert_eq!(asked, vec!["Replace All: Replace all 3 occurrences?".to_string()]);
    assert_eq!(report.files_changed, 2);
    assert_eq!(report.total_replaced, 3);
    assert!(report.failures.is_empty());
    assert!(session.index().is_empty());
    assert_eq!(session.status(), "Replaced 3 occurrences in 2 file(s)");
    assert!(editors.buffer(id).unwrap().text().contains("let x = bar();"));

    search(&mut session, dir.path(), "foo");
    assert!(session.index().is_empty());
    assert_eq!(session.status(), "No results found");

    let mut never = never;
    let report = session.replace_all(&mut editors, &mut never);
    assert_eq!(report.total_replaced, 0);
    assert_eq!(session.status(), "No matches to replace");
}

#[test]
fn test_replace_all_keeps_failed_files() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, b) = fixture();
    let latin1 = dir.path().join("c.txt");
    fs::write(&latin1, b"caf\xe9 foo\n").unwrap();
    search(&mut session, dir.path(), "foo");
    assert_eq!(session.index().total_matches(), 4);
    session.set_replace_text("bar");

    let mut editors = MemoryBuffers::new();
    let mut confirm = |_: &str, _: &str| true;
    let report = session.replace_all(&mut editors, &mut confirm);

    assert_eq!(report.files_changed, 2);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0], ReplaceError::NotUtf8 { .. }));
    assert!(!session.index().contains_file(&a));
    assert!(!session.index().contains_file(&b));
    assert_eq!(session.index().count_for(&latin1), 1);
    assert!(session.status().contains("1 failed"));
}

#[test]
fn test_preview_state_machine() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, _, b) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");
    let mut editors = MemoryBuffers::new();

    assert_eq!(session.confirm_preview(&mut editors).unwrap(), 0);

    let preview = session.show_preview(&b, 10).unwrap().unwrap();
    assert_eq!(preview.line_number, 10);
    assert!(matches!(session.phase(), ReplacePhase::PreviewShown(_)));
    assert!(session.cancel_preview());
    assert_eq!(session.phase(), &ReplacePhase::Idle);
    assert!(fs::read_to_string(&b).unwrap().contains("foo(1); foo(2);"));

    session.show_preview(&b, 10).unwrap();
    assert_eq!(session.confirm_preview(&mut editors).unwrap(), 1);
    assert_eq!(session.phase(), &ReplacePhase::Idle);
    assert!(fs::read_to_string(&b).unwrap().contains("bar(1); foo(2);"));
}

#[test]
fn test_replace_selected_uses_selection() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, _) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");
    let mut editors = MemoryBuffers::new();

    assert!(session.select_first_match());
    assert_eq!(session.replace_selected(&mut editors).unwrap(), 1);
    assert!(!session.index().contains_file(&a));
    assert!(fs::read_to_string(&a).unwrap().contains("let x = bar();"));
}

#[test]
fn test_render_rows_and_closing_results() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, b) = fixture();
    search(&mut session, dir.path(), "foo");
    session.set_replace_text("bar");

    let rows = session.render_rows();
    assert_eq!(rows.len(), 4);
    match &rows[0] {
        RenderedRow::File {
            label,
            count,
            expanded,
            selected,
            ..
        } => {
            assert_eq!(label, "a.rs");
            assert_eq!(*count, 1);
            assert!(*expanded);
            assert!(*selected);
        }
        other => panic!("expected file row, got {:?}", other),
    }
    match &rows[1] {
        RenderedRow::Match {
            line_number,
            segments,
            ..
        } => {
            assert_eq!(*line_number, 3);
            assert_eq!(plain_text(segments), "3: let x = foo → bar();");
        }
        other => panic!("expected match row, got {:?}", other),
    }

    assert!(session.close_file_results(&a));
    assert_eq!(session.status(), "Found 2 matches in 1 file");
    assert!(session.remove_match(&b, 10));
    assert_eq!(session.status(), "No results");
    assert!(!session.remove_match(&b, 10));
}

#[test]
fn test_selection_and_collapse_keep_counts() {
    let rt = create_runtime();
    let mut session = create_session(&rt, SearchSettings::default());
    let (dir, a, b) = fixture();
    search(&mut session, dir.path(), "foo");
    let status = session.status().to_string();

    assert!(session.toggle_expanded(&a));
    let rows = session.render_rows();
    assert_eq!(rows.len(), 3);
    assert!(matches!(&rows[0], RenderedRow::File { expanded: false, count: 1, .. }));
    assert_eq!(session.index().total_matches(), 3);
    assert_eq!(session.status(), status);

    assert!(session.select_first_match());
    assert_eq!(session.index().selected_match().map(|(p, _)| p), Some(b.as_path()));
    assert!(session.move_selection(1));
    assert_eq!(session.index().selected_index(), 0);
    assert!(session.select_row(1));
    assert!(!session.select_row(99));
}
