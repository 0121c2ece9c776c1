//! Document symbols, the content-hash cache, and name-path lookup
//! through a facade backed by a scripted server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use codenav_client::mock::{MockHandler, MockReply, start_mock_server};
use codenav_client::{ServerSession, SessionConfig};
use codenav_server::{Language, LanguageServer, ServerConfig};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

fn repo_with_files(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, contents) in files {
        let absolute = dir.path().join(path);
        std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
        std::fs::write(absolute, contents).unwrap();
    }
    dir
}

fn server_config(root: &Path) -> ServerConfig {
    let mut config = ServerConfig::new(root.to_path_buf());
    config.rate_limit = None;
    config.persister_enabled = false;
    config.default_timeout = Duration::from_secs(5);
    config
}

fn facade_with_mock(root: &Path, language: Language, handler: MockHandler) -> LanguageServer {
    let (_handle, reader, writer) = start_mock_server(handler);
    let session = ServerSession::with_io(
        reader,
        writer,
        SessionConfig { default_timeout: Duration::from_secs(5), rate_limit: None, trace: false },
    );
    let facade = LanguageServer::detached(language, server_config(root));
    facade.attach_session(session).expect("attach session");
    facade
}

/// A handler answering documentSymbol with `symbols` and counting how
/// many documentSymbol RPCs were issued.
fn symbol_handler(symbols: Value, counter: Arc<AtomicUsize>) -> MockHandler {
    Box::new(move |method, _id, _params| {
        if method == "textDocument/documentSymbol" {
            counter.fetch_add(1, Ordering::SeqCst);
            MockReply::Result(symbols.clone())
        } else {
            MockReply::Ignore
        }
    })
}

fn user_service_symbols() -> Value {
    json!([{
        "name": "UserService",
        "kind": 5,
        "range": {"start": {"line": 0, "character": 0}, "end": {"line": 4, "character": 1}},
        "selectionRange": {"start": {"line": 0, "character": 6}, "end": {"line": 0, "character": 17}},
        "children": [{
            "name": "create_user",
            "kind": 6,
            "range": {"start": {"line": 1, "character": 4}, "end": {"line": 3, "character": 5}},
            "selectionRange": {"start": {"line": 1, "character": 8}, "end": {"line": 1, "character": 19}},
        }],
    }, {
        "name": "UserSerializer",
        "kind": 5,
        "range": {"start": {"line": 6, "character": 0}, "end": {"line": 9, "character": 1}},
        "selectionRange": {"start": {"line": 6, "character": 6}, "end": {"line": 6, "character": 20}},
        "children": [{
            "name": "create_user_payload",
            "kind": 6,
            "range": {"start": {"line": 7, "character": 4}, "end": {"line": 8, "character": 5}},
            "selectionRange": {"start": {"line": 7, "character": 8}, "end": {"line": 7, "character": 27}},
        }],
    }])
}

const USER_FILE: &str = "class UserService {\n    create_user() {\n        insert();\n    }\n}\n\nclass UserSerializer {\n    create_user_payload() {\n    }\n}\n";

#[test]
fn document_symbols_pair_open_and_close() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let (handle, reader, writer) =
        start_mock_server(symbol_handler(user_service_symbols(), Arc::clone(&counter)));
    let session = ServerSession::with_io(
        reader,
        writer,
        SessionConfig { default_timeout: Duration::from_secs(5), rate_limit: None, trace: false },
    );
    let facade = LanguageServer::detached(Language::TypeScript, server_config(repo.path()));
    facade.attach_session(session).unwrap();

    let (flat, roots) = facade.request_document_symbols("src/user.ts", false).unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(flat.len(), 4);
    assert_eq!(roots[0].name, "UserService");
    assert_eq!(roots[0].children[0].name, "create_user");
    assert_eq!(roots[0].location.relative_path, "src/user.ts");

    // Exactly one didOpen and, after the request, one didClose.
    assert!(handle.wait_for_notification("textDocument/didClose", Duration::from_secs(2)));
    assert_eq!(handle.notifications_named("textDocument/didOpen").len(), 1);
    assert_eq!(handle.notifications_named("textDocument/didClose").len(), 1);
    assert_eq!(facade.open_file_count(), 0);

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn identical_request_hits_cache_without_rpc() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        symbol_handler(user_service_symbols(), Arc::clone(&counter)),
    );

    let first = facade.request_document_symbols("src/user.ts", false).unwrap();
    let second = facade.request_document_symbols("src/user.ts", false).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1, "second request must be a cache hit");
    assert_eq!(first, second);

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn content_change_invalidates_cache() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        symbol_handler(user_service_symbols(), Arc::clone(&counter)),
    );

    facade.request_document_symbols("src/user.ts", false).unwrap();
    std::fs::write(repo.path().join("src/user.ts"), format!("{}\n// edited\n", USER_FILE)).unwrap();
    facade.request_document_symbols("src/user.ts", false).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 2, "changed contents must re-query");
    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn include_body_extracts_range_text() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        symbol_handler(user_service_symbols(), counter),
    );

    let (_, roots) = facade.request_document_symbols("src/user.ts", true).unwrap();
    let body = roots[0].body.as_deref().unwrap();
    assert!(body.starts_with("class UserService {"));
    assert!(body.ends_with("}"));
    assert!(roots[0].children[0].body.as_deref().unwrap().contains("insert()"));

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn containing_symbol_prefers_deepest_match() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        symbol_handler(user_service_symbols(), counter),
    );

    let inner = facade.request_containing_symbol("src/user.ts", 2, 8, false).unwrap().unwrap();
    assert_eq!(inner.name, "create_user");

    let outer = facade.request_containing_symbol("src/user.ts", 0, 0, false).unwrap().unwrap();
    assert_eq!(outer.name, "UserService");

    let none = facade.request_containing_symbol("src/user.ts", 5, 0, false).unwrap();
    assert!(none.is_none());

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn find_matches_absolute_relative_and_substring() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        symbol_handler(user_service_symbols(), counter),
    );

    let exact_absolute =
        facade.find("/UserService/create_user", Some("src/user.ts"), false).unwrap();
    assert_eq!(exact_absolute.len(), 1);
    assert_eq!(exact_absolute[0].name, "create_user");

    let exact_relative = facade.find("create_user", Some("src/user.ts"), false).unwrap();
    assert_eq!(exact_relative.len(), 1);

    let substring = facade.find("create_user", Some("src/user.ts"), true).unwrap();
    let names: Vec<_> = substring.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["create_user", "create_user_payload"]);

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn full_symbol_tree_skips_ignored_files() {
    let repo = repo_with_files(&[
        ("src/a.ts", "let a = 1;\n"),
        ("src/b.ts", "let b = 2;\n"),
        ("node_modules/dep/index.ts", "let dep = 3;\n"),
        ("README.md", "# docs\n"),
    ]);
    let requested: Arc<parking_lot::Mutex<Vec<String>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = Arc::clone(&requested);
    let handler: MockHandler = Box::new(move |method, _id, params| {
        if method == "textDocument/documentSymbol" {
            let uri = params.unwrap()["textDocument"]["uri"].as_str().unwrap().to_string();
            seen.lock().push(uri);
            MockReply::Result(json!([]))
        } else {
            MockReply::Ignore
        }
    });
    let facade = facade_with_mock(repo.path(), Language::TypeScript, handler);

    let roots = facade.request_full_symbol_tree(None, false).unwrap();
    assert!(roots.is_empty());

    let queried = requested.lock().clone();
    assert_eq!(queried.len(), 2, "only the two claimed, non-ignored files: {:?}", queried);
    assert!(queried.iter().all(|uri| !uri.contains("node_modules")));
    assert!(queried.iter().all(|uri| !uri.contains("README")));

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn empty_file_opens_and_returns_no_symbols() {
    let repo = repo_with_files(&[("src/empty.ts", "")]);
    let counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        symbol_handler(json!([]), Arc::clone(&counter)),
    );

    let (flat, roots) = facade.request_document_symbols("src/empty.ts", false).unwrap();
    assert!(flat.is_empty());
    assert!(roots.is_empty());
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn operations_before_start_raise_not_started() {
    let repo = repo_with_files(&[("src/a.ts", "let a = 1;\n")]);
    let facade = LanguageServer::detached(Language::TypeScript, server_config(repo.path()));
    match facade.request_document_symbols("src/a.ts", false) {
        Err(codenav_error::Error::NotStarted) => {}
        other => panic!("expected NotStarted, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn traversal_outside_repository_is_rejected() {
    let repo = repo_with_files(&[("src/a.ts", "let a = 1;\n")]);
    let counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        symbol_handler(json!([]), counter),
    );
    match facade.request_document_symbols("../outside.ts", false) {
        Err(codenav_error::Error::PathOutsideRepository(_)) => {}
        other => panic!("expected PathOutsideRepository, got {:?}", other.map(|_| ())),
    }
    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn did_change_bumps_version_and_requeries_from_buffer() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let (handle, reader, writer) =
        start_mock_server(symbol_handler(user_service_symbols(), Arc::clone(&counter)));
    let session = ServerSession::with_io(
        reader,
        writer,
        SessionConfig { default_timeout: Duration::from_secs(5), rate_limit: None, trace: false },
    );
    let facade = LanguageServer::detached(Language::TypeScript, server_config(repo.path()));
    facade.attach_session(session).unwrap();

    // Hold the file open across the edit so the buffer (not the disk) is
    // the source of truth.
    let scope = facade.open_file("src/user.ts").unwrap();
    facade.request_document_symbols("src/user.ts", false).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let edited = format!("{}// trailing comment\n", USER_FILE);
    facade.notify_file_changed("src/user.ts", &edited).unwrap();

    assert!(handle.wait_for_notification("textDocument/didChange", Duration::from_secs(2)));
    let changes = handle.notifications_named("textDocument/didChange");
    assert_eq!(changes[0]["textDocument"]["version"], json!(1));
    assert_eq!(changes[0]["contentChanges"][0]["text"].as_str().unwrap(), edited);

    // The buffer's new hash misses the cache and re-queries.
    facade.request_document_symbols("src/user.ts", false).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    drop(scope);
    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn nested_open_scopes_close_once() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);
    let counter = Arc::new(AtomicUsize::new(0));
    let (handle, reader, writer) =
        start_mock_server(symbol_handler(user_service_symbols(), counter));
    let session = ServerSession::with_io(
        reader,
        writer,
        SessionConfig { default_timeout: Duration::from_secs(5), rate_limit: None, trace: false },
    );
    let facade = LanguageServer::detached(Language::TypeScript, server_config(repo.path()));
    facade.attach_session(session).unwrap();

    {
        let _outer = facade.open_file("src/user.ts").unwrap();
        {
            let _inner = facade.open_file("src/user.ts").unwrap();
            assert_eq!(facade.open_file_count(), 1);
        }
        // Inner scope released; the file stays open under the outer one.
        assert_eq!(facade.open_file_count(), 1);
        assert!(handle.notifications_named("textDocument/didClose").is_empty());
    }
    assert_eq!(facade.open_file_count(), 0);
    assert!(handle.wait_for_notification("textDocument/didClose", Duration::from_secs(2)));
    assert_eq!(handle.notifications_named("textDocument/didOpen").len(), 1);
    assert_eq!(handle.notifications_named("textDocument/didClose").len(), 1);

    facade.stop(Duration::from_millis(300), false);
}

/// Server identity is part of the cache version stamp: symbols persisted
/// under one server version must not survive an upgrade.
#[test]
fn cache_version_mismatch_forces_requery() {
    let repo = repo_with_files(&[("src/user.ts", USER_FILE)]);

    let versioned_handler = |version: &'static str, counter: Arc<AtomicUsize>| -> MockHandler {
        Box::new(move |method, _id, _params| match method {
            "initialize" => MockReply::Result(json!({
                "capabilities": { "documentSymbolProvider": true },
                "serverInfo": { "name": "mock-ls", "version": version },
            })),
            "textDocument/documentSymbol" => {
                counter.fetch_add(1, Ordering::SeqCst);
                MockReply::Result(json!([]))
            }
            _ => MockReply::Ignore,
        })
    };

    // First run persists under server version 1.0.0.
    let first_counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        versioned_handler("1.0.0", Arc::clone(&first_counter)),
    );
    facade.request_document_symbols("src/user.ts", false).unwrap();
    facade.save_caches().unwrap();
    facade.stop(Duration::from_millis(300), false);
    assert_eq!(first_counter.load(Ordering::SeqCst), 1);

    // Same server version: the persisted cache answers, no RPC.
    let warm_counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        versioned_handler("1.0.0", Arc::clone(&warm_counter)),
    );
    facade.request_document_symbols("src/user.ts", false).unwrap();
    facade.stop(Duration::from_millis(300), false);
    assert_eq!(warm_counter.load(Ordering::SeqCst), 0, "persisted cache should answer");

    // Upgraded server: the old file is discarded and re-queried.
    let upgraded_counter = Arc::new(AtomicUsize::new(0));
    let facade = facade_with_mock(
        repo.path(),
        Language::TypeScript,
        versioned_handler("2.0.0", Arc::clone(&upgraded_counter)),
    );
    facade.request_document_symbols("src/user.ts", false).unwrap();
    facade.save_caches().unwrap();
    facade.stop(Duration::from_millis(300), false);
    assert_eq!(upgraded_counter.load(Ordering::SeqCst), 1, "version bump must re-query");
}
