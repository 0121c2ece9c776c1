//! Call hierarchy traversal with cyclic server responses.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use codenav_client::mock::{MockHandler, MockReply, start_mock_server};
use codenav_client::{ServerSession, SessionConfig};
use codenav_server::{CallDirection, Language, LanguageServer, ServerConfig};
use serde_json::{Value, json};
use std::path::Path;
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

fn facade_with_mock(root: &Path, handler: MockHandler) -> LanguageServer {
    let (_handle, reader, writer) = start_mock_server(handler);
    let session = ServerSession::with_io(
        reader,
        writer,
        SessionConfig { default_timeout: Duration::from_secs(5), rate_limit: None, trace: false },
    );
    let mut config = ServerConfig::new(root.to_path_buf());
    config.rate_limit = None;
    config.persister_enabled = false;
    config.default_timeout = Duration::from_secs(5);
    let facade = LanguageServer::detached(Language::Rust, config);
    facade.attach_session(session).expect("attach session");
    facade
}

fn call_item(root: &Path, name: &str, line: u32) -> Value {
    let uri = codenav_uri::path_to_uri(root.join("src/lib.rs")).unwrap();
    json!({
        "name": name,
        "kind": 12,
        "uri": uri,
        "range": {"start": {"line": line, "character": 0}, "end": {"line": line + 4, "character": 1}},
        "selectionRange": {"start": {"line": line, "character": 3}, "end": {"line": line, "character": 3 + name.len()}},
    })
}

#[test]
fn cyclic_outgoing_calls_terminate() {
    let repo = repo_with_files(&[(
        "src/lib.rs",
        "fn main() {\n    helper();\n}\n\nfn helper() {\n    main();\n}\n",
    )]);
    let root = repo.path().to_path_buf();

    let handler: MockHandler = Box::new(move |method, _id, params| match method {
        "initialize" => MockReply::Result(json!({
            "capabilities": { "callHierarchyProvider": true },
            "serverInfo": { "name": "mock-ls", "version": "1.0.0" },
        })),
        "textDocument/prepareCallHierarchy" => {
            MockReply::Result(json!([call_item(&root, "main", 0)]))
        }
        "callHierarchy/outgoingCalls" => {
            let subject = params.unwrap()["item"]["name"].as_str().unwrap().to_string();
            let neighbor = if subject == "main" {
                json!([{
                    "to": call_item(&root, "helper", 4),
                    "fromRanges": [{"start": {"line": 1, "character": 4}, "end": {"line": 1, "character": 10}}],
                }])
            } else {
                // The cycle back into main.
                json!([{
                    "to": call_item(&root, "main", 0),
                    "fromRanges": [{"start": {"line": 5, "character": 4}, "end": {"line": 5, "character": 8}}],
                }])
            };
            MockReply::Result(neighbor)
        }
        _ => MockReply::Ignore,
    });

    let facade = facade_with_mock(repo.path(), handler);
    let graph = facade
        .request_call_graph("src/lib.rs", 0, 3, CallDirection::Outgoing, 16)
        .unwrap();

    assert_eq!(graph.nodes.len(), 2, "cycle must not duplicate nodes");
    assert_eq!(graph.edges.len(), 2);
    assert_eq!(graph.nodes[0].name, "main");
    assert_eq!(graph.nodes[1].name, "helper");
    // main -> helper, then the back edge helper -> main.
    assert_eq!((graph.edges[0].from, graph.edges[0].to), (0, 1));
    assert_eq!((graph.edges[1].from, graph.edges[1].to), (1, 0));
    assert_eq!(graph.edges[0].call_sites.len(), 1);

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn incoming_direction_reverses_edges() {
    let repo = repo_with_files(&[(
        "src/lib.rs",
        "fn target() {}\n\nfn caller() {\n    target();\n}\n",
    )]);
    let root = repo.path().to_path_buf();

    let handler: MockHandler = Box::new(move |method, _id, _params| match method {
        "initialize" => MockReply::Result(json!({
            "capabilities": { "callHierarchyProvider": true },
            "serverInfo": { "name": "mock-ls", "version": "1.0.0" },
        })),
        "textDocument/prepareCallHierarchy" => {
            MockReply::Result(json!([call_item(&root, "target", 0)]))
        }
        "callHierarchy/incomingCalls" => MockReply::Result(json!([{
            "from": call_item(&root, "caller", 2),
            "fromRanges": [{"start": {"line": 3, "character": 4}, "end": {"line": 3, "character": 10}}],
        }])),
        _ => MockReply::Ignore,
    });

    let facade = facade_with_mock(repo.path(), handler);
    let graph = facade
        .request_call_graph("src/lib.rs", 0, 3, CallDirection::Incoming, 2)
        .unwrap();

    assert_eq!(graph.nodes.len(), 2);
    let caller_id = graph.nodes.iter().position(|n| n.name == "caller").unwrap();
    assert_eq!(graph.edges[0].from, caller_id);
    assert_eq!(graph.edges[0].to, 0);

    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn missing_capability_is_unsupported() {
    let repo = repo_with_files(&[("src/lib.rs", "fn main() {}\n")]);
    let handler: MockHandler = Box::new(|method, _id, _params| {
        if method == "initialize" {
            MockReply::Result(json!({
                "capabilities": { "documentSymbolProvider": true },
                "serverInfo": { "name": "mock-ls", "version": "1.0.0" },
            }))
        } else {
            MockReply::Ignore
        }
    });

    let facade = facade_with_mock(repo.path(), handler);
    match facade.request_call_graph("src/lib.rs", 0, 3, CallDirection::Outgoing, 4) {
        Err(codenav_error::Error::CapabilityUnsupported(op)) => assert_eq!(op, "callHierarchy"),
        other => panic!("expected CapabilityUnsupported, got {:?}", other.map(|_| ())),
    }
    facade.stop(Duration::from_millis(300), false);
}

#[test]
fn empty_prepare_yields_empty_graph() {
    let repo = repo_with_files(&[("src/lib.rs", "fn main() {}\n")]);
    let handler: MockHandler = Box::new(|method, _id, _params| match method {
        "initialize" => MockReply::Result(json!({
            "capabilities": { "callHierarchyProvider": true },
            "serverInfo": { "name": "mock-ls", "version": "1.0.0" },
        })),
        "textDocument/prepareCallHierarchy" => MockReply::Result(json!([])),
        _ => MockReply::Ignore,
    });

    let facade = facade_with_mock(repo.path(), handler);
    let graph = facade
        .request_call_graph("src/lib.rs", 0, 3, CallDirection::Outgoing, 4)
        .unwrap();
    assert!(graph.is_empty());

    facade.stop(Duration::from_millis(300), false);
}
