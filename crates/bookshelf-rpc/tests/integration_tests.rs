//! Integration tests for the bookshelf-rpc stdio server.
//!
//! Each test launches the built binary as a child process and talks to it
//! through `RpcClient`, exactly as a real caller would.

use bookshelf_core::{BookshelfError, ClientConfig, ConnectionState, Record, RpcClient};
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn server_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bookshelf-rpc"))
}

fn ask_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bookshelf-ask"))
}

/// Create a temporary directory holding the two-book test corpus.
fn create_test_corpus() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("books.json");
    let books = json!([
        {
            "id": "1",
            "title": "Make Something Wonderful",
            "content": "Steve Jobs reflects on failure and iteration."
        },
        {
            "id": "2",
            "title": "Thinking, Fast and Slow",
            "content": "Kahneman on cognitive biases."
        }
    ]);
    std::fs::write(&path, serde_json::to_vec_pretty(&books).unwrap()).unwrap();
    (temp_dir, path)
}

async fn connect(corpus: &std::path::Path) -> RpcClient {
    let config = ClientConfig::bookshelf_server(server_binary(), corpus)
        .with_request_timeout(Duration::from_secs(10));
    RpcClient::connect(&config)
        .await
        .expect("Failed to connect to bookshelf-rpc")
}

#[tokio::test]
async fn test_handshake_and_server_info() {
    let (_dir, corpus) = create_test_corpus();
    let mut client = connect(&corpus).await;

    assert_eq!(client.state(), ConnectionState::Initialized);
    let info = client.server_info().expect("server info");
    assert_eq!(info.name, "bookshelf");

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_search_scenarios() {
    let (_dir, corpus) = create_test_corpus();
    let mut client = connect(&corpus).await;

    // Scenario A
    assert_eq!(client.search_books("jobs").await.unwrap(), vec!["book://1"]);
    assert_eq!(client.search_books("Jobs").await.unwrap(), vec!["book://1"]);

    // Scenario B
    assert!(client.search_books("innovation").await.unwrap().is_empty());

    assert_eq!(
        client.search_books("").await.unwrap(),
        vec!["book://1", "book://2"]
    );

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_read_resource_returns_record() {
    let (_dir, corpus) = create_test_corpus();
    let mut client = connect(&corpus).await;

    // Scenario C
    let book = client.get_book("book://2").await.unwrap();
    assert_eq!(
        book,
        Record::new("2", "Thinking, Fast and Slow", "Kahneman on cognitive biases.")
    );

    let raw = client.read_resource("book://1").await.unwrap();
    assert_eq!(raw["contents"][0]["uri"], "book://1");
    assert_eq!(raw["contents"][0]["mimeType"], "application/json");

    let err = client.read_resource("book://42").await.unwrap_err();
    assert_eq!(err.rpc_code(), Some("resource-not-found"));

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_tool_keeps_connection_usable() {
    let (_dir, corpus) = create_test_corpus();
    let mut client = connect(&corpus).await;

    // Scenario E
    let err = client
        .call_tool("nonexistent_tool", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, BookshelfError::Rpc { ref code, .. } if code == "unknown-tool"));
    assert!(client.is_usable());

    assert_eq!(client.search_books("kahneman").await.unwrap(), vec!["book://2"]);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_list_tools_and_resources() {
    let (_dir, corpus) = create_test_corpus();
    let mut client = connect(&corpus).await;

    let tools = client.list_tools().await.unwrap();
    assert!(tools.iter().any(|t| t.name == "search_books"));
    assert!(tools.iter().any(|t| t.name == "list_all_books"));

    let resources = client.list_resources().await.unwrap();
    let uris: Vec<&str> = resources.iter().map(|r| r.uri.as_str()).collect();
    assert_eq!(uris, vec!["book://1", "book://2"]);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_server_rejects_requests_before_handshake() {
    let (_dir, corpus) = create_test_corpus();

    let mut child = tokio::process::Command::new(server_binary())
        .arg("--corpus")
        .arg(&corpus)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn bookshelf-rpc");

    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap()).lines();

    stdin
        .write_all(b"{\"protocolVersion\":\"2.0\",\"id\":1,\"method\":\"tools/list\",\"params\":{}}\n")
        .await
        .unwrap();
    let line = tokio::time::timeout(Duration::from_secs(10), stdout.next_line())
        .await
        .expect("no reply from server")
        .unwrap()
        .expect("server closed stdout");
    let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], "not-initialized");

    // Closing stdin is a clean shutdown.
    drop(stdin);
    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("server did not exit on EOF")
        .unwrap();
    assert!(status.success());
}

#[cfg(unix)]
#[tokio::test]
async fn test_killed_server_closes_connection_and_relaunch_works() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let (_dir, corpus) = create_test_corpus();
    let mut client = connect(&corpus).await;

    // Scenario D
    let pid = client.transport().id().expect("child pid");
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();

    let err = client.search_books("jobs").await.unwrap_err();
    assert!(
        matches!(err, BookshelfError::TransportClosed { .. }),
        "unexpected error: {err:?}"
    );
    assert!(!client.is_usable());
    client.stop().await.unwrap();

    let mut client = connect(&corpus).await;
    assert_eq!(client.search_books("jobs").await.unwrap(), vec!["book://1"]);
    client.stop().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_hung_server_times_out() {
    let config = ClientConfig::new("sleep")
        .with_arg("30")
        .with_request_timeout(Duration::from_millis(200));

    let err = match RpcClient::connect(&config).await {
        Ok(_) => panic!("handshake with a silent process should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, BookshelfError::Timeout(_)));

    let mut client = RpcClient::spawn(&config).unwrap();
    let _ = client.initialize().await;
    let err = client.list_tools().await.unwrap_err();
    assert!(matches!(err, BookshelfError::TransportClosed { .. }));
    client.stop().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_server_not_reading_stdin_times_out_on_large_request() {
    let config = ClientConfig::new("sleep")
        .with_arg("30")
        .with_request_timeout(Duration::from_millis(200));
    let mut client = RpcClient::spawn(&config).unwrap();

    // Far larger than a pipe buffer, so the write itself blocks.
    let pad = "x".repeat(1024 * 1024);
    let started = std::time::Instant::now();
    let err = client
        .send_request("initialize", json!({ "pad": pad }))
        .await
        .unwrap_err();

    assert!(matches!(err, BookshelfError::Timeout(_)), "unexpected error: {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!client.is_usable());
    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_executable_is_spawn_error() {
    let config = ClientConfig::new("/nonexistent/bookshelf-rpc");
    let err = match RpcClient::connect(&config).await {
        Ok(_) => panic!("spawning a missing binary should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, BookshelfError::ProcessSpawn { .. }));
}

#[tokio::test]
async fn test_missing_corpus_fails_handshake() {
    let dir = TempDir::new().unwrap();
    let config = ClientConfig::bookshelf_server(server_binary(), dir.path().join("absent.json"))
        .with_request_timeout(Duration::from_secs(10));

    let err = match RpcClient::connect(&config).await {
        Ok(_) => panic!("server without a corpus should not complete the handshake"),
        Err(e) => e,
    };
    assert!(matches!(err, BookshelfError::TransportClosed { .. }));
}

#[tokio::test]
async fn test_ask_cli_prints_answers() {
    let (_dir, corpus) = create_test_corpus();

    let output = tokio::process::Command::new(ask_binary())
        .arg("--server")
        .arg(server_binary())
        .arg("--corpus")
        .arg(&corpus)
        .arg("--list-tools")
        .arg("jobs")
        .arg("innovation")
        .output()
        .await
        .expect("Failed to run bookshelf-ask");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("search_books:"));
    assert!(stdout.contains("Make Something Wonderful (book://1)"));
    assert!(stdout.contains("No books in the library mention \"innovation\"."));
}
