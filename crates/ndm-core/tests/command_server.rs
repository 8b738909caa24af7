//! The command server wired to a real manager, driven over a raw socket.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::range_server;
use ndm_core::command_server::CommandServer;
use ndm_core::manager::{self, ManagerHandle};
use ndm_core::model::Status;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn serve(handle: &ManagerHandle) -> SocketAddr {
    let server = CommandServer::bind(0, Arc::new(handle.clone())).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn send(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: 127.0.0.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    let status = out
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = out.split_once("\r\n\r\n").map(|(_, b)| b.to_string()).unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn intercepted_download_creates_exactly_one_record() {
    let body = common::body(4096);
    let files = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let (handle, _task) = manager::spawn(common::options(dir.path(), 1024)).unwrap();
    let addr = serve(&handle).await;

    let payload = format!(
        r#"{{"type":"download.intercepted","url":"{}","filename":"picked.bin"}}"#,
        files.url
    );
    let (status, text) = send(addr, "POST", "/downloads/intercepted", &payload).await;
    assert_eq!((status, text.as_str()), (200, "ok"));

    let records = handle.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_name, "picked.bin");
    assert_eq!(records[0].url, files.url);

    let done = common::wait_settled(&handle, records[0].id).await;
    assert_eq!(done.status, Status::Completed, "{:?}", done.error_message);
    assert_eq!(std::fs::read(&done.destination_path).unwrap(), body);
}

#[tokio::test]
async fn disabled_interception_creates_nothing() {
    let dir = tempdir().unwrap();
    let (handle, _task) = manager::spawn(common::options(dir.path(), 1024)).unwrap();
    handle.set_interception_enabled(false);
    let addr = serve(&handle).await;

    let (status, text) = send(addr, "GET", "/interception/status", "").await;
    assert_eq!(status, 200);
    assert_eq!(text, r#"{"chromeInterceptionEnabled":false}"#);

    let (status, _) = send(
        addr,
        "POST",
        "/downloads/intercepted",
        r#"{"type":"download.intercepted","url":"http://127.0.0.1:9/x"}"#,
    )
    .await;
    assert_eq!(status, 403);
    assert!(handle.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_bodies_create_nothing() {
    let dir = tempdir().unwrap();
    let (handle, _task) = manager::spawn(common::options(dir.path(), 1024)).unwrap();
    let addr = serve(&handle).await;

    let (status, text) = send(addr, "POST", "/downloads/intercepted", "").await;
    assert_eq!((status, text.as_str()), (400, "invalid body"));
    let (status, text) = send(addr, "POST", "/downloads/intercepted", "not json").await;
    assert_eq!((status, text.as_str()), (400, "invalid json"));
    let (status, _) = send(addr, "PUT", "/downloads/intercepted", "{}").await;
    assert_eq!(status, 404);
    assert!(handle.list().await.unwrap().is_empty());
}
