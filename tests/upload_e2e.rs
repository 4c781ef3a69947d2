use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use httpmock::Method::POST;
use httpmock::MockServer;
use parking_lot::Mutex;
use reqwest::Url;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

use uptee::frame::{read_frame, write_frame, Reply};
use uptee::logger::{NoopLogger, UploadLogger};
use uptee::protocol::{frame, reply};
use uptee::{Webhook, WritePathResolver};

/// Collects webhook failures reported through the side channel
#[derive(Default)]
struct FailureLog(Mutex<Vec<(String, usize)>>);

impl UploadLogger for FailureLog {
    fn webhook_failed(&self, path: &Path, chunk_len: usize, _msg: &str) {
        self.0.lock().push((path.display().to_string(), chunk_len));
    }
}

type Bodies = Arc<Mutex<Vec<Vec<u8>>>>;

async fn record_body(State(bodies): State<Bodies>, body: Bytes) -> StatusCode {
    bodies.lock().push(body.to_vec());
    StatusCode::OK
}

/// Webhook endpoint that keeps every request body in arrival order
async fn recording_webhook() -> Result<(Url, Bodies)> {
    let bodies = Bodies::default();
    let app = Router::new()
        .route("/ingest", post(record_body))
        .with_state(bodies.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = Url::parse(&format!("http://{}/ingest", listener.local_addr()?))?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((url, bodies))
}

fn free_port() -> Result<u16> {
    let sock = std::net::TcpListener::bind("127.0.0.1:0")?;
    let p = sock.local_addr()?.port();
    drop(sock);
    Ok(p)
}

async fn start_server(root: &Path, webhook: Webhook, logger: Arc<dyn UploadLogger>) -> Result<u16> {
    let port = free_port()?;
    let bind = format!("127.0.0.1:{}", port);
    let resolver = WritePathResolver::new(root.canonicalize()?, webhook, logger);
    tokio::spawn(async move {
        let _ = uptee::server::serve(&bind, resolver, Duration::from_secs(30)).await;
    });

    // Wait for server to start accepting connections
    for _ in 0..50u32 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(port)
}

async fn reply_of(stream: &mut TcpStream) -> Result<Reply> {
    let (typ, payload) = read_frame(stream).await?;
    assert_eq!(typ, frame::REPLY);
    Ok(Reply::decode(&payload)?)
}

/// STOR + DATA* + END, returning the final reply
async fn upload(stream: &mut TcpStream, path: &str, chunks: &[&[u8]]) -> Result<Reply> {
    write_frame(stream, frame::STOR, path.as_bytes()).await?;
    let opened = reply_of(stream).await?;
    if !opened.is_positive() {
        return Ok(opened);
    }
    assert_eq!(opened.code, reply::OPENING_DATA);
    for chunk in chunks {
        write_frame(stream, frame::DATA, chunk).await?;
    }
    write_frame(stream, frame::END, &[]).await?;
    reply_of(stream).await
}

fn closed_port_url() -> Result<Url> {
    Ok(Url::parse(&format!("http://127.0.0.1:{}/ingest", free_port()?))?)
}

#[tokio::test]
async fn upload_without_webhook_writes_chunks_in_order() -> Result<()> {
    let root = tempfile::tempdir()?;
    let port = start_server(root.path(), Webhook::disabled(), Arc::new(NoopLogger)).await?;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;

    let done = upload(&mut stream, "a.txt", &[b"hello ", b"world"]).await?;
    assert_eq!(done.code, reply::TRANSFER_COMPLETE);
    assert_eq!(std::fs::read(root.path().join("a.txt"))?, b"hello world");
    Ok(())
}

#[tokio::test]
async fn upload_to_directory_is_refused_and_connection_survives() -> Result<()> {
    let root = tempfile::tempdir()?;
    std::fs::create_dir(root.path().join("subdir"))?;
    let port = start_server(root.path(), Webhook::disabled(), Arc::new(NoopLogger)).await?;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;

    let refused = upload(&mut stream, "subdir", &[b"ignored"]).await?;
    assert_eq!(refused.code, reply::FILE_UNAVAILABLE);
    assert!(refused.message.contains("is a directory"));
    assert!(std::fs::read_dir(root.path().join("subdir"))?.next().is_none());

    // Same connection keeps working
    let done = upload(&mut stream, "after.txt", &[b"ok"]).await?;
    assert_eq!(done.code, reply::TRANSFER_COMPLETE);
    assert_eq!(std::fs::read(root.path().join("after.txt"))?, b"ok");
    Ok(())
}

#[tokio::test]
async fn upload_posts_each_chunk_to_webhook() -> Result<()> {
    let hook = MockServer::start_async().await;
    let mock = hook
        .mock_async(|when, then| {
            when.method(POST).path("/ingest").body("abc");
            then.status(200);
        })
        .await;

    let root = tempfile::tempdir()?;
    let url = Url::parse(&hook.url("/ingest"))?;
    let webhook = Webhook::new(Some(url), Duration::from_secs(5))?;
    let port = start_server(root.path(), webhook, Arc::new(NoopLogger)).await?;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;

    let done = upload(&mut stream, "abc.bin", &[b"abc"]).await?;
    assert_eq!(done.code, reply::TRANSFER_COMPLETE);
    mock.assert_hits_async(1).await;
    assert_eq!(std::fs::read(root.path().join("abc.bin"))?, b"abc");
    Ok(())
}

#[tokio::test]
async fn every_chunk_is_one_post_in_arrival_order() -> Result<()> {
    let (url, bodies) = recording_webhook().await?;

    let root = tempfile::tempdir()?;
    let webhook = Webhook::new(Some(url), Duration::from_secs(5))?;
    let port = start_server(root.path(), webhook, Arc::new(NoopLogger)).await?;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;

    let chunks: [&[u8]; 5] = [b"one", b"two", b"three", b"four", b"five"];
    let done = upload(&mut stream, "multi.txt", &chunks).await?;
    assert_eq!(done.code, reply::TRANSFER_COMPLETE);

    let seen = bodies.lock().clone();
    let expected: Vec<Vec<u8>> = chunks.iter().map(|c| c.to_vec()).collect();
    assert_eq!(seen, expected);
    assert_eq!(std::fs::read(root.path().join("multi.txt"))?, b"onetwothreefourfive");
    Ok(())
}

#[tokio::test]
async fn webhook_outage_does_not_affect_upload() -> Result<()> {
    let root = tempfile::tempdir()?;
    let failures = Arc::new(FailureLog::default());
    let webhook = Webhook::new(Some(closed_port_url()?), Duration::from_secs(5))?;
    let port = start_server(root.path(), webhook, failures.clone()).await?;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;

    let done = upload(&mut stream, "data.bin", &[b"data"]).await?;
    assert_eq!(done.code, reply::TRANSFER_COMPLETE);
    assert_eq!(std::fs::read(root.path().join("data.bin"))?, b"data");

    // Only the side channel knows
    let seen = failures.0.lock().clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].0.ends_with("data.bin"));
    assert_eq!(seen[0].1, 4);
    Ok(())
}

#[tokio::test]
async fn concurrent_uploads_are_independent() -> Result<()> {
    let root = tempfile::tempdir()?;
    let port = start_server(root.path(), Webhook::disabled(), Arc::new(NoopLogger)).await?;

    let mut a = TcpStream::connect(("127.0.0.1", port)).await?;
    let mut b = TcpStream::connect(("127.0.0.1", port)).await?;

    write_frame(&mut a, frame::STOR, b"a.bin").await?;
    assert_eq!(reply_of(&mut a).await?.code, reply::OPENING_DATA);
    write_frame(&mut b, frame::STOR, b"b.bin").await?;
    assert_eq!(reply_of(&mut b).await?.code, reply::OPENING_DATA);

    for i in 0..10u8 {
        write_frame(&mut a, frame::DATA, &[b'a', i]).await?;
        write_frame(&mut b, frame::DATA, &[b'b', i]).await?;
    }
    write_frame(&mut b, frame::END, &[]).await?;
    assert_eq!(reply_of(&mut b).await?.code, reply::TRANSFER_COMPLETE);
    write_frame(&mut a, frame::END, &[]).await?;
    assert_eq!(reply_of(&mut a).await?.code, reply::TRANSFER_COMPLETE);

    let expect = |tag: u8| -> Vec<u8> { (0..10u8).flat_map(|i| [tag, i]).collect() };
    assert_eq!(std::fs::read(root.path().join("a.bin"))?, expect(b'a'));
    assert_eq!(std::fs::read(root.path().join("b.bin"))?, expect(b'b'));
    Ok(())
}

#[tokio::test]
async fn traversal_and_missing_parent_are_refused() -> Result<()> {
    let root = tempfile::tempdir()?;
    let port = start_server(root.path(), Webhook::disabled(), Arc::new(NoopLogger)).await?;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;

    let refused = upload(&mut stream, "../escape.txt", &[]).await?;
    assert_eq!(refused.code, reply::FILENAME_NOT_ALLOWED);

    let refused = upload(&mut stream, "missing/dir/file.txt", &[]).await?;
    assert_eq!(refused.code, reply::FILE_UNAVAILABLE);

    write_frame(&mut stream, frame::QUIT, &[]).await?;
    assert_eq!(reply_of(&mut stream).await?.code, reply::GOODBYE);
    Ok(())
}
