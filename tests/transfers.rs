//! Filesystem behavior of the downloader against a local HTTP endpoint:
//! skip-when-exists, resumed completion, and partial preservation after a
//! short stream.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use m2m_fetcher::app::{DownloadTask, Downloader, DownloaderConfig};
use m2m_fetcher::constants::PARTIAL_SUFFIX;

const FILE_NAME: &str = "LC08_CU_011009_20221001_20221012_02_BA.tar";

/// Serve HEAD/GET for one file on an ephemeral local port. The declared
/// length can exceed what the GET actually sends, to simulate a stream
/// that drops before the file is complete.
async fn spawn_file_server(body: Vec<u8>, declared_len: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let body = body.clone();
            tokio::spawn(async move {
                handle_connection(stream, body, declared_len).await;
            });
        }
    });

    format!("http://{}/archive", addr)
}

async fn handle_connection(stream: TcpStream, body: Vec<u8>, declared_len: usize) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }

    let mut range_offset: usize = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let lower = line.trim().to_ascii_lowercase();
        if lower.is_empty() {
            break;
        }
        if let Some(range) = lower.strip_prefix("range: bytes=") {
            if let Some(start) = range.split('-').next() {
                range_offset = start.parse().unwrap_or(0);
            }
        }
    }

    if request_line.starts_with("HEAD") {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Disposition: attachment; filename=\"{}\"\r\nConnection: close\r\n\r\n",
            declared_len, FILE_NAME
        );
        let _ = write_half.write_all(head.as_bytes()).await;
    } else {
        let slice = &body[range_offset.min(body.len())..];
        let head = format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            slice.len()
        );
        let _ = write_half.write_all(head.as_bytes()).await;
        let _ = write_half.write_all(slice).await;
    }
    let _ = write_half.shutdown().await;
}

fn single_worker() -> Downloader {
    Downloader::new(DownloaderConfig {
        worker_count: 1,
        pool_timeout: Duration::from_secs(30),
    })
    .unwrap()
}

#[tokio::test]
async fn existing_file_is_skipped_without_writes() {
    let body = b"fresh bytes from the server".to_vec();
    let url = spawn_file_server(body.clone(), body.len()).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join(FILE_NAME);
    std::fs::write(&destination, b"local copy, do not touch").unwrap();

    let outcome = single_worker()
        .fetch_all(vec![DownloadTask::new(url.as_str(), dir.path())])
        .await;

    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.failed, 0);
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        b"local copy, do not touch"
    );
    let partial = dir.path().join(format!("{}{}", FILE_NAME, PARTIAL_SUFFIX));
    assert!(!partial.exists());
}

#[tokio::test]
async fn resumed_transfer_completes_and_removes_partial() {
    let body: Vec<u8> = (0..8192u32).flat_map(|n| n.to_le_bytes()).collect();
    let url = spawn_file_server(body.clone(), body.len()).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join(FILE_NAME);
    let partial = dir.path().join(format!("{}{}", FILE_NAME, PARTIAL_SUFFIX));
    std::fs::write(&partial, &body[..1000]).unwrap();

    let outcome = single_worker()
        .fetch_all(vec![DownloadTask::new(url.as_str(), dir.path())])
        .await;

    assert_eq!(outcome.completed, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(std::fs::read(&destination).unwrap(), body);
    assert!(!partial.exists());
}

#[tokio::test]
async fn short_stream_keeps_partial_and_no_final_file() {
    let body = vec![7u8; 4096];
    // Declared length exceeds what the server will actually send.
    let url = spawn_file_server(body.clone(), body.len() + 1024).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join(FILE_NAME);
    let partial = dir.path().join(format!("{}{}", FILE_NAME, PARTIAL_SUFFIX));

    let outcome = single_worker()
        .fetch_all(vec![DownloadTask::new(url.as_str(), dir.path())])
        .await;

    assert_eq!(outcome.incomplete, 1);
    assert_eq!(outcome.failed, 0);
    assert!(!destination.exists());
    assert_eq!(std::fs::read(&partial).unwrap(), body);
}
