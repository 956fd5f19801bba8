// Downloader tests against a local HTTP server


use pourover::download::{ArtifactKind, FetchRequest};
use pourover::{Downloader, ErrorType, is_recoverable};
use std::fs;
use std::path::Path;
use test_helpers::{RecordingReporter, TestEnvironment, sha256};

fn downloader(env: &TestEnvironment, reporter: std::sync::Arc<RecordingReporter>) -> Downloader {
    Downloader::new(&env.config(), reporter).unwrap()
}

fn request<'a>(url: &'a str, dest: &'a Path, sha256: &'a str) -> FetchRequest<'a> {
    FetchRequest {
        label: "hello",
        url,
        dest,
        sha256,
        size: 0,
        kind: ArtifactKind::Source,
        strict: false,
    }
}

#[tokio::test]
async fn test_download_file_writes_body_and_reports_progress() {
    let env = TestEnvironment::new();
    let mut server = mockito::Server::new_async().await;
    let body = vec![7u8; 100_000];
    let _mock = server
        .mock("GET", "/hello.tar.gz")
        .with_status(200)
        .with_body(&body)
        .create_async()
        .await;

    let reporter = RecordingReporter::new();
    let dest = env.cache.join("downloads/hello.tar.gz");
    let bytes = downloader(&env, reporter.clone())
        .download_file(&format!("{}/hello.tar.gz", server.url()), &dest)
        .await
        .unwrap();

    assert_eq!(bytes, body.len() as u64);
    assert_eq!(fs::read(&dest).unwrap(), body);
    assert!(!env.cache.join("downloads/hello.tar.gz.part").exists());

    // Progress never goes backwards and ends at the full length
    let progress = reporter.progress();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(progress.last().unwrap().0, body.len() as u64);
    assert!(reporter.has_event("downloaded:", "hello.tar.gz"));
}

#[tokio::test]
async fn test_http_status_error() {
    let env = TestEnvironment::new();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing.tar.gz")
        .with_status(404)
        .create_async()
        .await;

    let dest = env.cache.join("missing.tar.gz");
    let err = downloader(&env, RecordingReporter::new())
        .download_file(&format!("{}/missing.tar.gz", server.url()), &dest)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorType::NetworkError);
    assert!(err.to_string().contains("download"));
    assert!(is_recoverable(&err));
    assert!(!dest.exists());
    assert!(!env.cache.join("missing.tar.gz.part").exists());
}

#[tokio::test]
async fn test_malformed_url() {
    let env = TestEnvironment::new();
    let err = downloader(&env, RecordingReporter::new())
        .download_file("not a url", &env.cache.join("x"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorType::NetworkError);
    assert!(err.to_string().contains("download"));
}

#[tokio::test]
async fn test_connection_refused() {
    let env = TestEnvironment::new();
    // Bind then drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = downloader(&env, RecordingReporter::new())
        .download_file(&format!("http://127.0.0.1:{}/x", port), &env.cache.join("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorType::NetworkError);
    assert!(err.to_string().contains("download"));
}

#[tokio::test]
async fn test_fetch_checksum_mismatch_removes_file() {
    let env = TestEnvironment::new();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/hello.tar.gz")
        .with_body("tampered")
        .create_async()
        .await;

    let url = format!("{}/hello.tar.gz", server.url());
    let dest = env.cache.join("hello.tar.gz");
    let expected = sha256(b"original");
    let err = downloader(&env, RecordingReporter::new())
        .fetch(&request(&url, &dest, &expected))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorType::ChecksumError);
    assert!(err.to_string().contains("checksum"));
    assert!(!is_recoverable(&err));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_fetch_size_mismatch() {
    let env = TestEnvironment::new();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/hello.tar.gz")
        .with_body("hello")
        .create_async()
        .await;

    let url = format!("{}/hello.tar.gz", server.url());
    let dest = env.cache.join("hello.tar.gz");
    let digest = sha256(b"hello");
    let mut req = request(&url, &dest, &digest);
    req.size = 999;

    let err = downloader(&env, RecordingReporter::new())
        .fetch(&req)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorType::ChecksumError);
    assert!(err.to_string().contains("size mismatch"));
}

#[tokio::test]
async fn test_fetch_reuses_verified_cache() {
    let env = TestEnvironment::new();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/hello.tar.gz")
        .with_body("hello")
        .expect(1)
        .create_async()
        .await;

    let url = format!("{}/hello.tar.gz", server.url());
    let dest = env.cache.join("hello.tar.gz");
    let digest = sha256(b"hello");
    let dl = downloader(&env, RecordingReporter::new());

    dl.fetch(&request(&url, &dest, &digest)).await.unwrap();
    dl.fetch(&request(&url, &dest, &digest)).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_replaces_corrupt_cache() {
    let env = TestEnvironment::new();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/hello.tar.gz")
        .with_body("hello")
        .expect(1)
        .create_async()
        .await;

    let dest = env.cache.join("hello.tar.gz");
    fs::write(&dest, "stale").unwrap();

    let url = format!("{}/hello.tar.gz", server.url());
    let digest = sha256(b"hello");
    let path = downloader(&env, RecordingReporter::new())
        .fetch(&request(&url, &dest, &digest))
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(path).unwrap(), "hello");
    mock.assert_async().await;
}
