//! Streaming downloads with progress tracking and verification.
//!
//! The response body is read through a [`ProgressReader`], which counts every byte
//! handed to the copy loop. The count is exposed through a cloneable
//! [`DownloadProgress`] handle and forwarded to the [`Reporter`] after each chunk.
//!
//! Files are written to `<dest>.part` and renamed into place only after the whole
//! body arrived, so an interrupted transfer never looks like a finished one.

use crate::config::Config;
use crate::error::{ErrorType, InstallError, Result};
use crate::reporter::Reporter;
use crate::verify;
use futures::TryStreamExt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio_util::io::StreamReader;

const BUFFER_SIZE: usize = 64 * 1024;

/// Shared byte counter for one transfer
#[derive(Debug, Clone, Default)]
pub struct DownloadProgress {
    current: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl DownloadProgress {
    /// `total` is 0 when the size is unknown (chunked responses)
    pub fn new(total: u64) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(0)),
            total: Arc::new(AtomicU64::new(total)),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    fn add(&self, n: usize) {
        self.current.fetch_add(n as u64, Ordering::AcqRel);
    }
}

/// Reader adapter that counts bytes as they are read.
///
/// The count is updated before `read` returns; end-of-stream and errors are passed
/// through untouched and never change the count.
#[derive(Debug)]
pub struct ProgressReader<R> {
    inner: R,
    progress: DownloadProgress,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, progress: DownloadProgress) -> Self {
        Self { inner, progress }
    }

    pub fn progress(&self) -> &DownloadProgress {
        &self.progress
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.add(n);
        Ok(n)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.progress.add(buf.filled().len() - before);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// What is being fetched; selects the verification routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Bottle,
    Source,
}

/// A download that must match a declared checksum
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub label: &'a str,
    pub url: &'a str,
    pub dest: &'a Path,
    pub sha256: &'a str,
    /// 0 skips the size check
    pub size: u64,
    pub kind: ArtifactKind,
    /// Refuse artifacts that declare no checksum
    pub strict: bool,
}

/// HTTP downloader sharing one client across transfers
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    idle_timeout: Duration,
    reporter: Arc<dyn Reporter>,
}

impl Downloader {
    pub fn new(config: &Config, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.download_timeout)
            .user_agent(crate::receipt::installer_identity())
            .build()
            .map_err(|e| {
                InstallError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_cause(e)
            })?;

        Ok(Self {
            client,
            idle_timeout: config.idle_timeout,
            reporter,
        })
    }

    /// Download `url` to `dest`, returning the number of bytes written
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| url.to_string());
        self.download_labeled(&label, url, dest).await
    }

    async fn download_labeled(&self, label: &str, url: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::io(parent, e).with_operation("download"))?;
        }

        tracing::debug!(url, dest = %dest.display(), "starting download");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| InstallError::network(url, e))?;

        let progress = DownloadProgress::new(response.content_length().unwrap_or(0));
        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader =
            ProgressReader::new(StreamReader::new(Box::pin(stream)), progress.clone());

        let part = part_path(dest);
        let result = self
            .copy_to_file(&mut reader, &part, url, label, &progress)
            .await;

        match result {
            Ok(bytes) => {
                fs::rename(&part, dest)
                    .await
                    .map_err(|e| InstallError::io(dest, e).with_operation("download"))?;
                self.reporter.download_finished(label);
                tracing::debug!(url, bytes, "download complete");
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                self.reporter.download_finished(label);
                Err(e)
            }
        }
    }

    async fn copy_to_file<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ProgressReader<R>,
        part: &Path,
        url: &str,
        label: &str,
        progress: &DownloadProgress,
    ) -> Result<u64> {
        let mut file = fs::File::create(part)
            .await
            .map_err(|e| InstallError::io(part, e).with_operation("download"))?;
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let read = AsyncReadExt::read(&mut *reader, &mut buffer);
            let n = match tokio::time::timeout(self.idle_timeout, read).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(InstallError::network(url, e)),
                Err(_) => {
                    return Err(InstallError::network(
                        url,
                        format!("no data received for {}s", self.idle_timeout.as_secs()),
                    ));
                }
            };
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n])
                .await
                .map_err(|e| InstallError::io(part, e).with_operation("download"))?;
            self.reporter
                .download_progress(label, progress.current(), progress.total());
        }

        file.flush()
            .await
            .map_err(|e| InstallError::io(part, e).with_operation("download"))?;

        Ok(progress.current())
    }

    /// Download and verify an artifact, reusing a cached copy that already verifies
    pub async fn fetch(&self, request: &FetchRequest<'_>) -> Result<PathBuf> {
        let dest = request.dest;
        let has_checksum = !request.sha256.trim().is_empty();

        if !has_checksum {
            if request.strict {
                return Err(InstallError::new(
                    ErrorType::ChecksumError,
                    format!(
                        "no checksum declared for {} (strict verification is enabled)",
                        request.url
                    ),
                )
                .with_operation("verify")
                .with_suggestion("Add a sha256 to the formula descriptor")
                .with_suggestion("Re-run without --strict to accept unverified downloads"));
            }
            self.reporter.warning(&format!(
                "{} declares no checksum; skipping verification",
                request.label
            ));
        }

        if has_checksum && dest.exists() {
            match verify_blocking(request).await {
                Ok(()) => {
                    self.reporter
                        .debug(&format!("Using cached {}", dest.display()));
                    return Ok(dest.to_path_buf());
                }
                Err(_) => {
                    // Stale or corrupt cache entry, fetch again
                    let _ = fs::remove_file(dest).await;
                }
            }
        }

        self.download_labeled(request.label, request.url, dest)
            .await?;

        if has_checksum {
            if let Err(e) = verify_blocking(request).await {
                let _ = fs::remove_file(dest).await;
                return Err(e);
            }
        }

        Ok(dest.to_path_buf())
    }
}

async fn verify_blocking(request: &FetchRequest<'_>) -> Result<()> {
    let path = request.dest.to_path_buf();
    let sha256 = request.sha256.to_string();
    let size = request.size;
    let kind = request.kind;

    tokio::task::spawn_blocking(move || match kind {
        ArtifactKind::Bottle => verify::verify_bottle(&path, &sha256, size),
        ArtifactKind::Source => verify::verify_source(&path, &sha256, size),
    })
    .await
    .map_err(|e| {
        InstallError::new(
            ErrorType::FileSystemError,
            format!("verification task failed: {}", e),
        )
    })?
}

fn part_path(dest: &Path) -> PathBuf {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}
