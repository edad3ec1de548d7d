//! Front-end callbacks that move video bytes in and out of the core.
//!
//! A submission carries a [`JobIo`] bundle: the fetcher that materializes the
//! referenced video, the sink that delivers the result (it captures whatever
//! chat context the front end needs), and the progress reporter.

use crate::job::{JobSnapshot, VideoRef};
use crate::progress::ProgressReporter;
use crate::size_report::SizeReport;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Error type for fetch and deliver callbacks
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failure reported by the remote side
    #[error("{0}")]
    Remote(String),
}

/// Materializes a referenced video at a local path
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    async fn fetch(&self, video: &VideoRef, dest: &Path) -> Result<(), TransferError>;
}

/// Delivers a finished output file to the user
#[async_trait]
pub trait VideoSink: Send + Sync {
    async fn deliver(
        &self,
        job: &JobSnapshot,
        output: &Path,
        report: &SizeReport,
    ) -> Result<(), TransferError>;
}

/// Callbacks supplied with one submission
#[derive(Clone)]
pub struct JobIo {
    pub fetcher: Arc<dyn VideoFetcher>,
    pub sink: Arc<dyn VideoSink>,
    pub reporter: Arc<dyn ProgressReporter>,
}

impl JobIo {
    pub fn new(
        fetcher: Arc<dyn VideoFetcher>,
        sink: Arc<dyn VideoSink>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            fetcher,
            sink,
            reporter,
        }
    }
}

/// Fetcher that treats `VideoRef::file_id` as a local file path and copies it
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileFetcher;

#[async_trait]
impl VideoFetcher for LocalFileFetcher {
    async fn fetch(&self, video: &VideoRef, dest: &Path) -> Result<(), TransferError> {
        tokio::fs::copy(&video.file_id, dest).await?;
        Ok(())
    }
}

/// Sink that copies results into a directory as `compressed_<original name>`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the result for `video` ends up
    pub fn destination(&self, video: &VideoRef) -> PathBuf {
        let stem = Path::new(&video.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "video".to_string());
        self.dir.join(format!("compressed_{}.mp4", stem))
    }
}

#[async_trait]
impl VideoSink for DirectorySink {
    async fn deliver(
        &self,
        job: &JobSnapshot,
        output: &Path,
        _report: &SizeReport,
    ) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::copy(output, self.destination(&job.video)).await?;
        Ok(())
    }
}
