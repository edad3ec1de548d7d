//! Job executor module for the video compressor
//!
//! Drives one job through download, encode and upload, then cleans up on
//! every exit path, including a panic in a front-end callback. Encodes are
//! limited by a semaphore and dispatched with `spawn_blocking` so they never
//! stall the async workers.

use crate::concurrency::EncodePoolPlan;
use crate::config::JobsConfig;
use crate::encode::{EncodeParams, Encoder};
use crate::job::{current_timestamp_ms, InvalidTransition, Job, JobStatus, UserId};
use crate::metrics::{JobMetrics, MetricsSnapshot, SharedMetrics};
use crate::presets::PresetCatalog;
use crate::progress::GuardedReporter;
use crate::registry::JobRegistry;
use crate::scratch::{FileRole, ScratchSpace};
use crate::size_report::SizeReport;
use crate::transfer::{JobIo, TransferError};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Reasons a pipeline stops before completing
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Download failed: {0}")]
    FetchFailed(TransferError),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Upload failed: {0}")]
    DeliverFailed(TransferError),

    #[error("Job exceeded its time limit of {0:?}")]
    TimedOut(Duration),

    #[error("Scratch file error: {0}")]
    Scratch(std::io::Error),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("Job task panicked: {0}")]
    Panicked(String),

    /// Cancellation observed at a stage boundary
    #[error("Job canceled")]
    Canceled,
}

/// Configuration for the job executor pipeline
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Wall-clock limit per job, `None` for no limit
    pub max_job_duration: Option<Duration>,
    /// Reporter failures per job before an error is logged
    pub report_failure_threshold: u32,
    /// Limit on a single progress report, `None` for no limit
    pub report_timeout: Option<Duration>,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            max_job_duration: None,
            report_failure_threshold: 3,
            report_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl JobExecutorConfig {
    pub fn from_jobs_config(cfg: &JobsConfig) -> Self {
        Self {
            max_job_duration: (cfg.max_job_duration_secs > 0)
                .then(|| Duration::from_secs(cfg.max_job_duration_secs)),
            report_failure_threshold: cfg.report_failure_threshold,
            report_timeout: (cfg.report_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.report_timeout_secs)),
        }
    }
}

/// Final result of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub user_id: UserId,
    pub status: JobStatus,
    pub failure: Option<String>,
    pub size_report: Option<SizeReport>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

/// Job executor that runs pipelines and bounds concurrent encodes
///
/// Uses a tokio Semaphore sized from the [`EncodePoolPlan`]. A permit is held
/// only while the encoder runs; downloads and uploads are not limited.
pub struct JobExecutor {
    semaphore: Arc<Semaphore>,
    plan: EncodePoolPlan,
    encoder: Arc<dyn Encoder>,
    presets: Arc<PresetCatalog>,
    registry: Arc<JobRegistry>,
    scratch: Arc<ScratchSpace>,
    metrics: SharedMetrics,
    config: JobExecutorConfig,
}

impl JobExecutor {
    pub fn new(
        plan: EncodePoolPlan,
        encoder: Arc<dyn Encoder>,
        presets: Arc<PresetCatalog>,
        registry: Arc<JobRegistry>,
        scratch: Arc<ScratchSpace>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(plan.encode_workers as usize)),
            plan,
            encoder,
            presets,
            registry,
            scratch,
            metrics,
            config: JobExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the number of free encode slots
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn pool_plan(&self) -> &EncodePoolPlan {
        &self.plan
    }

    pub fn presets(&self) -> &PresetCatalog {
        &self.presets
    }

    /// Try to take an encode slot without waiting
    ///
    /// Returns None if every slot is in use.
    pub fn try_acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Run `job` to a terminal status.
    ///
    /// The job must already be admitted to the registry. On return its scratch
    /// files are gone, its registry entry is released and the reporter has
    /// seen exactly one terminal event.
    pub async fn run(&self, job: Arc<Job>, io: JobIo) -> JobOutcome {
        let span = info_span!("job", user_id = %job.user_id, job_id = %job.id);
        self.run_to_end(job, io).instrument(span).await
    }

    async fn run_to_end(&self, job: Arc<Job>, io: JobIo) -> JobOutcome {
        let deadline = self.config.max_job_duration.map(|limit| Deadline {
            at: Instant::now() + limit,
            limit,
        });
        let mut reporter = GuardedReporter::new(
            io.reporter.as_ref(),
            self.metrics.clone(),
            self.config.report_failure_threshold,
        )
        .with_timeout(self.config.report_timeout);

        info!(preset = %job.preset, size_bytes = job.video.size_bytes, "job started");
        self.publish(&job).await;

        let result = AssertUnwindSafe(self.drive(&job, &io, &mut reporter, deadline))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(&*panic))));
        let (status, failure) = match &result {
            Ok(_) => (JobStatus::Completed, None),
            Err(PipelineError::Canceled) => (JobStatus::Canceled, None),
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };
        if let Err(e) = job.finish(status, failure.clone()) {
            error!(error = %e, "could not record terminal status");
        }

        match &result {
            Ok(report) => info!(
                input_bytes = report.input_bytes,
                output_bytes = report.output_bytes,
                reduction_percent = report.reduction_percent(),
                "job completed"
            ),
            Err(PipelineError::Canceled) => info!("job canceled"),
            Err(e) => warn!(error = %e, "job failed"),
        }

        self.cleanup(&job);

        let snapshot = job.snapshot();
        {
            let mut metrics = self.metrics.write().await;
            metrics.record_terminal(&job.id.to_string(), status, snapshot.size_report);
            self.refresh_slots(&mut metrics);
        }

        let detail = match status {
            JobStatus::Completed => snapshot.size_report.map(|r| r.summary()),
            JobStatus::Canceled => Some("Compression canceled.".to_string()),
            _ => failure.clone(),
        };
        let terminal = reporter.terminal(&snapshot, status, detail.as_deref());
        if let Err(panic) = AssertUnwindSafe(terminal).catch_unwind().await {
            error!(panic = %panic_message(&*panic), "terminal report panicked");
        }
        if reporter.failures() > 0 {
            debug!(failures = reporter.failures(), "progress reports were dropped");
        }

        JobOutcome {
            job_id: job.id,
            user_id: job.user_id,
            status,
            failure,
            size_report: snapshot.size_report,
        }
    }

    async fn drive(
        &self,
        job: &Job,
        io: &JobIo,
        reporter: &mut GuardedReporter<'_>,
        deadline: Option<Deadline>,
    ) -> Result<SizeReport, PipelineError> {
        // Pending -> Downloading
        self.checkpoint(job, deadline)?;
        job.transition(JobStatus::Downloading)?;
        let input = self.scratch.allocate(job, FileRole::Input);
        job.set_input_path(input.clone());
        self.announce(job, JobStatus::Downloading, reporter, deadline).await?;

        within_deadline(deadline, io.fetcher.fetch(&job.video, &input))
            .await?
            .map_err(PipelineError::FetchFailed)?;
        let input_bytes = tokio::fs::metadata(&input)
            .await
            .map_err(PipelineError::Scratch)?
            .len();
        debug!(input_bytes, "download finished");

        // Downloading -> Encoding
        self.checkpoint(job, deadline)?;
        job.transition(JobStatus::Encoding)?;
        let output = self.scratch.allocate(job, FileRole::Output);
        job.set_output_path(output.clone());
        self.announce(job, JobStatus::Encoding, reporter, deadline).await?;

        let params = self.presets.params(job.preset);
        self.encode(job, input, output.clone(), params, deadline).await?;

        // Encoding -> Uploading
        self.checkpoint(job, deadline)?;
        let output_bytes = match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => {
                return Err(PipelineError::EncodeFailed(
                    "encoder produced an empty output file".to_string(),
                ))
            }
            Err(e) => {
                return Err(PipelineError::EncodeFailed(format!(
                    "encoder output missing: {}",
                    e
                )))
            }
        };
        let report = SizeReport::new(input_bytes, output_bytes);
        job.transition(JobStatus::Uploading)?;
        job.set_size_report(report);
        self.announce(job, JobStatus::Uploading, reporter, deadline).await?;

        let snapshot = job.snapshot();
        within_deadline(deadline, io.sink.deliver(&snapshot, &output, &report))
            .await?
            .map_err(PipelineError::DeliverFailed)?;

        Ok(report)
    }

    /// Stage boundary: honor cancellation first, then the deadline
    fn checkpoint(&self, job: &Job, deadline: Option<Deadline>) -> Result<(), PipelineError> {
        if job.is_cancel_requested() {
            debug!(stage = %job.status(), "cancellation observed");
            return Err(PipelineError::Canceled);
        }
        match deadline {
            Some(d) if Instant::now() >= d.at => Err(PipelineError::TimedOut(d.limit)),
            _ => Ok(()),
        }
    }

    async fn encode(
        &self,
        job: &Job,
        input: PathBuf,
        output: PathBuf,
        params: EncodeParams,
        deadline: Option<Deadline>,
    ) -> Result<(), PipelineError> {
        let permit = within_deadline(deadline, self.semaphore.clone().acquire_owned())
            .await?
            .map_err(|_| PipelineError::EncodeFailed("encode pool is closed".to_string()))?;

        // The wait for a slot can be long; don't start work nobody wants
        if job.is_cancel_requested() {
            return Err(PipelineError::Canceled);
        }

        debug!(crf = params.crf, speed = %params.speed, "dispatching encode");
        self.publish(job).await;

        let encoder = Arc::clone(&self.encoder);
        let started = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            encoder.encode(&input, &output, &params)
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                info!(elapsed_ms, "encode finished");
                Ok(())
            }
            Ok(Err(e)) => Err(PipelineError::EncodeFailed(e.to_string())),
            Err(join_err) => Err(PipelineError::EncodeFailed(format!(
                "encoder task panicked: {}",
                join_err
            ))),
        }
    }

    /// Delete scratch files, then release the registry entry
    fn cleanup(&self, job: &Job) {
        let report = self.scratch.release(job);
        debug!(removed = report.removed.len(), "scratch files released");
        if !report.is_clean() {
            warn!(
                warnings = report.warnings.len(),
                "some scratch files could not be deleted"
            );
        }
        if !self.registry.release(job.user_id, job.id) {
            debug!("registry entry already released");
        }
    }

    async fn announce(
        &self,
        job: &Job,
        stage: JobStatus,
        reporter: &mut GuardedReporter<'_>,
        deadline: Option<Deadline>,
    ) -> Result<(), PipelineError> {
        debug!(stage = %stage, "stage entered");
        self.publish(job).await;
        within_deadline(deadline, reporter.stage(&job.snapshot(), stage)).await
    }

    /// Update job metrics in shared state
    async fn publish(&self, job: &Job) {
        let mut metrics = self.metrics.write().await;
        metrics.upsert_job(JobMetrics::from(&job.snapshot()));
        self.refresh_slots(&mut metrics);
    }

    fn refresh_slots(&self, metrics: &mut MetricsSnapshot) {
        metrics.encode_slots_total = self.plan.encode_workers as usize;
        metrics.encode_slots_available = self.semaphore.available_permits();
        metrics.timestamp_unix_ms = current_timestamp_ms();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Race `fut` against the job deadline, if there is one
async fn within_deadline<F: Future>(
    deadline: Option<Deadline>,
    fut: F,
) -> Result<F::Output, PipelineError> {
    match deadline {
        Some(d) => tokio::time::timeout_at(d.at, fut)
            .await
            .map_err(|_| PipelineError::TimedOut(d.limit)),
        None => Ok(fut.await),
    }
}
