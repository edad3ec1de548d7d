//! Progress reporting towards the front end.
//!
//! The front end implements [`ProgressReporter`]. Reports are notifications
//! only: the pipeline wraps the reporter in [`GuardedReporter`], which logs
//! and counts failures and never lets them change a job's outcome. A report
//! that does not answer within the per-call timeout counts as a failure.

use crate::job::{JobSnapshot, JobStatus};
use crate::metrics::SharedMetrics;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// A progress notification that could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ReportError(pub String);

impl ReportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receiver of stage changes and final outcomes
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Called when the job enters `stage`.
    async fn on_stage(&self, job: &JobSnapshot, stage: JobStatus) -> Result<(), ReportError>;

    /// Called exactly once per job, after cleanup, with its terminal status.
    async fn on_terminal(
        &self,
        job: &JobSnapshot,
        status: JobStatus,
        detail: Option<&str>,
    ) -> Result<(), ReportError>;
}

/// Reporter that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

#[async_trait]
impl ProgressReporter for NoopReporter {
    async fn on_stage(&self, _job: &JobSnapshot, _stage: JobStatus) -> Result<(), ReportError> {
        Ok(())
    }

    async fn on_terminal(
        &self,
        _job: &JobSnapshot,
        _status: JobStatus,
        _detail: Option<&str>,
    ) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Per-job wrapper isolating reporter failures from the pipeline.
///
/// Each failure is logged as a warning and counted in the shared metrics.
/// When a job's failures reach `threshold` one error is logged for it.
pub(crate) struct GuardedReporter<'a> {
    inner: &'a dyn ProgressReporter,
    metrics: SharedMetrics,
    threshold: u32,
    timeout: Option<Duration>,
    failures: u32,
}

impl<'a> GuardedReporter<'a> {
    pub(crate) fn new(
        inner: &'a dyn ProgressReporter,
        metrics: SharedMetrics,
        threshold: u32,
    ) -> Self {
        Self {
            inner,
            metrics,
            threshold,
            timeout: None,
            failures: 0,
        }
    }

    /// Give up on any single report after `timeout`
    pub(crate) fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) async fn stage(&mut self, job: &JobSnapshot, stage: JobStatus) {
        let result = self.bounded(self.inner.on_stage(job, stage)).await;
        self.absorb(result, "stage").await;
    }

    pub(crate) async fn terminal(
        &mut self,
        job: &JobSnapshot,
        status: JobStatus,
        detail: Option<&str>,
    ) {
        let result = self
            .bounded(self.inner.on_terminal(job, status, detail))
            .await;
        self.absorb(result, "terminal").await;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    async fn bounded<F>(&self, report: F) -> Result<(), ReportError>
    where
        F: Future<Output = Result<(), ReportError>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, report)
                .await
                .unwrap_or_else(|_| {
                    Err(ReportError(format!("no answer within {:?}", limit)))
                }),
            None => report.await,
        }
    }

    async fn absorb(&mut self, result: Result<(), ReportError>, event: &'static str) {
        let Err(e) = result else {
            return;
        };

        self.failures += 1;
        warn!(event, failures = self.failures, error = %e, "progress report failed");
        if self.threshold > 0 && self.failures == self.threshold {
            error!(
                failures = self.failures,
                "progress reporter keeps failing; the front end may not show this job's status"
            );
        }
        self.metrics.write().await.report_failures += 1;
    }
}
