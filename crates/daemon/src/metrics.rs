//! Metrics module for the video compressor
//!
//! Provides structs for job metrics and metrics snapshots with JSON
//! serialization support.

use crate::job::{JobSnapshot, JobStatus};
use crate::size_report::SizeReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-job metrics tracking pipeline progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    pub id: String,
    pub user_id: i64,
    pub preset: String,
    pub stage: String,
    pub cancel_requested: bool,
    pub started_at_unix_ms: i64,
    pub size_in_bytes_before: u64,
    pub size_in_bytes_after: u64,
}

impl From<&JobSnapshot> for JobMetrics {
    fn from(job: &JobSnapshot) -> Self {
        let (before, after) = match job.size_report {
            Some(report) => (report.input_bytes, report.output_bytes),
            None => (job.video.size_bytes, 0),
        };
        Self {
            id: job.id.to_string(),
            user_id: job.user_id.0,
            preset: job.preset.key().to_string(),
            stage: job.status.as_str().to_string(),
            cancel_requested: job.cancel_requested,
            started_at_unix_ms: job.started_at,
            size_in_bytes_before: before,
            size_in_bytes_after: after,
        }
    }
}

/// Complete metrics snapshot including active jobs and aggregate stats
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub timestamp_unix_ms: i64,
    pub jobs: Vec<JobMetrics>,
    pub encode_slots_total: usize,
    pub encode_slots_available: usize,
    pub completed_jobs: u64,
    pub canceled_jobs: u64,
    pub failed_jobs: u64,
    pub report_failures: u64,
    pub total_bytes_in: u64,
    pub total_bytes_out: u64,
}

impl MetricsSnapshot {
    /// Insert or replace the metrics for one job
    pub fn upsert_job(&mut self, job: JobMetrics) {
        if let Some(existing) = self.jobs.iter_mut().find(|j| j.id == job.id) {
            *existing = job;
        } else {
            self.jobs.push(job);
        }
    }

    /// Number of jobs in a non-terminal stage
    pub fn running_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.stage.as_str(), "downloading" | "encoding" | "uploading"))
            .count()
    }

    /// Drop a finished job and count its outcome
    pub fn record_terminal(&mut self, job_id: &str, status: JobStatus, report: Option<SizeReport>) {
        self.jobs.retain(|j| j.id != job_id);
        match status {
            JobStatus::Completed => {
                self.completed_jobs += 1;
                if let Some(report) = report {
                    self.total_bytes_in += report.input_bytes;
                    self.total_bytes_out += report.output_bytes;
                }
            }
            JobStatus::Canceled => self.canceled_jobs += 1,
            JobStatus::Failed => self.failed_jobs += 1,
            _ => {}
        }
    }
}

/// Shared metrics state for concurrent access across components
pub type SharedMetrics = Arc<RwLock<MetricsSnapshot>>;

/// Creates a new SharedMetrics instance with default values
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(RwLock::new(MetricsSnapshot::default()))
}
