//! Job model for compression requests.
//!
//! A [`Job`] is shared between the registry and the pipeline task that owns
//! it. Only the pipeline task moves its status or sets its paths; any caller
//! may flip the cancel flag, which is a plain atomic and never reset.

use crate::presets::QualityPreset;
use crate::size_report::SizeReport;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Opaque end-user identifier, one registry slot per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Reference to a video held by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    /// Front-end file handle.
    pub file_id: String,
    /// Size declared by the front end.
    pub size_bytes: u64,
    /// Original file name.
    pub file_name: String,
    pub mime_type: String,
}

impl VideoRef {
    /// Create a reference with a generated file name and `video/mp4` type.
    pub fn new(file_id: impl Into<String>, size_bytes: u64) -> Self {
        let secs = current_timestamp_ms() / 1000;
        Self {
            file_id: file_id.into(),
            size_bytes,
            file_name: format!("video_{}.mp4", secs),
            mime_type: "video/mp4".to_string(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Status of a job in the compression pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted, nothing started yet.
    #[default]
    Pending,
    /// Fetching the video from the front end.
    Downloading,
    /// Encoding, or waiting for an encode slot.
    Encoding,
    /// Delivering the result to the front end.
    Uploading,
    /// Delivered successfully.
    Completed,
    /// Stopped at a stage boundary after a cancel request.
    Canceled,
    /// Stopped by an unrecoverable error.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Canceled | JobStatus::Failed
        )
    }

    /// Position in the pipeline order. Escape states share the terminal rank.
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Downloading => 1,
            JobStatus::Encoding => 2,
            JobStatus::Uploading => 3,
            JobStatus::Completed | JobStatus::Canceled | JobStatus::Failed => 4,
        }
    }

    /// Whether `next` may follow `self`.
    ///
    /// The pipeline advances one stage at a time and ends in `Completed`
    /// only from `Uploading`; `Canceled` and `Failed` are reachable from any
    /// non-terminal status. Nothing follows a terminal status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Canceled | JobStatus::Failed => true,
            JobStatus::Pending => false,
            _ => next.rank() == self.rank() + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Encoding => "encoding",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Canceled => "canceled",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change that would break the pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Mutable part of a job, written by the owning pipeline task.
#[derive(Debug, Clone, Default)]
struct JobState {
    status: JobStatus,
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    failure: Option<String>,
    size_report: Option<SizeReport>,
    updated_at: i64,
}

/// One user's compression request.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub user_id: UserId,
    pub video: VideoRef,
    pub preset: QualityPreset,
    /// Unix timestamp (milliseconds) of admission.
    pub started_at: i64,
    cancel_requested: AtomicBool,
    state: RwLock<JobState>,
}

impl Job {
    pub fn new(user_id: UserId, video: VideoRef, preset: QualityPreset) -> Self {
        let now = current_timestamp_ms();
        Self {
            id: Uuid::new_v4(),
            user_id,
            video,
            preset,
            started_at: now,
            cancel_requested: AtomicBool::new(false),
            state: RwLock::new(JobState {
                updated_at: now,
                ..JobState::default()
            }),
        }
    }

    /// Flag the job for cancellation. Returns `false` if it was already flagged.
    pub fn request_cancel(&self) -> bool {
        !self.cancel_requested.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn status(&self) -> JobStatus {
        self.state.read().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Move to `next`, rejecting anything that is not a forward step.
    pub fn transition(&self, next: JobStatus) -> Result<(), InvalidTransition> {
        let mut state = self.state.write();
        if !state.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: state.status,
                to: next,
            });
        }
        state.status = next;
        state.updated_at = current_timestamp_ms();
        Ok(())
    }

    /// Enter a terminal status, recording `failure` when it is `Failed`.
    pub fn finish(
        &self,
        status: JobStatus,
        failure: Option<String>,
    ) -> Result<(), InvalidTransition> {
        debug_assert!(status.is_terminal());
        self.transition(status)?;
        if status == JobStatus::Failed {
            self.state.write().failure = failure;
        }
        Ok(())
    }

    pub fn set_input_path(&self, path: PathBuf) {
        let mut state = self.state.write();
        state.input_path = Some(path);
        state.updated_at = current_timestamp_ms();
    }

    /// Record the output path. Only meaningful once encoding has begun.
    pub fn set_output_path(&self, path: PathBuf) {
        let mut state = self.state.write();
        debug_assert_eq!(state.status, JobStatus::Encoding);
        state.output_path = Some(path);
        state.updated_at = current_timestamp_ms();
    }

    pub fn set_size_report(&self, report: SizeReport) {
        let mut state = self.state.write();
        state.size_report = Some(report);
        state.updated_at = current_timestamp_ms();
    }

    /// Point-in-time copy of the whole job.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.read();
        JobSnapshot {
            id: self.id,
            user_id: self.user_id,
            video: self.video.clone(),
            preset: self.preset,
            status: state.status,
            cancel_requested: self.is_cancel_requested(),
            input_path: state.input_path.clone(),
            output_path: state.output_path.clone(),
            started_at: self.started_at,
            updated_at: state.updated_at,
            failure: state.failure.clone(),
            size_report: state.size_report,
        }
    }
}

/// Read-only copy of a [`Job`] handed to callers and reporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub user_id: UserId,
    pub video: VideoRef,
    pub preset: QualityPreset,
    pub status: JobStatus,
    pub cancel_requested: bool,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub started_at: i64,
    pub updated_at: i64,
    pub failure: Option<String>,
    pub size_report: Option<SizeReport>,
}

/// Get current timestamp in milliseconds since Unix epoch.
pub(crate) fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_job() -> Job {
        Job::new(
            UserId(42),
            VideoRef::new("file-abc", 10 * 1024 * 1024).with_file_name("holiday.mov"),
            QualityPreset::Medium,
        )
    }

    fn status_strategy() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Downloading),
            Just(JobStatus::Encoding),
            Just(JobStatus::Uploading),
            Just(JobStatus::Completed),
            Just(JobStatus::Canceled),
            Just(JobStatus::Failed),
        ]
    }

    // Whatever sequence of transitions is attempted, the accepted ones never
    // move the job backwards and nothing is accepted after a terminal status.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_status_never_regresses(
            attempts in prop::collection::vec(status_strategy(), 0..20),
        ) {
            let job = make_job();
            let mut previous = job.status();

            for next in attempts {
                let accepted = job.transition(next).is_ok();
                let current = job.status();

                if accepted {
                    prop_assert_eq!(current, next);
                    prop_assert!(current.rank() > previous.rank());
                } else {
                    prop_assert_eq!(current, previous);
                }
                if previous.is_terminal() {
                    prop_assert!(!accepted);
                }
                previous = current;
            }
        }
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(format!("{}", JobStatus::Pending), "pending");
        assert_eq!(format!("{}", JobStatus::Downloading), "downloading");
        assert_eq!(format!("{}", JobStatus::Encoding), "encoding");
        assert_eq!(format!("{}", JobStatus::Uploading), "uploading");
        assert_eq!(format!("{}", JobStatus::Completed), "completed");
        assert_eq!(format!("{}", JobStatus::Canceled), "canceled");
        assert_eq!(format!("{}", JobStatus::Failed), "failed");
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = make_job();

        assert_eq!(job.status(), JobStatus::Pending);
        assert!(!job.is_cancel_requested());
        assert!(job.started_at > 0);

        let snapshot = job.snapshot();
        assert_eq!(snapshot.user_id, UserId(42));
        assert_eq!(snapshot.video.file_name, "holiday.mov");
        assert!(snapshot.input_path.is_none());
        assert!(snapshot.output_path.is_none());
        assert!(snapshot.failure.is_none());
        assert_eq!(snapshot.started_at, snapshot.updated_at);
    }

    #[test]
    fn test_full_pipeline_walk() {
        let job = make_job();
        job.transition(JobStatus::Downloading).unwrap();
        job.transition(JobStatus::Encoding).unwrap();
        job.transition(JobStatus::Uploading).unwrap();
        job.finish(JobStatus::Completed, None).unwrap();
        assert!(job.is_terminal());
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let job = make_job();
        let err = job.transition(JobStatus::Encoding).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Encoding
            }
        );
        assert!(job.finish(JobStatus::Completed, None).is_err());
    }

    #[test]
    fn test_finish_failed_records_failure() {
        let job = make_job();
        job.transition(JobStatus::Downloading).unwrap();
        job.finish(JobStatus::Failed, Some("download failed: boom".to_string()))
            .unwrap();

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.failure.as_deref(), Some("download failed: boom"));
    }

    #[test]
    fn test_finish_canceled_ignores_failure_detail() {
        let job = make_job();
        job.finish(JobStatus::Canceled, Some("ignored".to_string()))
            .unwrap();
        assert!(job.snapshot().failure.is_none());
    }

    #[test]
    fn test_cancel_flag_is_monotonic() {
        let job = make_job();
        assert!(job.request_cancel());
        assert!(!job.request_cancel());
        assert!(job.is_cancel_requested());
        assert!(job.snapshot().cancel_requested);
    }

    #[test]
    fn test_paths_show_up_in_snapshot() {
        let job = make_job();
        job.transition(JobStatus::Downloading).unwrap();
        job.set_input_path(PathBuf::from("/tmp/in.mov"));
        job.transition(JobStatus::Encoding).unwrap();
        job.set_output_path(PathBuf::from("/tmp/out.mp4"));

        let snapshot = job.snapshot();
        assert_eq!(snapshot.input_path, Some(PathBuf::from("/tmp/in.mov")));
        assert_eq!(snapshot.output_path, Some(PathBuf::from("/tmp/out.mp4")));
    }

    #[test]
    fn test_video_ref_defaults() {
        let video = VideoRef::new("id-1", 1234);
        assert!(video.file_name.starts_with("video_"));
        assert!(video.file_name.ends_with(".mp4"));
        assert_eq!(video.mime_type, "video/mp4");

        let video = video
            .with_file_name("trip.mov")
            .with_mime_type("video/quicktime");
        assert_eq!(video.file_name, "trip.mov");
        assert_eq!(video.mime_type, "video/quicktime");
    }
}
