//! Video Compressor
//!
//! Per-user video compression jobs: admission with single-flight per user,
//! a download / encode / upload pipeline with cooperative cancellation, a
//! bounded encode pool, and cleanup of scratch files on every exit path.

pub mod concurrency;
pub mod coordinator;
pub mod daemon;
pub mod encode;
pub mod job;
pub mod job_executor;
pub mod metrics;
pub mod metrics_server;
pub mod preferences;
pub mod presets;
pub mod progress;
pub mod registry;
pub mod scratch;
pub mod size_report;
pub mod startup;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use video_compressor_config as config;
pub use video_compressor_config::Config;
pub use concurrency::{derive_plan, EncodePoolPlan};
pub use coordinator::{AdmissionError, Coordinator, JobHandle};
pub use daemon::{Daemon, DaemonError};
pub use encode::{build_ffmpeg_command, EncodeError, EncodeParams, Encoder, FfmpegEncoder};
pub use job::{Job, JobSnapshot, JobStatus, UserId, VideoRef};
pub use job_executor::{JobExecutor, JobExecutorConfig, JobOutcome, PipelineError};
pub use metrics::{new_shared_metrics, JobMetrics, MetricsSnapshot, SharedMetrics};
pub use metrics_server::{create_metrics_router, run_metrics_server, ServerError};
pub use preferences::{InMemoryPreferences, PreferenceStore, UserPreferences, UserTier};
pub use presets::{PresetCatalog, QualityPreset, UnknownPresetKey};
pub use progress::{NoopReporter, ProgressReporter, ReportError};
pub use registry::{JobRegistry, RegistryError};
pub use scratch::{CleanupReport, CleanupWarning, FileRole, ScratchSpace};
pub use size_report::{format_megabytes, SizeReport};
pub use startup::{
    check_encoders_available, check_ffmpeg_available, has_encoder, parse_ffmpeg_version,
    run_startup_checks, StartupError,
};
pub use transfer::{DirectorySink, JobIo, LocalFileFetcher, TransferError, VideoFetcher, VideoSink};
