//! Fakes shared by the pipeline and coordinator tests.

use crate::concurrency::EncodePoolPlan;
use crate::encode::{EncodeError, EncodeParams, Encoder};
use crate::job::{Job, JobSnapshot, JobStatus, UserId, VideoRef};
use crate::job_executor::{JobExecutor, JobExecutorConfig};
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::presets::{PresetCatalog, QualityPreset};
use crate::progress::{ProgressReporter, ReportError};
use crate::registry::JobRegistry;
use crate::scratch::ScratchSpace;
use crate::size_report::SizeReport;
use crate::transfer::{JobIo, TransferError, VideoFetcher, VideoSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use tempfile::TempDir;
use tokio::sync::{mpsc as async_mpsc, Notify};

/// Bytes every fake fetcher writes as the downloaded video
pub(crate) const SOURCE_BYTES: &[u8] = &[7u8; 4096];

fn write_scaled(
    input: &Path,
    output: &Path,
    num: usize,
    den: usize,
) -> Result<(), EncodeError> {
    let data = std::fs::read(input)?;
    let len = (data.len() * num / den).max(1);
    std::fs::write(output, vec![1u8; len])?;
    Ok(())
}

/// Encoder that writes `num/den` of the input size
pub(crate) struct ScalingEncoder {
    num: usize,
    den: usize,
    calls: AtomicUsize,
    params: Mutex<Vec<EncodeParams>>,
}

impl ScalingEncoder {
    pub(crate) fn new(num: usize, den: usize) -> Arc<Self> {
        Arc::new(Self {
            num,
            den,
            calls: AtomicUsize::new(0),
            params: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn halving() -> Arc<Self> {
        Self::new(1, 2)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn params(&self) -> Vec<EncodeParams> {
        self.params.lock().clone()
    }
}

impl Encoder for ScalingEncoder {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        params: &EncodeParams,
    ) -> Result<(), EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.params.lock().push(params.clone());
        write_scaled(input, output, self.num, self.den)
    }
}

/// Encoder that leaves a partial output behind and fails
#[derive(Default)]
pub(crate) struct FailingEncoder {
    calls: AtomicUsize,
}

impl FailingEncoder {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for FailingEncoder {
    fn encode(
        &self,
        _input: &Path,
        output: &Path,
        _params: &EncodeParams,
    ) -> Result<(), EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"partial")?;
        Err(EncodeError::Failed {
            code: 1,
            stderr: "Invalid data found when processing input".to_string(),
        })
    }
}

/// Encoder that reports success without writing anything
pub(crate) struct SilentEncoder;

impl Encoder for SilentEncoder {
    fn encode(
        &self,
        _input: &Path,
        _output: &Path,
        _params: &EncodeParams,
    ) -> Result<(), EncodeError> {
        Ok(())
    }
}

pub(crate) struct PanickingEncoder;

impl Encoder for PanickingEncoder {
    fn encode(
        &self,
        _input: &Path,
        _output: &Path,
        _params: &EncodeParams,
    ) -> Result<(), EncodeError> {
        panic!("encoder blew up");
    }
}

/// Encoder that signals when a call starts and blocks until released.
///
/// Each call consumes one release message, then halves the input.
pub(crate) struct GatedEncoder {
    started: async_mpsc::UnboundedSender<()>,
    release: Mutex<mpsc::Receiver<()>>,
    calls: AtomicUsize,
}

impl GatedEncoder {
    pub(crate) fn new() -> (Arc<Self>, async_mpsc::UnboundedReceiver<()>, mpsc::Sender<()>) {
        let (started_tx, started_rx) = async_mpsc::unbounded_channel();
        let (release_tx, release_rx) = mpsc::channel();
        let encoder = Arc::new(Self {
            started: started_tx,
            release: Mutex::new(release_rx),
            calls: AtomicUsize::new(0),
        });
        (encoder, started_rx, release_tx)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for GatedEncoder {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        _params: &EncodeParams,
    ) -> Result<(), EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.started.send(());
        // A dropped sender releases every waiting call
        let _ = self.release.lock().recv();
        write_scaled(input, output, 1, 2)
    }
}

/// Fetcher that writes [`SOURCE_BYTES`] immediately
#[derive(Default)]
pub(crate) struct StaticFetcher {
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoFetcher for StaticFetcher {
    async fn fetch(&self, _video: &VideoRef, dest: &Path) -> Result<(), TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, SOURCE_BYTES).await?;
        Ok(())
    }
}

/// Fetcher that writes the file, signals `started`, then waits for `release`
#[derive(Default)]
pub(crate) struct GatedFetcher {
    pub(crate) started: Notify,
    pub(crate) release: Notify,
}

#[async_trait]
impl VideoFetcher for GatedFetcher {
    async fn fetch(&self, _video: &VideoRef, dest: &Path) -> Result<(), TransferError> {
        tokio::fs::write(dest, SOURCE_BYTES).await?;
        self.started.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

pub(crate) struct FailingFetcher;

#[async_trait]
impl VideoFetcher for FailingFetcher {
    async fn fetch(&self, _video: &VideoRef, _dest: &Path) -> Result<(), TransferError> {
        Err(TransferError::Remote("file is temporarily unavailable".to_string()))
    }
}

/// Fetcher that never finishes
pub(crate) struct StallingFetcher;

#[async_trait]
impl VideoFetcher for StallingFetcher {
    async fn fetch(&self, _video: &VideoRef, dest: &Path) -> Result<(), TransferError> {
        tokio::fs::write(dest, b"partial download").await?;
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Fetcher that writes part of the file and then panics
pub(crate) struct PanickingFetcher;

#[async_trait]
impl VideoFetcher for PanickingFetcher {
    async fn fetch(&self, _video: &VideoRef, dest: &Path) -> Result<(), TransferError> {
        tokio::fs::write(dest, b"partial download").await?;
        panic!("fetcher blew up");
    }
}

/// A delivery captured by [`CollectingSink`]
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub(crate) user_id: UserId,
    pub(crate) path: PathBuf,
    pub(crate) bytes: Vec<u8>,
    pub(crate) report: SizeReport,
}

#[derive(Default)]
pub(crate) struct CollectingSink {
    fail: bool,
    deliveries: Mutex<Vec<Delivery>>,
}

impl CollectingSink {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }
}

#[async_trait]
impl VideoSink for CollectingSink {
    async fn deliver(
        &self,
        job: &JobSnapshot,
        output: &Path,
        report: &SizeReport,
    ) -> Result<(), TransferError> {
        if self.fail {
            return Err(TransferError::Remote("Request Entity Too Large".to_string()));
        }
        let bytes = tokio::fs::read(output).await?;
        self.deliveries.lock().push(Delivery {
            user_id: job.user_id,
            path: output.to_path_buf(),
            bytes,
            report: *report,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReportEvent {
    Stage(JobStatus),
    Terminal(JobStatus, Option<String>),
}

#[derive(Default)]
pub(crate) struct RecordingReporter {
    fail: bool,
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn stages(&self) -> Vec<JobStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Stage(stage) => Some(stage),
                ReportEvent::Terminal(..) => None,
            })
            .collect()
    }

    pub(crate) fn terminals(&self) -> Vec<(JobStatus, Option<String>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Terminal(status, detail) => Some((status, detail)),
                ReportEvent::Stage(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn on_stage(&self, _job: &JobSnapshot, stage: JobStatus) -> Result<(), ReportError> {
        self.events.lock().push(ReportEvent::Stage(stage));
        if self.fail {
            return Err(ReportError::new("Bad Request: message to edit not found"));
        }
        Ok(())
    }

    async fn on_terminal(
        &self,
        _job: &JobSnapshot,
        status: JobStatus,
        detail: Option<&str>,
    ) -> Result<(), ReportError> {
        self.events
            .lock()
            .push(ReportEvent::Terminal(status, detail.map(str::to_string)));
        if self.fail {
            return Err(ReportError::new("Forbidden: bot was blocked by the user"));
        }
        Ok(())
    }
}

/// Reporter whose stage reports never return; terminal reports are recorded
#[derive(Default)]
pub(crate) struct HangingReporter {
    terminals: Mutex<Vec<JobStatus>>,
}

impl HangingReporter {
    pub(crate) fn terminals(&self) -> Vec<JobStatus> {
        self.terminals.lock().clone()
    }
}

#[async_trait]
impl ProgressReporter for HangingReporter {
    async fn on_stage(&self, _job: &JobSnapshot, _stage: JobStatus) -> Result<(), ReportError> {
        std::future::pending().await
    }

    async fn on_terminal(
        &self,
        _job: &JobSnapshot,
        status: JobStatus,
        _detail: Option<&str>,
    ) -> Result<(), ReportError> {
        self.terminals.lock().push(status);
        Ok(())
    }
}

pub(crate) fn job_io(
    fetcher: Arc<dyn VideoFetcher>,
    sink: Arc<dyn VideoSink>,
    reporter: Arc<dyn ProgressReporter>,
) -> JobIo {
    JobIo::new(fetcher, sink, reporter)
}

/// Executor wired to a temporary scratch directory
pub(crate) struct Harness {
    pub(crate) _dir: TempDir,
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) scratch: Arc<ScratchSpace>,
    pub(crate) metrics: SharedMetrics,
    pub(crate) executor: Arc<JobExecutor>,
}

impl Harness {
    pub(crate) fn new(encoder: Arc<dyn Encoder>, workers: u32) -> Self {
        Self::with_config(encoder, workers, JobExecutorConfig::default())
    }

    pub(crate) fn with_config(
        encoder: Arc<dyn Encoder>,
        workers: u32,
        config: JobExecutorConfig,
    ) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let registry = Arc::new(JobRegistry::new());
        let scratch =
            Arc::new(ScratchSpace::new(dir.path().join("scratch")).expect("scratch dir"));
        let metrics = new_shared_metrics();
        let executor = Arc::new(
            JobExecutor::new(
                EncodePoolPlan::fixed(workers),
                encoder,
                Arc::new(PresetCatalog::default()),
                registry.clone(),
                scratch.clone(),
                metrics.clone(),
            )
            .with_config(config),
        );
        Self {
            _dir: dir,
            registry,
            scratch,
            metrics,
            executor,
        }
    }

    /// Register a fresh medium-preset job for `user`
    pub(crate) fn admit(&self, user: i64) -> Arc<Job> {
        let job = Arc::new(Job::new(
            UserId(user),
            VideoRef::new(format!("file-{}", user), SOURCE_BYTES.len() as u64)
                .with_file_name("clip.mov"),
            QualityPreset::Medium,
        ));
        self.registry.admit(job.clone()).expect("admit");
        job
    }
}
