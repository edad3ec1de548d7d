//! Daemon assembly for the video compressor
//!
//! Builds every runtime component from a [`Config`]: scratch space, registry,
//! encode pool, executor and coordinator, plus the optional metrics server.

use crate::concurrency::{derive_plan, EncodePoolPlan};
use crate::config::{Config, ConfigError};
use crate::coordinator::Coordinator;
use crate::encode::{Encoder, FfmpegEncoder};
use crate::job_executor::{JobExecutor, JobExecutorConfig};
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::metrics_server::run_metrics_server;
use crate::preferences::{InMemoryPreferences, PreferenceStore};
use crate::presets::PresetCatalog;
use crate::registry::JobRegistry;
use crate::scratch::ScratchSpace;
use crate::startup::{run_startup_checks, StartupError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Scratch directory could not be created
    #[error("Scratch directory error: {0}")]
    Scratch(std::io::Error),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Derived encode pool size
    pub pool_plan: EncodePoolPlan,
    /// Shared metrics state
    pub metrics: SharedMetrics,
    /// Each user's current job
    pub registry: Arc<JobRegistry>,
    /// Front-end entry point
    pub coordinator: Arc<Coordinator>,
}

impl Daemon {
    /// Initialize the daemon with configuration from file
    ///
    /// Loads the file, applies environment overrides, validates, runs the
    /// ffmpeg preflight checks and builds the components.
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, DaemonError> {
        let config = Config::load(config_path)?;
        Self::from_config(config)
    }

    /// Initialize the daemon with an existing configuration, running checks
    pub fn from_config(config: Config) -> Result<Self, DaemonError> {
        config.validate()?;
        run_startup_checks(&config)?;
        Self::new_without_checks(config)
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Useful for testing when ffmpeg is not available.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let encoder = Arc::new(FfmpegEncoder::new(&config.encoder));
        Self::with_encoder(config, encoder, Arc::new(InMemoryPreferences::new()))
    }

    /// Build the components around a custom encoder and preference store
    pub fn with_encoder(
        config: Config,
        encoder: Arc<dyn Encoder>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Result<Self, DaemonError> {
        config.validate()?;

        let pool_plan = derive_plan(&config);
        let metrics = new_shared_metrics();
        let registry = Arc::new(JobRegistry::new());
        let scratch = Arc::new(
            ScratchSpace::new(&config.jobs.scratch_dir).map_err(DaemonError::Scratch)?,
        );
        let presets = Arc::new(PresetCatalog::new(config.presets.clone()));

        let executor = Arc::new(
            JobExecutor::new(
                pool_plan.clone(),
                encoder,
                presets,
                registry.clone(),
                scratch,
                metrics.clone(),
            )
            .with_config(JobExecutorConfig::from_jobs_config(&config.jobs)),
        );

        let coordinator = Arc::new(Coordinator::new(
            registry.clone(),
            executor,
            preferences,
            config.limits.clone(),
        ));

        info!(
            encode_workers = pool_plan.encode_workers,
            total_cores = pool_plan.total_cores,
            scratch_dir = %config.jobs.scratch_dir.display(),
            "daemon initialized"
        );

        Ok(Self {
            config,
            pool_plan,
            metrics,
            registry,
            coordinator,
        })
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    /// Start the metrics HTTP server if it is enabled
    ///
    /// Spawns the server as a background task.
    pub fn start_metrics_server(&self) -> Option<JoinHandle<()>> {
        if !self.config.metrics.enabled {
            return None;
        }

        let metrics = self.metrics.clone();
        let bind = self.config.metrics.bind.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics, &bind).await {
                error!(error = %e, "metrics server stopped");
            }
        }))
    }
}
