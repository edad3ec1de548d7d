//! Entry point for front ends: admits submissions and routes cancellations.
//!
//! Admission is synchronous. Size and preset are validated before the
//! registry is touched, so a rejected submission leaves no job and no files.
//! Accepted jobs run on their own tokio task.

use crate::config::LimitsConfig;
use crate::job::{Job, JobSnapshot, UserId, VideoRef};
use crate::job_executor::{JobExecutor, JobOutcome};
use crate::preferences::{PreferenceStore, UserTier};
use crate::presets::{QualityPreset, UnknownPresetKey};
use crate::registry::{JobRegistry, RegistryError};
use crate::transfer::JobIo;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

/// Why a submission was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("user {0} already has a compression in progress")]
    AlreadyActive(UserId),

    #[error("file is too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("unknown quality preset '{0}'")]
    UnknownPreset(String),
}

impl From<UnknownPresetKey> for AdmissionError {
    fn from(e: UnknownPresetKey) -> Self {
        AdmissionError::UnknownPreset(e.0)
    }
}

/// Handle to an admitted job's pipeline task
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub user_id: UserId,
    pub preset: QualityPreset,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Wait for the pipeline to reach a terminal status.
    pub async fn wait(self) -> Result<JobOutcome, JoinError> {
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct Coordinator {
    registry: Arc<JobRegistry>,
    executor: Arc<JobExecutor>,
    preferences: Arc<dyn PreferenceStore>,
    limits: LimitsConfig,
}

impl Coordinator {
    pub fn new(
        registry: Arc<JobRegistry>,
        executor: Arc<JobExecutor>,
        preferences: Arc<dyn PreferenceStore>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            preferences,
            limits,
        }
    }

    /// Admit a job and start its pipeline.
    ///
    /// `preset_key` falls back to the user's stored default, then to medium.
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        user_id: UserId,
        video: VideoRef,
        preset_key: Option<&str>,
        size_limit: u64,
        io: JobIo,
    ) -> Result<JobHandle, AdmissionError> {
        if video.size_bytes > size_limit {
            debug!(%user_id, size = video.size_bytes, limit = size_limit, "submission too large");
            return Err(AdmissionError::TooLarge {
                size: video.size_bytes,
                limit: size_limit,
            });
        }

        let preset = match preset_key {
            Some(key) => key.parse::<QualityPreset>()?,
            None => self.default_preset(user_id),
        };

        let job = Arc::new(Job::new(user_id, video, preset));
        self.registry.admit(job.clone()).map_err(|e| match e {
            RegistryError::AlreadyActive(user) | RegistryError::NotFound(user) => {
                AdmissionError::AlreadyActive(user)
            }
        })?;

        info!(%user_id, job_id = %job.id, %preset, "job admitted");
        let job_id = job.id;
        let executor = Arc::clone(&self.executor);
        let task = tokio::spawn(async move { executor.run(job, io).await });

        Ok(JobHandle {
            job_id,
            user_id,
            preset,
            task,
        })
    }

    /// [`Coordinator::submit`] with the limit for the user's stored tier.
    pub fn submit_for_user(
        &self,
        user_id: UserId,
        video: VideoRef,
        preset_key: Option<&str>,
        io: JobIo,
    ) -> Result<JobHandle, AdmissionError> {
        let limit = self.size_limit_for_user(user_id);
        self.submit(user_id, video, preset_key, limit, io)
    }

    /// Ask the user's active job to stop at its next stage boundary.
    pub fn cancel(&self, user_id: UserId) -> Result<(), RegistryError> {
        self.registry.request_cancel(user_id)?;
        info!(%user_id, "cancellation requested");
        Ok(())
    }

    pub fn status(&self, user_id: UserId) -> Result<JobSnapshot, RegistryError> {
        self.registry.get(user_id)
    }

    pub fn size_limit(&self, tier: UserTier) -> u64 {
        match tier {
            UserTier::Regular => self.limits.regular_max_bytes,
            UserTier::Premium => self.limits.premium_max_bytes,
        }
    }

    pub fn size_limit_for_user(&self, user_id: UserId) -> u64 {
        self.size_limit(self.preferences.get(user_id).tier)
    }

    pub fn set_default_preset(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<QualityPreset, UnknownPresetKey> {
        let preset = key.parse::<QualityPreset>()?;
        self.preferences.set_default_preset(user_id, preset);
        Ok(preset)
    }

    pub fn default_preset(&self, user_id: UserId) -> QualityPreset {
        self.preferences
            .get(user_id)
            .default_preset
            .unwrap_or_default()
    }

    pub fn set_tier(&self, user_id: UserId, tier: UserTier) {
        self.preferences.set_tier(user_id, tier);
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }
}
