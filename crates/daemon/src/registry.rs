//! Registry of each user's current job.
//!
//! Every read and write goes through one mutex around the map, so admission,
//! cancellation and removal are atomic with respect to each other. The lock
//! is never held across an await point.

use crate::job::{Job, JobSnapshot, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Error type for registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The user already has a job that has not reached a terminal status
    #[error("user {0} already has an active job")]
    AlreadyActive(UserId),

    /// The user has no active job
    #[error("no active job for user {0}")]
    NotFound(UserId),
}

/// Shared mapping from user to that user's current job
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<UserId, Arc<Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` under its user.
    ///
    /// Fails without touching the map if the user already has a non-terminal
    /// job. A terminal entry whose cleanup has not finished yet is replaced.
    pub fn admit(&self, job: Arc<Job>) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.get(&job.user_id) {
            if !existing.is_terminal() {
                return Err(RegistryError::AlreadyActive(job.user_id));
            }
        }
        jobs.insert(job.user_id, job);
        Ok(())
    }

    /// Snapshot of the user's current job.
    pub fn get(&self, user_id: UserId) -> Result<JobSnapshot, RegistryError> {
        self.jobs
            .lock()
            .get(&user_id)
            .map(|job| job.snapshot())
            .ok_or(RegistryError::NotFound(user_id))
    }

    /// Flag the user's job for cancellation without waiting for it to stop.
    pub fn request_cancel(&self, user_id: UserId) -> Result<(), RegistryError> {
        let jobs = self.jobs.lock();
        match jobs.get(&user_id) {
            Some(job) if !job.is_terminal() => {
                job.request_cancel();
                Ok(())
            }
            _ => Err(RegistryError::NotFound(user_id)),
        }
    }

    /// Delete the user's entry. Removing an absent key is a no-op.
    pub fn remove(&self, user_id: UserId) {
        self.jobs.lock().remove(&user_id);
    }

    /// Delete the user's entry only if it still belongs to `job_id`.
    ///
    /// Returns whether an entry was removed.
    pub fn release(&self, user_id: UserId, job_id: Uuid) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get(&user_id) {
            Some(job) if job.id == job_id => {
                jobs.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Number of jobs currently registered
    pub fn active_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Snapshots of all registered jobs, ordered by user
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> =
            self.jobs.lock().values().map(|job| job.snapshot()).collect();
        snapshots.sort_by_key(|s| s.user_id);
        snapshots
    }
}
