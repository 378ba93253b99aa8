//! In-memory registry of deduplication jobs.
//!
//! The registry is the only state shared between request handlers (which
//! create and poll jobs) and executor workers (which move them forward).
//! Every mutation happens under a single write lock acquisition, so a reader
//! never sees a status without the data that goes with it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use super::error::RegistryError;
use super::models::{JobId, JobSnapshot, JobStatus};
use crate::dedup::DedupResult;

struct JobEntry {
    status: JobStatus,
    progress_info: Option<JsonValue>,
    result: Option<Arc<DedupResult>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobEntry {
    fn snapshot(&self, id: &JobId) -> JobSnapshot {
        JobSnapshot {
            id: id.clone(),
            status: self.status,
            progress_info: self.progress_info.clone(),
            result: self.result.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Checks that `to` is reachable from the current status: statuses only move forward.
    fn check_transition(&self, id: &JobId, to: JobStatus) -> Result<(), RegistryError> {
        if self.status.is_terminal() {
            return Err(RegistryError::AlreadyTerminal {
                id: id.clone(),
                status: self.status,
            });
        }
        if to < self.status {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a new job in `Pending` status.
    pub fn create(&self) -> JobId {
        let now = Utc::now();
        let mut jobs = self.write();
        let mut id = JobId::generate();
        while jobs.contains_key(&id) {
            id = JobId::generate();
        }
        jobs.insert(
            id.clone(),
            JobEntry {
                status: JobStatus::Pending,
                progress_info: None,
                result: None,
                created_at: now,
                updated_at: now,
            },
        );
        debug!("Created job {}", id);
        id
    }

    /// Move a job forward to a non terminal status and replace its progress info.
    pub fn update(
        &self,
        id: &JobId,
        status: JobStatus,
        progress_info: Option<JsonValue>,
    ) -> Result<(), RegistryError> {
        if status.is_terminal() {
            warn!("Rejected update of job {} to {}", id, status);
            return Err(RegistryError::TerminalStatusViaUpdate(status));
        }
        self.apply(id, status, |entry| {
            entry.progress_info = progress_info;
        })
    }

    /// Mark a job as successful and store its result.
    pub fn complete(&self, id: &JobId, result: DedupResult) -> Result<(), RegistryError> {
        let groups = result.groups.len();
        self.apply(id, JobStatus::Success, |entry| {
            entry.progress_info = None;
            entry.result = Some(Arc::new(result));
        })?;
        info!("Job {} completed with {} duplicate groups", id, groups);
        Ok(())
    }

    /// Mark a job as failed, keeping `error_info` as its progress info.
    pub fn fail(&self, id: &JobId, error_info: JsonValue) -> Result<(), RegistryError> {
        self.apply(id, JobStatus::Failure, |entry| {
            entry.progress_info = Some(error_info);
        })?;
        info!("Job {} failed", id);
        Ok(())
    }

    fn apply(
        &self,
        id: &JobId,
        status: JobStatus,
        mutate: impl FnOnce(&mut JobEntry),
    ) -> Result<(), RegistryError> {
        let mut jobs = self.write();
        let entry = match jobs.get_mut(id) {
            Some(entry) => entry,
            None => {
                warn!("Dropping {} signal for unknown job {}", status, id);
                return Err(RegistryError::NotFound(id.clone()));
            }
        };
        if let Err(e) = entry.check_transition(id, status) {
            warn!("Dropping {} signal: {}", status, e);
            return Err(e);
        }
        entry.status = status;
        mutate(entry);
        entry.updated_at = Utc::now();
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Option<JobSnapshot> {
        self.read().get(id).map(|entry| entry.snapshot(id))
    }

    /// True if the job exists and has not reached a terminal status.
    pub fn is_active(&self, id: &JobId) -> bool {
        self.read()
            .get(id)
            .map(|entry| !entry.status.is_terminal())
            .unwrap_or(false)
    }

    /// Remove finished jobs whose last update is older than `retention`.
    ///
    /// Returns the number of removed jobs. Jobs still pending or running are kept.
    pub fn prune_finished(&self, retention: ChronoDuration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, entry| !entry.status.is_terminal() || entry.updated_at >= cutoff);
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
