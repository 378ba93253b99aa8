use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

use super::error::RegistryError;
use super::models::{JobId, JobStatus};
use super::registry::JobRegistry;
use crate::dedup::DedupResult;

/// Context provided to the unit of work while it runs.
///
/// Scoped to a single job: the unit of work can only move its own job
/// forward. Rejected updates are logged by the registry and dropped here,
/// the unit of work never has to handle them.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    registry: Arc<JobRegistry>,
}

impl JobContext {
    pub fn new(job_id: JobId, registry: Arc<JobRegistry>) -> Self {
        Self { job_id, registry }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Replace the job's progress info, moving it to `Running` if needed.
    pub fn report_progress(&self, progress_info: impl Into<JsonValue>) {
        let progress_info = progress_info.into();
        debug!("Job {} progress: {}", self.job_id, progress_info);
        let _ = self
            .registry
            .update(&self.job_id, JobStatus::Running, Some(progress_info));
    }

    pub(super) fn mark_running(&self) {
        let _ = self.registry.update(&self.job_id, JobStatus::Running, None);
    }

    pub(super) fn complete(&self, result: DedupResult) -> Result<(), RegistryError> {
        self.registry.complete(&self.job_id, result)
    }

    pub(super) fn fail(&self, error_info: impl Into<JsonValue>) -> Result<(), RegistryError> {
        self.registry.fail(&self.job_id, error_info.into())
    }

    pub(super) fn status(&self) -> Option<JobStatus> {
        self.registry.get(&self.job_id).map(|snapshot| snapshot.status)
    }
}
