//! Which job each session is following.
//!
//! `bind_active_job` simply overwrites. Exclusive submission goes through
//! [`SessionBinder::try_claim_submission`]: the claim is checked and taken
//! under the same write lock, so two concurrent submissions from one session
//! cannot both start a job.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, warn};

use super::store::SessionToken;
use crate::jobs::{JobId, JobRegistry};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("Another submission is in progress for this session")]
    SubmissionInProgress,

    #[error("Job {0} is still active")]
    JobStillActive(JobId),
}

#[derive(Debug, Default)]
struct Binding {
    active_job: Option<JobId>,
    submitting: bool,
}

#[derive(Default)]
pub struct SessionBinder {
    bindings: RwLock<HashMap<SessionToken, Binding>>,
}

impl SessionBinder {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionToken, Binding>> {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionToken, Binding>> {
        self.bindings.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `job_id` as the session's active job, replacing any previous one.
    pub fn bind_active_job(&self, session: &SessionToken, job_id: JobId) {
        let mut bindings = self.write();
        let binding = bindings.entry(session.clone()).or_default();
        if let Some(previous) = binding.active_job.replace(job_id.clone()) {
            debug!(
                "Session {} now follows job {} instead of {}",
                session, job_id, previous
            );
        }
    }

    pub fn get_active_job(&self, session: &SessionToken) -> Option<JobId> {
        self.read()
            .get(session)
            .and_then(|binding| binding.active_job.clone())
    }

    pub fn has_active_job(&self, session: &SessionToken) -> bool {
        self.get_active_job(session).is_some()
    }

    /// Forget the session's job. An in-flight submission claim stays valid.
    pub fn clear(&self, session: &SessionToken) {
        let mut bindings = self.write();
        if let Some(binding) = bindings.get_mut(session) {
            binding.active_job = None;
            if !binding.submitting {
                bindings.remove(session);
            }
        }
    }

    /// Reserve the right to submit a job for `session`.
    ///
    /// Refused while another claim is held for the session, or while the bound
    /// job is still pending or running in `registry`. A bound job that is
    /// finished or unknown to the registry does not block a new submission.
    pub fn try_claim_submission<'a>(
        &'a self,
        session: &SessionToken,
        registry: &JobRegistry,
    ) -> Result<SubmissionClaim<'a>, BindError> {
        let mut bindings = self.write();
        let binding = bindings.entry(session.clone()).or_default();
        if binding.submitting {
            warn!("Session {} is already submitting a job", session);
            return Err(BindError::SubmissionInProgress);
        }
        if let Some(job_id) = &binding.active_job {
            if registry.is_active(job_id) {
                return Err(BindError::JobStillActive(job_id.clone()));
            }
        }
        binding.submitting = true;
        Ok(SubmissionClaim {
            binder: self,
            session: session.clone(),
            released: false,
        })
    }

    fn release_claim(&self, session: &SessionToken, job_id: Option<JobId>) {
        let mut bindings = self.write();
        let binding = bindings.entry(session.clone()).or_default();
        binding.submitting = false;
        if let Some(job_id) = job_id {
            binding.active_job = Some(job_id);
        } else if binding.active_job.is_none() {
            bindings.remove(session);
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Exclusive right to submit a job for one session.
///
/// Consumed by [`SubmissionClaim::bind`] once the job exists; dropping it
/// releases the claim and leaves the previous binding in place.
pub struct SubmissionClaim<'a> {
    binder: &'a SessionBinder,
    session: SessionToken,
    released: bool,
}

impl SubmissionClaim<'_> {
    pub fn bind(mut self, job_id: JobId) {
        self.binder.release_claim(&self.session, Some(job_id));
        self.released = true;
    }
}

impl Drop for SubmissionClaim<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.binder.release_claim(&self.session, None);
        }
    }
}
