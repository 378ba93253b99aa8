//! Turns a submission into a job running on the executor.

use futures::FutureExt;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};

use super::context::JobContext;
use super::error::{SchedulingError, SubmitError};
use super::executor::Executor;
use super::models::{JobId, JobStatus};
use super::registry::JobRegistry;
use crate::dedup::{Credentials, DuplicateFinder, TaskOptions};
use crate::server::metrics;

pub struct TaskOrchestrator {
    registry: Arc<JobRegistry>,
    executor: Arc<dyn Executor>,
    finder: Arc<dyn DuplicateFinder>,
}

impl TaskOrchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        executor: Arc<dyn Executor>,
        finder: Arc<dyn DuplicateFinder>,
    ) -> Self {
        Self {
            registry,
            executor,
            finder,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Create a job and hand its unit of work to the executor.
    ///
    /// Returns as soon as the work is scheduled. If the executor refuses it,
    /// the job is marked as failed before the error is returned.
    pub fn submit(
        &self,
        credentials: Credentials,
        options: TaskOptions,
    ) -> Result<JobId, SubmitError> {
        let job_id = self.registry.create();
        info!(
            "Submitting job {} (refresh_media_items: {})",
            job_id, options.refresh_media_items
        );

        let handoff = Arc::new(Mutex::new(Handoff::InProgress));
        let guard = JobGuard::new(
            JobContext::new(job_id.clone(), self.registry.clone()),
            handoff.clone(),
        );
        let work = run_job(guard, self.finder.clone(), credentials, options).boxed();

        let scheduled = self.executor.schedule(work);
        let dropped_during_handoff = {
            let mut state = handoff.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, Handoff::Done) == Handoff::DroppedUnstarted
        };

        match scheduled {
            Ok(_handle) => {
                metrics::record_job_submitted();
                if dropped_during_handoff && self.registry.is_active(&job_id) {
                    warn!("Job {} dropped before starting", job_id);
                    let _ = self
                        .registry
                        .fail(&job_id, JsonValue::String(INTERRUPTED_MESSAGE.to_string()));
                }
                Ok(job_id)
            }
            Err(source) => {
                error!("Could not schedule job {}: {}", job_id, source);
                metrics::record_scheduling_failure(scheduling_failure_reason(&source));
                if self.registry.is_active(&job_id) {
                    let _ = self.registry.fail(
                        &job_id,
                        JsonValue::String(format!("Could not schedule job: {}", source)),
                    );
                }
                Err(SubmitError::Scheduling { job_id, source })
            }
        }
    }
}

const INTERRUPTED_MESSAGE: &str = "Job was interrupted before finishing";

/// Whether `submit` is still waiting on the executor for a given work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handoff {
    InProgress,
    /// The work was dropped unstarted while `submit` was still scheduling it.
    DroppedUnstarted,
    Done,
}

fn scheduling_failure_reason(e: &SchedulingError) -> &'static str {
    match e {
        SchedulingError::QueueFull => "queue_full",
        SchedulingError::ExecutorUnavailable => "executor_unavailable",
    }
}

/// Fails its job when dropped while still armed.
///
/// Travels inside the unit of work, so a work that is dropped before running
/// or while running (executor shutdown, rejected scheduling) cannot leave its
/// job pending or running forever. An unstarted work dropped while `submit`
/// is still scheduling it leaves the failure to `submit`, which knows why the
/// executor let go of it.
struct JobGuard {
    ctx: JobContext,
    handoff: Arc<Mutex<Handoff>>,
    started_at: Option<Instant>,
    armed: bool,
}

impl JobGuard {
    fn new(ctx: JobContext, handoff: Arc<Mutex<Handoff>>) -> Self {
        Self {
            ctx,
            handoff,
            started_at: None,
            armed: true,
        }
    }

    fn start(&mut self) {
        self.ctx.mark_running();
        self.started_at = Some(Instant::now());
        metrics::record_job_started();
        info!("Job {} started", self.ctx.job_id());
    }

    fn finish(mut self, status: JobStatus) {
        self.armed = false;
        if let Some(started_at) = self.started_at {
            metrics::record_job_finished(status, started_at.elapsed());
        }
    }

    /// Hand the failure over to `submit` if it is still scheduling this work.
    fn defer_to_submit(&self) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        let mut state = self.handoff.lock().unwrap_or_else(|e| e.into_inner());
        if *state == Handoff::InProgress {
            *state = Handoff::DroppedUnstarted;
            true
        } else {
            false
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.armed || self.defer_to_submit() {
            return;
        }
        warn!("Job {} dropped before finishing", self.ctx.job_id());
        let _ = self.ctx.fail(INTERRUPTED_MESSAGE);
        if let Some(started_at) = self.started_at {
            metrics::record_job_finished(JobStatus::Failure, started_at.elapsed());
        }
    }
}

async fn run_job(
    mut guard: JobGuard,
    finder: Arc<dyn DuplicateFinder>,
    credentials: Credentials,
    options: TaskOptions,
) {
    guard.start();
    let ctx = guard.ctx.clone();

    let outcome = AssertUnwindSafe(finder.find_duplicates(&ctx, &credentials, &options))
        .catch_unwind()
        .await;

    let recorded = match outcome {
        Ok(Ok(result)) => ctx.complete(result),
        Ok(Err(e)) => {
            error!("Job {} failed: {:#}", ctx.job_id(), e);
            ctx.fail(format!("{:#}", e))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Job {} panicked: {}", ctx.job_id(), message);
            ctx.fail(format!("Job panicked: {}", message))
        }
    };
    if let Err(e) = recorded {
        warn!("Outcome of job {} was not recorded: {}", ctx.job_id(), e);
    }

    let status = ctx.status().unwrap_or(JobStatus::Failure);
    guard.finish(status);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
