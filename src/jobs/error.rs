use thiserror::Error;

use super::models::{JobId, JobStatus};

/// Rejections of state changes by the job registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} is already {status}, update ignored")]
    AlreadyTerminal { id: JobId, status: JobStatus },

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Terminal status {0} must be set through complete or fail")]
    TerminalStatusViaUpdate(JobStatus),
}

/// The executor could not take the unit of work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("Job queue is full")]
    QueueFull,

    #[error("Executor is not available")]
    ExecutorUnavailable,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Unrecognized task option: {0}")]
    UnrecognizedOption(String),

    #[error("Could not schedule job {job_id}: {source}")]
    Scheduling {
        job_id: JobId,
        #[source]
        source: SchedulingError,
    },
}
