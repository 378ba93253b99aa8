//! Deduplication job lifecycle: registry, executor and orchestration.
//!
//! A job is created `PENDING` by the [`TaskOrchestrator`], moved to `RUNNING`
//! when its unit of work starts on the [`Executor`], and ends `SUCCESS` or
//! `FAILURE`. The [`JobRegistry`] is the only shared state; pollers read
//! immutable snapshots from it.

mod context;
mod error;
mod executor;
mod models;
mod orchestrator;
mod registry;

pub use context::JobContext;
pub use error::{RegistryError, SchedulingError, SubmitError};
pub use executor::{ExecutionHandle, Executor, TokioExecutor, UnitOfWork};
pub use models::{JobId, JobSnapshot, JobStatus};
pub use orchestrator::TaskOrchestrator;
pub use registry::JobRegistry;
