//! Photos dedup server library
//!
//! Runs Google Photos deduplication jobs in the background and lets each
//! session poll the job it started. Modules are exposed for the binary and
//! the end-to-end tests.

pub mod config;
pub mod dedup;
pub mod jobs;
pub mod maintenance;
pub mod server;
pub mod session;

// Re-export commonly used types for convenience
pub use dedup::{DuplicateFinder, HttpDuplicateFinder};
pub use jobs::{JobRegistry, TaskOrchestrator, TokioExecutor};
pub use server::{run_server, RequestsLoggingLevel};
pub use session::{SessionBinder, SessionStore};
