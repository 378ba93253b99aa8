//! Sessions and the job each of them follows.

mod binder;
mod store;

pub use binder::{BindError, SessionBinder, SubmissionClaim};
pub use store::{SessionStore, SessionToken};
