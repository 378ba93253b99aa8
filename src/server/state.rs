use std::sync::Arc;
use std::time::Instant;

use crate::jobs::{JobRegistry, TaskOrchestrator};
use crate::session::{SessionBinder, SessionStore};

use super::ServerConfig;

pub type GuardedOrchestrator = Arc<TaskOrchestrator>;
pub type GuardedJobRegistry = Arc<JobRegistry>;
pub type GuardedSessionStore = Arc<SessionStore>;
pub type GuardedSessionBinder = Arc<SessionBinder>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub orchestrator: GuardedOrchestrator,
    pub job_registry: GuardedJobRegistry,
    pub session_store: GuardedSessionStore,
    pub session_binder: GuardedSessionBinder,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        orchestrator: GuardedOrchestrator,
        session_store: GuardedSessionStore,
        session_binder: GuardedSessionBinder,
    ) -> Self {
        let job_registry = orchestrator.registry().clone();
        ServerState {
            config,
            start_time: Instant::now(),
            orchestrator,
            job_registry,
            session_store,
            session_binder,
        }
    }
}
