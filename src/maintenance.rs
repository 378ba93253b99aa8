//! Periodic pruning of finished jobs and stale sessions.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::jobs::JobRegistry;
use crate::server::metrics;
use crate::session::{SessionBinder, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneReport {
    pub jobs: usize,
    pub sessions: usize,
}

pub struct Maintenance {
    pub job_registry: Arc<JobRegistry>,
    pub session_store: Arc<SessionStore>,
    pub session_binder: Arc<SessionBinder>,
    pub job_retention: ChronoDuration,
    pub session_ttl: ChronoDuration,
}

impl Maintenance {
    pub fn prune_once(&self) -> PruneReport {
        let jobs = self.job_registry.prune_finished(self.job_retention);

        let expired = self.session_store.prune_expired(self.session_ttl);
        for token in &expired {
            self.session_binder.clear(token);
        }
        metrics::set_active_sessions(self.session_store.len());

        let report = PruneReport {
            jobs,
            sessions: expired.len(),
        };
        if report != PruneReport::default() {
            info!(
                "Pruned {} finished jobs and {} expired sessions",
                report.jobs, report.sessions
            );
        }
        report
    }

    /// Prune every `interval` until `shutdown_token` is cancelled.
    pub async fn run(self, interval: Duration, shutdown_token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!("Maintenance stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.prune_once();
                }
            }
        }
    }
}
