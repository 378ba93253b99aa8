//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own job registry and sessions,
//! backed by a scripted duplicate finder instead of the real detector.

use super::constants::*;
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use photos_dedup_server::dedup::{Credentials, DedupResult, DuplicateFinder, TaskOptions};
use photos_dedup_server::jobs::{Executor, JobContext, JobRegistry, TaskOrchestrator, TokioExecutor};
use photos_dedup_server::server::{server::make_app, RequestsLoggingLevel, ServerConfig};
use photos_dedup_server::session::{SessionBinder, SessionStore};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Finder answering with a fixed result once its gate is open.
///
/// Sessions logged in with `FAILING_ACCESS_TOKEN` get an error instead.
struct ScriptedFinder {
    gate: watch::Receiver<bool>,
}

fn scripted_result() -> DedupResult {
    let items = |filenames: &[&str]| -> Vec<JsonValue> {
        filenames
            .iter()
            .enumerate()
            .map(|(i, filename)| json!({"id": format!("item-{}", i), "filename": filename}))
            .collect()
    };
    serde_json::from_value(json!({
        "groups": [
            {"id": GROUP_1_ID, "media_items": items(&GROUP_1_FILENAMES)},
            {"id": GROUP_2_ID, "media_items": items(&GROUP_2_FILENAMES)},
        ]
    }))
    .expect("Scripted result must be a valid dedup result")
}

#[async_trait]
impl DuplicateFinder for ScriptedFinder {
    async fn find_duplicates(
        &self,
        ctx: &JobContext,
        credentials: &Credentials,
        _options: &TaskOptions,
    ) -> anyhow::Result<DedupResult> {
        ctx.report_progress("Scanning library");

        let mut gate = self.gate.clone();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        if !opened {
            return Err(anyhow!("Test server stopped"));
        }

        let access_token = credentials.0.get("access_token").and_then(JsonValue::as_str);
        if access_token == Some(FAILING_ACCESS_TOKEN) {
            bail!(FINDER_ERROR_MESSAGE);
        }
        Ok(scripted_result())
    }
}

/// Knobs for `TestServer::spawn_with`
pub struct TestServerOptions {
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    /// Keep jobs running until `TestServer::release_jobs` is called
    pub hold_jobs: bool,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            queue_capacity: 16,
            hold_jobs: false,
        }
    }
}

/// Test server instance with isolated state
///
/// When dropped, the server and its executor shut down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Registry for direct job inspection in tests
    pub job_registry: Arc<JobRegistry>,

    pub session_store: Arc<SessionStore>,

    // Private fields - keep resources alive until drop
    gate_tx: watch::Sender<bool>,
    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port with default options
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if port binding fails or the server doesn't become ready
    /// within timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let shutdown_token = CancellationToken::new();

        let job_registry = Arc::new(JobRegistry::new());
        let executor = Arc::new(TokioExecutor::start(
            options.max_concurrent_jobs,
            options.queue_capacity,
            shutdown_token.child_token(),
        ));
        let (gate_tx, gate_rx) = watch::channel(!options.hold_jobs);
        let orchestrator = Arc::new(TaskOrchestrator::new(
            job_registry.clone(),
            executor as Arc<dyn Executor>,
            Arc::new(ScriptedFinder { gate: gate_rx }),
        ));
        let session_store = Arc::new(SessionStore::new());
        let session_binder = Arc::new(SessionBinder::new());

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            metrics_port: 0,
            frontend_dir_path: None,
            session_ttl_hours: 1,
        };

        let app = make_app(config, orchestrator, session_store.clone(), session_binder);

        // Spawn server in background task with graceful shutdown
        let server_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            job_registry,
            session_store,
            gate_tx,
            shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Lets every held job, running or not started yet, finish
    pub fn release_jobs(&self) {
        let _ = self.gate_tx.send(true);
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
