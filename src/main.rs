use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use photos_dedup_server::config;
use photos_dedup_server::dedup::{DuplicateFinder, HttpDuplicateFinder};
use photos_dedup_server::jobs::{Executor, JobRegistry, TaskOrchestrator, TokioExecutor};
use photos_dedup_server::maintenance::Maintenance;
use photos_dedup_server::server::{metrics, run_server, RequestsLoggingLevel};
use photos_dedup_server::session::{SessionBinder, SessionStore};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// URL of the duplicate detector service.
    #[clap(long)]
    pub detector_url: Option<String>,

    /// Timeout in seconds for a single detector request. Scanning a large
    /// library can take a long time.
    #[clap(long, default_value_t = 3600)]
    pub detector_timeout_sec: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            detector_url: args.detector_url.clone(),
            detector_timeout_sec: args.detector_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  port: {}", app_config.port);
    info!("  metrics_port: {}", app_config.metrics_port);
    info!("  logging_level: {}", app_config.logging_level);
    info!("  detector_url: {}", app_config.detector_url);
    info!(
        "  jobs: {} concurrent, queue capacity {}, retained {}h",
        app_config.jobs.max_concurrent_jobs,
        app_config.jobs.queue_capacity,
        app_config.jobs.job_retention_hours
    );
    info!(
        "  session_ttl_hours: {}",
        app_config.sessions.session_ttl_hours
    );

    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown_token = CancellationToken::new();

    let job_registry = Arc::new(JobRegistry::new());
    let executor = Arc::new(TokioExecutor::start(
        app_config.jobs.max_concurrent_jobs,
        app_config.jobs.queue_capacity,
        shutdown_token.child_token(),
    ));
    let finder: Arc<dyn DuplicateFinder> = Arc::new(HttpDuplicateFinder::new(
        app_config.detector_url.clone(),
        app_config.detector_timeout_sec,
    )?);
    let orchestrator = Arc::new(TaskOrchestrator::new(
        job_registry.clone(),
        executor.clone() as Arc<dyn Executor>,
        finder,
    ));

    let session_store = Arc::new(SessionStore::new());
    let session_binder = Arc::new(SessionBinder::new());

    let maintenance = Maintenance {
        job_registry,
        session_store: session_store.clone(),
        session_binder: session_binder.clone(),
        job_retention: app_config.jobs.job_retention(),
        session_ttl: app_config.sessions.session_ttl(),
    };
    let maintenance_task = tokio::spawn(
        maintenance.run(app_config.jobs.prune_interval(), shutdown_token.child_token()),
    );
    info!(
        "Pruning finished jobs and expired sessions every {} minutes",
        app_config.jobs.prune_interval_minutes
    );

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    let result = tokio::select! {
        result = run_server(
            app_config.server_config(),
            orchestrator,
            session_store,
            session_binder,
            shutdown_token.clone(),
        ) => {
            if let Err(e) = &result {
                error!("Server stopped: {:#}", e);
            }
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    shutdown_token.cancel();
    executor.shutdown().await;
    if let Err(e) = maintenance_task.await {
        error!("Maintenance task failed: {}", e);
    }
    info!("Shutdown complete");

    result
}
