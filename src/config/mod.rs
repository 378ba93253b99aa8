mod file_config;

pub use file_config::{FileConfig, JobsConfig, SessionsConfig};

use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::time::Duration;

/// Settings of the job executor and registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsSettings {
    /// Maximum number of deduplication jobs running at the same time
    pub max_concurrent_jobs: usize,
    /// Maximum number of jobs waiting for a free slot
    pub queue_capacity: usize,
    /// Finished jobs are forgotten this long after their last update
    pub job_retention_hours: u64,
    pub prune_interval_minutes: u64,
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            queue_capacity: 64,
            job_retention_hours: 24,
            prune_interval_minutes: 10,
        }
    }
}

/// Upper bound for the hour settings, one hundred years.
pub const MAX_HOURS: u64 = 100 * 365 * 24;

fn chrono_hours(hours: u64) -> chrono::Duration {
    i64::try_from(hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .unwrap_or(chrono::Duration::MAX)
}

impl JobsSettings {
    pub fn job_retention(&self) -> chrono::Duration {
        chrono_hours(self.job_retention_hours)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_minutes * 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionsSettings {
    /// Sessions not used for this long are dropped
    pub session_ttl_hours: u64,
}

impl Default for SessionsSettings {
    fn default() -> Self {
        Self {
            session_ttl_hours: 168,
        }
    }
}

impl SessionsSettings {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono_hours(self.session_ttl_hours)
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub detector_url: Option<String>,
    pub detector_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub detector_url: String,
    pub detector_timeout_sec: u64,

    // Feature configs (with defaults)
    pub jobs: JobsSettings,
    pub sessions: SessionsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port && port != 0 {
            bail!("port and metrics_port must differ, both are {}", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let detector_url = file
            .detector_url
            .or_else(|| cli.detector_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "detector_url must be specified via --detector-url or in config file"
                )
            })?;
        if !detector_url.starts_with("http://") && !detector_url.starts_with("https://") {
            bail!(
                "detector_url must start with http:// or https://, got {}",
                detector_url
            );
        }

        let detector_timeout_sec = file
            .detector_timeout_sec
            .unwrap_or(cli.detector_timeout_sec);

        let jobs_file = file.jobs.unwrap_or_default();
        let jobs_defaults = JobsSettings::default();
        let jobs = JobsSettings {
            max_concurrent_jobs: jobs_file
                .max_concurrent_jobs
                .unwrap_or(jobs_defaults.max_concurrent_jobs),
            queue_capacity: jobs_file
                .queue_capacity
                .unwrap_or(jobs_defaults.queue_capacity),
            job_retention_hours: jobs_file
                .job_retention_hours
                .unwrap_or(jobs_defaults.job_retention_hours),
            prune_interval_minutes: jobs_file
                .prune_interval_minutes
                .unwrap_or(jobs_defaults.prune_interval_minutes),
        };
        if jobs.max_concurrent_jobs == 0 {
            bail!("jobs.max_concurrent_jobs must be greater than 0");
        }
        if jobs.queue_capacity == 0 {
            bail!("jobs.queue_capacity must be greater than 0");
        }
        if jobs.prune_interval_minutes == 0 {
            bail!("jobs.prune_interval_minutes must be greater than 0");
        }
        if jobs.job_retention_hours > MAX_HOURS {
            bail!(
                "jobs.job_retention_hours must be at most {}, got {}",
                MAX_HOURS,
                jobs.job_retention_hours
            );
        }

        let sessions_file = file.sessions.unwrap_or_default();
        let sessions = SessionsSettings {
            session_ttl_hours: sessions_file
                .session_ttl_hours
                .unwrap_or(SessionsSettings::default().session_ttl_hours),
        };
        if sessions.session_ttl_hours > MAX_HOURS {
            bail!(
                "sessions.session_ttl_hours must be at most {}, got {}",
                MAX_HOURS,
                sessions.session_ttl_hours
            );
        }

        Ok(AppConfig {
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            detector_url,
            detector_timeout_sec,
            jobs,
            sessions,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            frontend_dir_path: self.frontend_dir_path.clone(),
            session_ttl_hours: self.sessions.session_ttl_hours,
        }
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
