//! The duplicate detection step run by each job.
//!
//! Detection happens in an external service; this module only hands it the
//! user's credentials and waits for the duplicate groups.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::models::{Credentials, DedupResult, TaskOptions};
use crate::jobs::JobContext;

/// Unit of work executed for each deduplication job.
///
/// Implementations may report progress through `ctx`. The returned result
/// becomes the job's result, an error becomes its failure detail.
#[async_trait]
pub trait DuplicateFinder: Send + Sync {
    async fn find_duplicates(
        &self,
        ctx: &JobContext,
        credentials: &Credentials,
        options: &TaskOptions,
    ) -> Result<DedupResult>;
}

#[derive(Serialize)]
struct FindDuplicatesRequest<'a> {
    credentials: &'a Credentials,
    refresh_media_items: bool,
}

/// Client for the external duplicate detection service.
#[derive(Clone)]
pub struct HttpDuplicateFinder {
    client: Client,
    base_url: String,
}

impl HttpDuplicateFinder {
    /// # Arguments
    /// * `base_url` - Base URL of the detection service (e.g., "http://localhost:8080")
    /// * `timeout_secs` - Timeout of a whole detection run in seconds
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DuplicateFinder for HttpDuplicateFinder {
    async fn find_duplicates(
        &self,
        ctx: &JobContext,
        credentials: &Credentials,
        options: &TaskOptions,
    ) -> Result<DedupResult> {
        if options.refresh_media_items {
            ctx.report_progress("Refreshing media items");
        } else {
            ctx.report_progress("Looking for duplicates");
        }

        let url = format!("{}/duplicates", self.base_url);
        debug!("Job {}: POST {}", ctx.job_id(), url);
        let response = self
            .client
            .post(&url)
            .json(&FindDuplicatesRequest {
                credentials,
                refresh_media_items: options.refresh_media_items,
            })
            .send()
            .await
            .context("Detection service is unreachable")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Duplicate detection failed with status: {}",
                response.status()
            ));
        }

        let result: DedupResult = response
            .json()
            .await
            .context("Invalid response from detection service")?;
        ctx.report_progress(format!("Found {} duplicate groups", result.groups.len()));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobRegistry, JobStatus};
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value as JsonValue};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_detector(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn running_context() -> (JobContext, Arc<JobRegistry>) {
        let registry = Arc::new(JobRegistry::new());
        let id = registry.create();
        registry.update(&id, JobStatus::Running, None).unwrap();
        (JobContext::new(id, registry.clone()), registry)
    }

    #[tokio::test]
    async fn posts_credentials_and_parses_groups() {
        let router = Router::new().route(
            "/duplicates",
            post(|Json(body): Json<JsonValue>| async move {
                assert_eq!(body["credentials"], json!({"token": "abc"}));
                assert_eq!(body["refresh_media_items"], json!(true));
                Json(json!({
                    "groups": [
                        {"id": 1, "media_items": [{"filename": "a.jpg"}, {"filename": "b.jpg"}]}
                    ]
                }))
            }),
        );
        let url = spawn_detector(router).await;
        // A trailing slash on the configured URL is ignored
        let finder = HttpDuplicateFinder::new(format!("{}/", url), 10).unwrap();

        let (ctx, registry) = running_context();
        let result = finder
            .find_duplicates(
                &ctx,
                &Credentials(json!({"token": "abc"})),
                &TaskOptions {
                    refresh_media_items: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].media_items[1].filename(), "b.jpg");
        let snapshot = registry.get(ctx.job_id()).unwrap();
        assert_eq!(
            snapshot.message(),
            Some("Found 1 duplicate groups".to_string())
        );
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let router = Router::new().route(
            "/duplicates",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let url = spawn_detector(router).await;
        let finder = HttpDuplicateFinder::new(url, 10).unwrap();

        let (ctx, _registry) = running_context();
        let err = finder
            .find_duplicates(
                &ctx,
                &Credentials(json!({})),
                &TaskOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn malformed_groups_are_rejected() {
        let router = Router::new().route(
            "/duplicates",
            post(|| async {
                Json(json!({"groups": [{"id": 1, "media_items": [{"name": "no filename"}]}]}))
            }),
        );
        let url = spawn_detector(router).await;
        let finder = HttpDuplicateFinder::new(url, 10).unwrap();

        let (ctx, _registry) = running_context();
        let result = finder
            .find_duplicates(&ctx, &Credentials(json!({})), &TaskOptions::default())
            .await;
        assert!(result.is_err());
    }
}
