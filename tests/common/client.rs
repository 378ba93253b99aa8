//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a new client without a session
    ///
    /// Redirects are not followed, so tests can assert on them.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client holding a session for the regular test user
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_with(base_url, TEST_ACCESS_TOKEN).await
    }

    /// Creates a client holding a session for the given access token
    ///
    /// # Panics
    ///
    /// Panics if session creation fails (indicates test infrastructure problem).
    pub async fn authenticated_with(base_url: String, access_token: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.login(access_token).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Session creation failed: {:?}",
            response.text().await
        );

        client
    }

    // ========================================================================
    // Session Endpoints
    // ========================================================================

    /// POST /auth/session
    pub async fn login(&self, access_token: &str) -> Response {
        self.client
            .post(format!("{}/auth/session", self.base_url))
            .json(&json!({ "access_token": access_token }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /auth/me
    pub async fn me(&self) -> Response {
        self.client
            .get(format!("{}/auth/me", self.base_url))
            .send()
            .await
            .expect("Me request failed")
    }

    /// GET /api/logout
    pub async fn logout(&self) -> Response {
        self.client
            .get(format!("{}/api/logout", self.base_url))
            .send()
            .await
            .expect("Logout request failed")
    }

    // ========================================================================
    // Task Endpoints
    // ========================================================================

    /// POST /api/task
    ///
    /// Sends `refresh_media_items=true` when `refresh_media_items` is set,
    /// an empty body otherwise.
    pub async fn submit_task(&self, refresh_media_items: bool) -> Response {
        if refresh_media_items {
            self.submit_task_form(&[("refresh_media_items", "true")])
                .await
        } else {
            self.client
                .post(format!("{}/api/task", self.base_url))
                .send()
                .await
                .expect("Submit task request failed")
        }
    }

    /// POST /api/task with arbitrary form fields
    pub async fn submit_task_form(&self, fields: &[(&str, &str)]) -> Response {
        self.client
            .post(format!("{}/api/task", self.base_url))
            .form(fields)
            .send()
            .await
            .expect("Submit task request failed")
    }

    /// GET /api/active_task
    pub async fn active_task(&self) -> Response {
        self.client
            .get(format!("{}/api/active_task", self.base_url))
            .send()
            .await
            .expect("Active task request failed")
    }

    /// DELETE /api/active_task
    pub async fn clear_active_task(&self) -> Response {
        self.client
            .delete(format!("{}/api/active_task", self.base_url))
            .send()
            .await
            .expect("Clear active task request failed")
    }

    /// Polls GET /api/active_task until the job is SUCCESS or FAILURE
    pub async fn wait_for_finished_task(&self) -> JsonValue {
        self.wait_for_task_status(&["SUCCESS", "FAILURE"]).await
    }

    /// Polls GET /api/active_task until the job status is one of `statuses`
    ///
    /// # Panics
    ///
    /// Panics if polling fails or the status isn't reached within timeout.
    pub async fn wait_for_task_status(&self, statuses: &[&str]) -> JsonValue {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(JOB_FINISH_TIMEOUT_MS);

        loop {
            let response = self.active_task().await;
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let body: JsonValue = response.json().await.expect("Invalid active task body");

            if statuses.iter().any(|status| body["status"] == *status) {
                return body;
            }
            if start.elapsed() > timeout {
                panic!(
                    "Job did not reach {:?} within {}ms, last state: {}",
                    statuses, JOB_FINISH_TIMEOUT_MS, body
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
