use anyhow::{Context, Result};
use std::{collections::HashMap, time::Duration};

use tracing::info;

use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use super::error::ApiError;
use super::metrics::{self, metrics_handler};
use super::session::{Session, COOKIE_SESSION_TOKEN_KEY};
use super::{log_requests, state::*, ServerConfig};
use crate::dedup::{format_result, Credentials, DisplayResults, TaskOptions};
use crate::jobs::JobStatus;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
    pub jobs: usize,
    pub sessions: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct SessionCreatedResponse {
    token: String,
}

#[derive(Serialize)]
struct MeResponse {
    logged_in: bool,
    has_active_task: bool,
}

#[derive(Serialize)]
struct SubmitTaskResponse {
    success: bool,
}

#[derive(Serialize)]
struct ActiveTaskResponse {
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<DisplayResults>,
}

/// Form fields of a task submission. A request without a body has no fields.
struct TaskForm(HashMap<String, String>);

impl<S> FromRequest<S> for TaskForm
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !req.headers().contains_key(header::CONTENT_TYPE) {
            return Ok(TaskForm(HashMap::new()));
        }
        let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        Ok(TaskForm(fields))
    }
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.job_registry.len(),
        sessions: state.session_store.len(),
    };
    Json(stats)
}

async fn create_session(
    State(state): State<ServerState>,
    jar: CookieJar,
    Json(credentials): Json<Credentials>,
) -> impl IntoResponse {
    let token = state.session_store.create(credentials);
    metrics::set_active_sessions(state.session_store.len());
    info!("Session {} created", token);

    let cookie = Cookie::build((COOKIE_SESSION_TOKEN_KEY, token.as_str().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(state.config.session_ttl_hours as i64))
        .build();

    (
        StatusCode::CREATED,
        jar.add(cookie),
        Json(SessionCreatedResponse {
            token: token.as_str().to_string(),
        }),
    )
}

async fn me(State(state): State<ServerState>, session: Option<Session>) -> Response {
    match session {
        Some(session) => Json(MeResponse {
            logged_in: true,
            has_active_task: state.session_binder.has_active_job(&session.token),
        })
        .into_response(),
        None => ApiError::Unauthenticated.into_response(),
    }
}

async fn logout(
    State(state): State<ServerState>,
    session: Option<Session>,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(session) = session {
        state.session_binder.clear(&session.token);
        state.session_store.remove(&session.token);
        metrics::set_active_sessions(state.session_store.len());
        info!("Session {} logged out", session.token);
    }

    let expired_cookie = Cookie::build(Cookie::new(COOKIE_SESSION_TOKEN_KEY, ""))
        .path("/")
        .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1))
        .same_site(SameSite::Lax)
        .build();

    (jar.add(expired_cookie), Redirect::to("/"))
}

async fn submit_task(
    State(state): State<ServerState>,
    session: Session,
    TaskForm(fields): TaskForm,
) -> Result<Json<SubmitTaskResponse>, ApiError> {
    let options = TaskOptions::from_form(&fields)?;

    let claim = state
        .session_binder
        .try_claim_submission(&session.token, &state.job_registry)?;
    let job_id = state.orchestrator.submit(session.credentials, options)?;
    claim.bind(job_id.clone());

    info!("Session {} is now following job {}", session.token, job_id);
    Ok(Json(SubmitTaskResponse { success: true }))
}

async fn get_active_task(
    State(state): State<ServerState>,
    session: Session,
) -> Result<Json<ActiveTaskResponse>, ApiError> {
    let job_id = state
        .session_binder
        .get_active_job(&session.token)
        .ok_or(ApiError::NoActiveJob)?;
    let snapshot = state
        .job_registry
        .get(&job_id)
        .ok_or_else(|| ApiError::JobNotFound(job_id.clone()))?;

    let response = match (snapshot.status, &snapshot.result) {
        (JobStatus::Success, Some(result)) => ActiveTaskResponse {
            status: snapshot.status,
            message: None,
            results: Some(format_result(result)),
        },
        _ => ActiveTaskResponse {
            status: snapshot.status,
            message: snapshot.message(),
            results: None,
        },
    };
    Ok(Json(response))
}

async fn clear_active_task(State(state): State<ServerState>, session: Session) -> StatusCode {
    state.session_binder.clear(&session.token);
    StatusCode::NO_CONTENT
}

pub fn make_app(
    config: ServerConfig,
    orchestrator: GuardedOrchestrator,
    session_store: GuardedSessionStore,
    session_binder: GuardedSessionBinder,
) -> Router {
    let state = ServerState::new(config.clone(), orchestrator, session_store, session_binder);

    let auth_routes: Router = Router::new()
        .route("/session", post(create_session))
        .route("/me", get(me))
        .with_state(state.clone());

    let api_routes: Router = Router::new()
        .route("/task", post(submit_task))
        .route(
            "/active_task",
            get(get_active_task).delete(clear_active_task),
        )
        .route("/logout", get(logout))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .nest("/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the API on `config.port` and Prometheus metrics on `config.metrics_port`
/// until `shutdown_token` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    orchestrator: GuardedOrchestrator,
    session_store: GuardedSessionStore,
    session_binder: GuardedSessionBinder,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, orchestrator, session_store, session_binder);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    let api_server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.clone().cancelled_owned());
    let metrics_server = axum::serve(metrics_listener, make_metrics_app())
        .with_graceful_shutdown(shutdown_token.cancelled_owned());

    tokio::try_join!(
        async { api_server.await.context("HTTP server failed") },
        async { metrics_server.await.context("Metrics server failed") },
    )?;
    Ok(())
}
