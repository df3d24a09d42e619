//! HTTP route handlers: the action dispatcher.
//!
//! Every action goes through one endpoint, `/api?action=<name>`, so the gate
//! (origin check, then token for `run`) runs in a single place.

use std::path::PathBuf;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::{HOST, ORIGIN, REFERER};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use nautilus::core::origin::check_origin;
use nautilus::core::types::Action;
use nautilus::error::{AuthRejection, RequestError};
use nautilus::io::catalog::{load_catalog, refresh_catalog};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::sse;
use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api", get(dispatch).post(dispatch))
        .route("/api/health", get(health))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
struct ActionParams {
    action: Option<String>,
    path: Option<String>,
    token: Option<String>,
    response: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    reason: &'static str,
}

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    UnknownAction,
    CatalogNotReady,
    Request(RequestError),
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::Request(err)
    }
}

impl From<AuthRejection> for ApiError {
    fn from(rejection: AuthRejection) -> Self {
        ApiError::Request(rejection.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Request(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::UnknownAction => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "bad_request",
                    reason: "unknown_action",
                },
            ),
            ApiError::CatalogNotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: "not_ready",
                    reason: "catalog_missing",
                },
            ),
            ApiError::Request(err) => {
                let status = match err {
                    RequestError::AuthRejected(_) => StatusCode::FORBIDDEN,
                    RequestError::PathRejected(_) | RequestError::ValidationRejected(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    RequestError::Internal(e) => {
                        warn!(err = %format!("{e:#}"), "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (
                    status,
                    ErrorBody {
                        error: err.category(),
                        reason: err.reason(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn header<'a>(headers: &'a HeaderMap, name: axum::http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// GET|POST /api?action=... - gate the request, then run the action.
async fn dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ActionParams>,
) -> Response {
    let action = match params.action.as_deref().map(str::parse::<Action>) {
        Some(Ok(action)) => action,
        Some(Err(e)) => {
            warn!(err = %e, "rejected request");
            return ApiError::UnknownAction.into_response();
        }
        None => return ApiError::UnknownAction.into_response(),
    };

    let gate = check_origin(
        action,
        header(&headers, ORIGIN),
        header(&headers, REFERER),
        header(&headers, HOST),
    );
    if let Err(rejection) = gate {
        warn!(%action, reason = rejection.as_str(), "origin check failed");
        return ApiError::from(rejection).into_response();
    }

    match handle(action, state, params).await {
        Ok(response) => response,
        Err(err) => {
            if let ApiError::Request(inner) = &err
                && !matches!(inner, RequestError::Internal(_))
            {
                info!(
                    %action,
                    category = inner.category(),
                    reason = inner.reason(),
                    "request rejected"
                );
            }
            err.into_response()
        }
    }
}

async fn handle(
    action: Action,
    state: AppState,
    params: ActionParams,
) -> Result<Response, ApiError> {
    match action {
        Action::List => list(&state).await,
        Action::Token => {
            let token = state.supervisor.tokens().issue();
            Ok(Json(json!({ "token": token })).into_response())
        }
        Action::Run => run(state, params).await,
        Action::Stop => {
            let supervisor = state.supervisor.clone();
            let status = tokio::task::spawn_blocking(move || supervisor.stop())
                .await
                .map_err(anyhow::Error::from)??;
            Ok(Json(json!({ "status": status })).into_response())
        }
        Action::Respond => {
            let answer = params.response.unwrap_or_default();
            let supervisor = state.supervisor.clone();
            // Waits behind a start or stop that holds the slot.
            let status = tokio::task::spawn_blocking(move || supervisor.respond(&answer))
                .await
                .map_err(anyhow::Error::from)??;
            Ok(Json(json!({ "status": status })).into_response())
        }
        Action::Refresh => {
            let catalog = state.config().catalog.clone();
            tokio::task::spawn_blocking(move || refresh_catalog(&catalog))
                .await
                .map_err(anyhow::Error::from)??;
            Ok(Json(json!({ "status": "refreshed" })).into_response())
        }
        Action::Status => Ok(Json(state.supervisor.status()).into_response()),
    }
}

async fn list(state: &AppState) -> Result<Response, ApiError> {
    let cache_path = state.config().catalog.cache_path.clone();
    let catalog = tokio::task::spawn_blocking(move || load_catalog(&cache_path))
        .await
        .map_err(anyhow::Error::from)??;
    match catalog {
        Some(catalog) => Ok(Json(catalog).into_response()),
        None => Err(ApiError::CatalogNotReady),
    }
}

/// Consume the token, start the job, and stream its output.
async fn run(state: AppState, params: ActionParams) -> Result<Response, ApiError> {
    state
        .supervisor
        .tokens()
        .consume(params.token.as_deref().unwrap_or_default())?;

    let path = PathBuf::from(params.path.unwrap_or_default());
    let supervisor = state.supervisor.clone();
    let job = tokio::task::spawn_blocking(move || supervisor.start(path))
        .await
        .map_err(anyhow::Error::from)??;
    info!(pid = job.pid(), path = %job.path().display(), "streaming job");

    Ok(sse::job_events(job, state.config().relay_poll_interval()).into_response())
}
