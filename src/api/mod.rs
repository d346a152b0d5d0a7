//! REST API endpoints.
//!
//! Axum-based HTTP API for managing tracked climbers and querying
//! rankings over their recent ticks.

pub mod routes;
pub mod state;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{warn, Level};

use crate::fetch::FetchError;
use crate::models::parse_tick_date;
use crate::parse_lookback;
use crate::sync::RefreshError;
use state::AppState;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The source answered with a login or error page instead of ticks
    #[error("Upstream access denied: {0}")]
    UpstreamDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::UpstreamDenied(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ACCESS_DENIED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RefreshError> for ApiError {
    fn from(e: RefreshError) -> Self {
        match &e {
            RefreshError::Fetch(FetchError::Parse(parse)) if parse.is_authentication_or_privacy() => {
                ApiError::UpstreamDenied(e.to_string())
            }
            RefreshError::Fetch(_) | RefreshError::NoTicks(_) => ApiError::Upstream(e.to_string()),
            RefreshError::AlreadyRunning => ApiError::Conflict(e.to_string()),
            RefreshError::Storage(_) | RefreshError::Task(_) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Window query parameters shared by the ranking endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowParams {
    /// Lookback such as "30", "30d" or "2w"
    pub days: Option<String>,
    /// Alias for `days`
    pub lookback: Option<String>,
    /// Reference date, defaults to today (UTC)
    pub now: Option<String>,
}

impl WindowParams {
    /// Resolve to `(now, lookback_days)`.
    pub fn resolve(&self, default_days: u32) -> Result<(NaiveDate, u32), ApiError> {
        let days = match self.days.as_deref().or(self.lookback.as_deref()) {
            Some(raw) => parse_lookback(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid lookback: {}", raw)))?,
            None => default_days,
        };

        let now = match self.now.as_deref() {
            Some(raw) => parse_tick_date(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid date: {}", raw)))?,
            None => Utc::now().date_naive(),
        };

        Ok((now, days))
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Build the complete router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origin);

    Router::new()
        .route(
            "/api/users",
            get(routes::users::list_users).post(routes::users::add_user),
        )
        .route(
            "/api/users/:username",
            get(routes::users::get_user).delete(routes::users::delete_user),
        )
        .route("/api/refresh", post(routes::refresh::start_refresh))
        .route("/api/refresh/status", get(routes::refresh::status))
        .route("/api/rankings/activity", get(routes::rankings::activity))
        .route("/api/rankings/hardest", get(routes::rankings::hardest))
        .route("/api/ticks/recent", get(routes::rankings::recent_ticks))
        .route("/api/ticks/route", get(routes::rankings::route_ticks))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
