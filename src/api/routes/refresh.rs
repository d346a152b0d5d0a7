use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::sync::{RefreshError, RefreshState};

#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    /// Run the refresh inline and return the report
    #[serde(default)]
    pub wait: bool,
}

/// Refresh every tracked user.
///
/// By default the refresh runs in the background and the current state is
/// returned with 202; poll `/api/refresh/status`. With `?wait=true` the
/// full report is returned once every user has been tried.
pub async fn start_refresh(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<Response, ApiError> {
    if state.refresher.is_running().await {
        return Err(RefreshError::AlreadyRunning.into());
    }

    if params.wait {
        let report = state.refresher.refresh_all().await?;
        return Ok(Json(report).into_response());
    }

    let refresher = state.refresher.clone();
    tokio::spawn(async move {
        match refresher.refresh_all().await {
            Ok(report) => info!(
                "Background refresh finished: {} refreshed, {} failed",
                report.refreshed.len(),
                report.failed.len()
            ),
            Err(e) => error!("Background refresh failed: {}", e),
        }
    });

    let current = state.refresher.state().await;
    Ok((StatusCode::ACCEPTED, Json(current)).into_response())
}

pub async fn status(State(state): State<AppState>) -> Json<RefreshState> {
    Json(state.refresher.state().await)
}
