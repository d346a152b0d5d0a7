use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::state::AppState;
use crate::api::{ApiError, WindowParams};
use crate::calculate;
use crate::models::{ActivityRanking, HardestClimbRanking, UserTick};

/// Window parameters plus listing options. Must stay flat: query-string
/// numbers do not deserialize through `serde(flatten)`.
#[derive(Debug, Deserialize)]
pub struct TickListParams {
    pub days: Option<String>,
    pub lookback: Option<String>,
    pub now: Option<String>,
    /// Route name to look for
    pub q: Option<String>,
    pub limit: Option<usize>,
}

impl TickListParams {
    fn window(&self) -> WindowParams {
        WindowParams {
            days: self.days.clone(),
            lookback: self.lookback.clone(),
            now: self.now.clone(),
        }
    }
}

fn truncate(mut ticks: Vec<UserTick>, limit: Option<usize>) -> Vec<UserTick> {
    if let Some(limit) = limit {
        ticks.truncate(limit);
    }
    ticks
}

pub async fn activity(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<ActivityRanking>, ApiError> {
    let (now, days) = params.resolve(state.default_lookback_days)?;
    let store = state.store.read().await;
    Ok(Json(calculate::recent_activity_counts(&store, now, days)))
}

pub async fn hardest(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<HardestClimbRanking>, ApiError> {
    let (now, days) = params.resolve(state.default_lookback_days)?;
    let store = state.store.read().await;
    Ok(Json(calculate::hardest_climbs(&store, now, days)))
}

pub async fn recent_ticks(
    State(state): State<AppState>,
    Query(params): Query<TickListParams>,
) -> Result<Json<Vec<UserTick>>, ApiError> {
    let (now, days) = params.window().resolve(state.default_lookback_days)?;
    let store = state.store.read().await;
    let ticks = calculate::recent_ticks_across_users(&store, now, days);
    Ok(Json(truncate(ticks, params.limit)))
}

pub async fn route_ticks(
    State(state): State<AppState>,
    Query(params): Query<TickListParams>,
) -> Result<Json<Vec<UserTick>>, ApiError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing route query parameter q".to_string()))?;
    let (now, days) = params.window().resolve(state.default_lookback_days)?;

    let store = state.store.read().await;
    let ticks = calculate::route_ticks(&store, query, now, days);
    Ok(Json(truncate(ticks, params.limit)))
}
