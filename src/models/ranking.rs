//! Ranking result models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Tick;

/// One user's line in the recent-activity ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub username: String,
    /// Ticks inside the window
    pub tick_count: usize,
    /// Date of the most recent tick inside the window
    pub last_tick_date: Option<String>,
    /// Lifetime tick count
    pub total_ticks: usize,
}

/// A user left out of a ranking for having nothing inside the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisqualifiedUser {
    pub username: String,
    pub total_ticks: usize,
    /// Most recent tick of all time (hardest-climb ranking only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tick_date: Option<String>,
}

/// Result of the recent-activity ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRanking {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub ranked: Vec<ActivityEntry>,
    pub disqualified: Vec<DisqualifiedUser>,
}

/// One user's hardest windowed climb, with its competition place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardestClimbEntry {
    /// 1-based competition place; tied scores share a place
    pub place: u32,
    pub username: String,
    pub score: f64,
    pub tick: Tick,
}

/// Result of the hardest-climb ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardestClimbRanking {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub ranked: Vec<HardestClimbEntry>,
    pub disqualified: Vec<DisqualifiedUser>,
}

/// A tick tagged with the climber who logged it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTick {
    pub username: String,
    #[serde(flatten)]
    pub tick: Tick,
}
