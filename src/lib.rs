//! # Tick Tracker
//!
//! Tracks a group of climbers' logged ascents ("ticks") and ranks them by
//! recent activity and by the hardest route climbed in a time window.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (ticks, users, ranking results)
//! - **ingest**: Tick export parsing and rendering
//! - **calculate**: Grade scoring, recency windows and rankings
//! - **store**: In-memory per-user activity records
//! - **storage**: JSONL persistence of user records
//! - **fetch**: Tick export sources (HTTP, local directory)
//! - **sync**: Refreshing user records from a source
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod fetch;
pub mod ingest;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;

pub use models::*;

/// Parse a human-friendly lookback (e.g., "30d", "2w", "45") into days.
pub fn parse_lookback(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('w') {
        (n, 7)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 1)
    } else {
        // Default to days
        (s, 1)
    };

    let num: u32 = num_str.parse().ok()?;
    num.checked_mul(multiplier)
}
