//! Tick model.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Route text the export uses when a cell is missing.
const PLACEHOLDER_ROUTE: &str = "Unknown";

/// One logged ascent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    /// Calendar date as exported (e.g. "2024-06-01")
    pub date: String,

    /// Route display name
    pub route: String,

    /// Free-text difficulty (e.g. "5.11a", "V4")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitches: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_stars: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_stars: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_style: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_rating: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_code: Option<String>,
}

impl Tick {
    /// Create a tick with only the required fields set.
    pub fn new(date: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            route: route.into(),
            rating: None,
            notes: None,
            url: None,
            pitches: None,
            location: None,
            avg_stars: None,
            your_stars: None,
            style: None,
            lead_style: None,
            route_type: None,
            your_rating: None,
            length: None,
            rating_code: None,
        }
    }

    /// Builder method to set the rating.
    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = Some(rating.into());
        self
    }

    /// Builder method to set notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Calendar date of the ascent, if the exported text is recognizable.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_tick_date(&self.date)
    }

    /// Rating text, or "" when ungraded.
    pub fn rating_text(&self) -> &str {
        self.rating.as_deref().unwrap_or("")
    }
}

/// Whether a route name is usable: non-empty, not the export placeholder,
/// and free of markup.
pub fn is_valid_route(route: &str) -> bool {
    let route = route.trim();
    !route.is_empty()
        && route != PLACEHOLDER_ROUTE
        && !route.contains('<')
}

/// Parse a tick date in any of the formats the export has been seen to use.
pub fn parse_tick_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_utc().date())
        })
}

/// Sort ticks most recent first; unparseable dates go last. Stable.
pub fn sort_ticks_desc(ticks: &mut [Tick]) {
    ticks.sort_by_cached_key(|t| std::cmp::Reverse(t.parsed_date()));
}
