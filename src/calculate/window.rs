//! Recency windows.
//!
//! A window covers `[now - lookback_days, now]`, both ends inclusive, at
//! calendar-day granularity. `now` is always passed in.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::Tick;

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TickWindow {
    /// The window of `lookback_days` days ending on `now`.
    pub fn ending_at(now: NaiveDate, lookback_days: u32) -> Self {
        let start = now
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: now }
    }

    /// Whether the tick's date falls inside the window. Undated ticks never do.
    pub fn contains(&self, tick: &Tick) -> bool {
        tick.parsed_date()
            .is_some_and(|date| date >= self.start && date <= self.end)
    }

    /// Ticks inside the window, in their original order.
    pub fn filter<'a>(&self, ticks: &'a [Tick]) -> impl Iterator<Item = &'a Tick> + 'a {
        let window = *self;
        ticks.iter().filter(move |t| window.contains(t))
    }
}

/// Whether `tick` falls within `lookback_days` days up to and including `now`.
pub fn in_window(tick: &Tick, now: NaiveDate, lookback_days: u32) -> bool {
    TickWindow::ending_at(now, lookback_days).contains(tick)
}
