//! Activity and hardest-climb rankings.
//!
//! Both rankings read a borrowed [`ActivityStore`] and a window ending on an
//! explicit `now`. Users with nothing in the window are listed as
//! disqualified, sorted by username, instead of being ranked.

use std::cmp::Reverse;

use chrono::NaiveDate;

use super::grade;
use super::window::TickWindow;
use crate::models::{
    ActivityEntry, ActivityRanking, DisqualifiedUser, HardestClimbEntry, HardestClimbRanking,
    Tick, UserActivityRecord, UserTick,
};
use crate::store::ActivityStore;

/// Rank users by how many ticks they logged inside the window.
///
/// Equal counts keep store insertion order.
pub fn recent_activity_counts(
    store: &ActivityStore,
    now: NaiveDate,
    lookback_days: u32,
) -> ActivityRanking {
    let window = TickWindow::ending_at(now, lookback_days);
    let mut ranked = Vec::new();
    let mut disqualified = Vec::new();

    for record in store.records() {
        let mut windowed = window.filter(&record.all_ticks);
        let Some(latest) = windowed.next() else {
            disqualified.push(disqualify(record, None));
            continue;
        };

        ranked.push(ActivityEntry {
            username: record.username.clone(),
            tick_count: 1 + windowed.count(),
            last_tick_date: Some(latest.date.clone()),
            total_ticks: record.all_ticks.len(),
        });
    }

    ranked.sort_by_key(|e| Reverse(e.tick_count));
    sort_disqualified(&mut disqualified);

    ActivityRanking {
        window_start: window.start,
        window_end: window.end,
        ranked,
        disqualified,
    }
}

/// Rank users by the hardest tick they logged inside the window.
pub fn hardest_climbs(
    store: &ActivityStore,
    now: NaiveDate,
    lookback_days: u32,
) -> HardestClimbRanking {
    let window = TickWindow::ending_at(now, lookback_days);
    let mut best = Vec::new();
    let mut disqualified = Vec::new();

    for record in store.records() {
        match hardest_in(window.filter(&record.all_ticks)) {
            Some((tick, score)) => best.push((record.username.clone(), tick.clone(), score)),
            None => {
                let last = record.last_tick_date().map(str::to_string);
                disqualified.push(disqualify(record, last));
            }
        }
    }

    best.sort_by(|a, b| b.2.total_cmp(&a.2));
    let scores: Vec<f64> = best.iter().map(|(_, _, score)| *score).collect();
    let ranked = best
        .into_iter()
        .zip(competition_places(&scores))
        .map(|((username, tick, score), place)| HardestClimbEntry {
            place,
            username,
            score,
            tick,
        })
        .collect();

    sort_disqualified(&mut disqualified);

    HardestClimbRanking {
        window_start: window.start,
        window_end: window.end,
        ranked,
        disqualified,
    }
}

/// Every user's windowed ticks, most recent first.
pub fn recent_ticks_across_users(
    store: &ActivityStore,
    now: NaiveDate,
    lookback_days: u32,
) -> Vec<UserTick> {
    let window = TickWindow::ending_at(now, lookback_days);
    collect_tagged(store, |tick| window.contains(tick))
}

/// Windowed ticks on routes matching `query`, most recent first.
///
/// A route matches when either name contains the other, ignoring case.
pub fn route_ticks(
    store: &ActivityStore,
    query: &str,
    now: NaiveDate,
    lookback_days: u32,
) -> Vec<UserTick> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let window = TickWindow::ending_at(now, lookback_days);
    collect_tagged(store, |tick| {
        let route = tick.route.to_lowercase();
        window.contains(tick) && (route.contains(&query) || query.contains(&route))
    })
}

/// Competition places for scores already sorted in descending order.
///
/// Equal scores share a place; the next distinct score takes its 1-based
/// position, so `[12.0, 12.0, 11.5]` places as `[1, 1, 3]`.
pub fn competition_places(sorted_scores: &[f64]) -> Vec<u32> {
    let mut places: Vec<u32> = Vec::with_capacity(sorted_scores.len());
    for (i, score) in sorted_scores.iter().enumerate() {
        let place = match places.last() {
            Some(&prev) if sorted_scores[i - 1] == *score => prev,
            _ => i as u32 + 1,
        };
        places.push(place);
    }
    places
}

/// The strictly hardest tick; on equal scores the first one seen wins.
fn hardest_in<'a>(ticks: impl Iterator<Item = &'a Tick>) -> Option<(&'a Tick, f64)> {
    let mut best: Option<(&Tick, f64)> = None;
    for tick in ticks {
        let score = grade::score(tick.rating_text());
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((tick, score));
        }
    }
    best
}

fn collect_tagged<F>(store: &ActivityStore, keep: F) -> Vec<UserTick>
where
    F: Fn(&Tick) -> bool,
{
    let keep = &keep;
    let mut tagged: Vec<UserTick> = store
        .records()
        .flat_map(move |record| {
            record
                .all_ticks
                .iter()
                .filter(move |t| keep(*t))
                .map(move |tick| UserTick {
                    username: record.username.clone(),
                    tick: tick.clone(),
                })
        })
        .collect();

    tagged.sort_by_cached_key(|t| Reverse(t.tick.parsed_date()));
    tagged
}

fn disqualify(record: &UserActivityRecord, last_tick_date: Option<String>) -> DisqualifiedUser {
    DisqualifiedUser {
        username: record.username.clone(),
        total_ticks: record.all_ticks.len(),
        last_tick_date,
    }
}

fn sort_disqualified(users: &mut [DisqualifiedUser]) {
    users.sort_by(|a, b| a.username.cmp(&b.username));
}
