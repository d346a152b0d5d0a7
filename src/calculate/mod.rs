//! Ranking engine.
//!
//! Computes the derived views over stored ticks:
//! - Grade normalization onto one difficulty scale
//! - Recency windows
//! - Recent-activity and hardest-climb rankings

pub mod grade;
pub mod ranking;
pub mod window;

pub use grade::{score, Grade, Subgrade};
pub use ranking::{
    competition_places, hardest_climbs, recent_activity_counts, recent_ticks_across_users,
    route_ticks,
};
pub use window::{in_window, TickWindow};
