//! Core data models for the tick tracker.

mod ranking;
mod tick;
mod user;

pub use ranking::*;
pub use tick::*;
pub use user::*;
