pub mod rankings;
pub mod refresh;
pub mod users;
