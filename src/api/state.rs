use crate::store::SharedStore;
use crate::sync::Refresher;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub refresher: Refresher,
    pub default_lookback_days: u32,
    pub cors_origin: String,
}

impl AppState {
    pub fn new(refresher: Refresher, default_lookback_days: u32) -> Self {
        Self {
            store: refresher.store().clone(),
            refresher,
            default_lookback_days,
            cors_origin: "*".to_string(),
        }
    }

    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = origin.into();
        self
    }
}
