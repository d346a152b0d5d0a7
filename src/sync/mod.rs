//! Refresh orchestrator.
//!
//! Pulls each tracked user's ticks from a [`TickSource`] and swaps the new
//! record into the shared store:
//! 1. Fetch and parse the user's export
//! 2. Reject failures and empty exports, keeping the previous record
//! 3. Persist the new record when a [`RecordFile`] is attached
//! 4. Replace the in-memory record
//!
//! Steps 3 and 4 run under the store write lock, as does removal, so the
//! file and the store always agree on the order of writes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::calculate::TickWindow;
use crate::fetch::{FetchError, TickSource};
use crate::models::{Tick, UserActivityRecord, UserRef};
use crate::storage::{RecordFile, StorageError};
use crate::store::{ActivityStore, SharedStore};

/// Errors that can occur while refreshing a user.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("No ticks found for {0}")]
    NoTicks(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("A refresh is already running")]
    AlreadyRunning,
}

/// State of the most recent full refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshState {
    pub status: RefreshStatus,

    /// When the last refresh started
    pub started_at: Option<DateTime<Utc>>,

    /// When the last refresh completed
    pub completed_at: Option<DateTime<Utc>>,

    /// Users refreshed in the last run
    pub refreshed: usize,

    /// Errors encountered, one per failed user
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Outcome of one successful user refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRefreshResult {
    pub username: String,
    /// Ticks inside the configured lookback window
    pub tick_count: usize,
    pub total_ticks: usize,
}

/// A user whose refresh failed. Their previous record is untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailure {
    pub username: String,
    pub error: String,
}

/// Result of refreshing every tracked user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    /// Sorted by windowed tick count, highest first
    pub refreshed: Vec<UserRefreshResult>,
    pub failed: Vec<RefreshFailure>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Refreshes user records from a tick source.
#[derive(Clone)]
pub struct Refresher {
    source: Arc<dyn TickSource>,
    store: SharedStore,
    records: Option<Arc<RecordFile>>,
    lookback_days: u32,
    state: Arc<RwLock<RefreshState>>,
}

impl Refresher {
    pub fn new(source: Arc<dyn TickSource>, store: SharedStore, lookback_days: u32) -> Self {
        Self {
            source,
            store,
            records: None,
            lookback_days,
            state: Arc::new(RwLock::new(RefreshState::default())),
        }
    }

    /// Persist every successful refresh to `records`.
    pub fn with_records(mut self, records: Arc<RecordFile>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Get current refresh state.
    pub async fn state(&self) -> RefreshState {
        self.state.read().await.clone()
    }

    /// Check if a full refresh is currently running.
    pub async fn is_running(&self) -> bool {
        self.state.read().await.status == RefreshStatus::Running
    }

    /// Download a user's ticks and replace their record.
    ///
    /// Works for users not yet tracked, which is how users are added. On any
    /// failure the store and the records file are left as they were.
    pub async fn refresh_user(&self, user: UserRef) -> Result<UserRefreshResult, RefreshError> {
        let ticks = self.source.fetch_ticks(&user).await?;
        self.apply_ticks(user, ticks).await
    }

    /// Replace a user's record with already-parsed ticks.
    pub async fn apply_ticks(
        &self,
        user: UserRef,
        ticks: Vec<Tick>,
    ) -> Result<UserRefreshResult, RefreshError> {
        let (record, result) = self.build_record(user, ticks)?;
        let mut store = self.store.write().await;
        self.commit(&mut store, record).await?;
        self.log_refreshed(&result);
        Ok(result)
    }

    /// Refresh a user only if they are still tracked once the fetch returns.
    /// `Ok(None)` means the user was removed in the meantime.
    async fn refresh_tracked(
        &self,
        user: UserRef,
    ) -> Result<Option<UserRefreshResult>, RefreshError> {
        let ticks = self.source.fetch_ticks(&user).await?;
        let (record, result) = self.build_record(user, ticks)?;

        let mut store = self.store.write().await;
        if !store.contains(&record.username) {
            info!("Skipping {}: removed during refresh", record.username);
            return Ok(None);
        }
        self.commit(&mut store, record).await?;
        self.log_refreshed(&result);
        Ok(Some(result))
    }

    fn build_record(
        &self,
        user: UserRef,
        ticks: Vec<Tick>,
    ) -> Result<(UserActivityRecord, UserRefreshResult), RefreshError> {
        if ticks.is_empty() {
            return Err(RefreshError::NoTicks(user.username));
        }

        let now = Utc::now();
        let record = UserActivityRecord::new(user, ticks, now);
        let window = TickWindow::ending_at(now.date_naive(), self.lookback_days);
        let result = UserRefreshResult {
            username: record.username.clone(),
            tick_count: window.filter(&record.all_ticks).count(),
            total_ticks: record.total_ticks,
        };
        Ok((record, result))
    }

    /// Persist then swap in a record. The caller holds the store write lock,
    /// so the file and memory see writes in the same order.
    async fn commit(
        &self,
        store: &mut ActivityStore,
        record: UserActivityRecord,
    ) -> Result<(), RefreshError> {
        let record = match &self.records {
            Some(records) => {
                let records = Arc::clone(records);
                tokio::task::spawn_blocking(move || {
                    records.save_user(&record).map(|_| record)
                })
                .await??
            }
            None => record,
        };

        store.upsert(record);
        Ok(())
    }

    fn log_refreshed(&self, result: &UserRefreshResult) {
        info!(
            "Refreshed {}: {} ticks, {} in the last {} days",
            result.username, result.total_ticks, result.tick_count, self.lookback_days
        );
    }

    /// Stop tracking a user. Returns whether the user was tracked.
    pub async fn remove_user(&self, username: &str) -> Result<bool, RefreshError> {
        let mut store = self.store.write().await;

        if let Some(records) = &self.records {
            let records = Arc::clone(records);
            let name = username.to_string();
            tokio::task::spawn_blocking(move || records.remove_user(&name)).await??;
        }

        let removed = store.remove(username).is_some();
        if removed {
            info!("Removed user {}", username);
        }
        Ok(removed)
    }

    /// Refresh every tracked user concurrently.
    ///
    /// One user's failure never affects another's record; it is listed in
    /// the report instead.
    pub async fn refresh_all(&self) -> Result<RefreshReport, RefreshError> {
        {
            let mut state = self.state.write().await;
            if state.status == RefreshStatus::Running {
                warn!("Refresh already in progress");
                return Err(RefreshError::AlreadyRunning);
            }
            state.status = RefreshStatus::Running;
            state.started_at = Some(Utc::now());
            state.errors.clear();
        }

        let start = Instant::now();
        let users: Vec<UserRef> = {
            let store = self.store.read().await;
            store.records().map(UserActivityRecord::user_ref).collect()
        };
        info!(
            "Starting refresh of {} users from {} source",
            users.len(),
            self.source.name()
        );

        let mut tasks = JoinSet::new();
        for user in users {
            let this = self.clone();
            tasks.spawn(async move {
                let username = user.username.clone();
                (username, this.refresh_tracked(user).await)
            });
        }

        let mut report = RefreshReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Some(result)))) => report.refreshed.push(result),
                Ok((_, Ok(None))) => {}
                Ok((username, Err(e))) => {
                    warn!("Failed to refresh {}: {}", username, e);
                    report.failed.push(RefreshFailure {
                        username,
                        error: e.to_string(),
                    });
                }
                Err(e) => error!("Refresh task panicked: {}", e),
            }
        }

        report
            .refreshed
            .sort_by(|a, b| b.tick_count.cmp(&a.tick_count).then_with(|| a.username.cmp(&b.username)));
        report.failed.sort_by(|a, b| a.username.cmp(&b.username));
        report.duration = start.elapsed();

        {
            let mut state = self.state.write().await;
            state.completed_at = Some(Utc::now());
            state.status = if report.failed.is_empty() {
                RefreshStatus::Completed
            } else {
                RefreshStatus::Failed
            };
            state.refreshed = report.refreshed.len();
            state.errors = report
                .failed
                .iter()
                .map(|f| format!("{}: {}", f.username, f.error))
                .collect();
        }

        info!(
            "Refresh completed: {} refreshed, {} failed in {:?}",
            report.refreshed.len(),
            report.failed.len(),
            report.duration
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticTickSource;
    use crate::storage::StorageConfig;
    use chrono::Days;
    use std::time::Duration;
    use tempfile::TempDir;

    fn days_ago(n: u64) -> String {
        let day = Utc::now().date_naive().checked_sub_days(Days::new(n)).unwrap();
        day.format("%Y-%m-%d").to_string()
    }

    fn ticks(recent: usize, old: usize) -> Vec<Tick> {
        let mut ticks: Vec<Tick> = (0..recent)
            .map(|i| Tick::new(days_ago(1), format!("Recent {}", i)).with_rating("5.10a"))
            .collect();
        ticks.extend((0..old).map(|i| Tick::new(days_ago(400), format!("Old {}", i))));
        ticks
    }

    fn tracked(store: &mut ActivityStore, username: &str, routes: usize) {
        let record = UserActivityRecord::new(
            UserRef::new("1", username),
            ticks(routes, 0),
            Utc::now(),
        );
        store.upsert(record);
    }

    #[tokio::test]
    async fn test_refresh_state_default() {
        let state = RefreshState::default();
        assert_eq!(state.status, RefreshStatus::Idle);
        assert!(state.started_at.is_none());
    }

    #[tokio::test]
    async fn test_refresh_user_adds_new_user() {
        let source = Arc::new(StaticTickSource::new().with_user("alex", ticks(2, 3)));
        let store = ActivityStore::new().into_shared();
        let refresher = Refresher::new(source, store.clone(), 30);

        let result = refresher
            .refresh_user(UserRef::new("100", "alex"))
            .await
            .unwrap();

        assert_eq!(result.tick_count, 2);
        assert_eq!(result.total_ticks, 5);
        let store = store.read().await;
        let record = store.get("alex").unwrap();
        assert_eq!(record.user_id, "100");
        assert_eq!(record.total_ticks, 5);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_record() {
        let source = Arc::new(StaticTickSource::new().with_user("empty", Vec::new()));
        let mut store = ActivityStore::new();
        tracked(&mut store, "empty", 3);
        tracked(&mut store, "gone", 4);
        let store = store.into_shared();
        let refresher = Refresher::new(source, store.clone(), 30);

        let empty = refresher.refresh_user(UserRef::new("1", "empty")).await;
        assert!(matches!(empty, Err(RefreshError::NoTicks(_))));

        let gone = refresher.refresh_user(UserRef::new("1", "gone")).await;
        assert!(matches!(gone, Err(RefreshError::Fetch(_))));

        let store = store.read().await;
        assert_eq!(store.get("empty").unwrap().total_ticks, 3);
        assert_eq!(store.get("gone").unwrap().total_ticks, 4);
    }

    #[tokio::test]
    async fn test_refresh_all_isolates_failures() {
        let source = Arc::new(
            StaticTickSource::new()
                .with_user("a", ticks(1, 0))
                .with_user("b", ticks(3, 2))
                .with_user("c", Vec::new()),
        );
        let mut store = ActivityStore::new();
        tracked(&mut store, "a", 5);
        tracked(&mut store, "b", 5);
        tracked(&mut store, "c", 5);
        tracked(&mut store, "d", 5);
        let store = store.into_shared();
        let refresher = Refresher::new(source, store.clone(), 30);

        let report = refresher.refresh_all().await.unwrap();

        let refreshed: Vec<(&str, usize)> = report
            .refreshed
            .iter()
            .map(|r| (r.username.as_str(), r.tick_count))
            .collect();
        assert_eq!(refreshed, vec![("b", 3), ("a", 1)]);

        let failed: Vec<&str> = report.failed.iter().map(|f| f.username.as_str()).collect();
        assert_eq!(failed, vec!["c", "d"]);

        let store = store.read().await;
        assert_eq!(store.get("a").unwrap().total_ticks, 1);
        assert_eq!(store.get("b").unwrap().total_ticks, 5);
        assert_eq!(store.get("c").unwrap().total_ticks, 5);
        assert_eq!(store.get("d").unwrap().total_ticks, 5);

        let state = refresher.state().await;
        assert_eq!(state.status, RefreshStatus::Failed);
        assert_eq!(state.refreshed, 2);
        assert_eq!(state.errors.len(), 2);
        assert!(state.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_all_empty_store_completes() {
        let refresher = Refresher::new(
            Arc::new(StaticTickSource::new()),
            ActivityStore::new().into_shared(),
            30,
        );

        let report = refresher.refresh_all().await.unwrap();
        assert!(report.refreshed.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(refresher.state().await.status, RefreshStatus::Completed);
    }

    #[tokio::test]
    async fn test_refresh_persists_records() {
        let temp_dir = TempDir::new().unwrap();
        let records = Arc::new(RecordFile::from_config(&StorageConfig::new(
            temp_dir.path().to_path_buf(),
        )));
        let source = Arc::new(StaticTickSource::new().with_user("alex", ticks(2, 0)));
        let refresher = Refresher::new(source, ActivityStore::new().into_shared(), 30)
            .with_records(Arc::clone(&records));

        refresher
            .refresh_user(UserRef::new("100", "alex"))
            .await
            .unwrap();

        let loaded = records.load_store().unwrap();
        assert_eq!(loaded.get("alex").unwrap().total_ticks, 2);

        assert!(refresher.remove_user("alex").await.unwrap());
        assert!(!refresher.remove_user("alex").await.unwrap());
        assert!(records.load_store().unwrap().is_empty());
        assert!(refresher.store().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_user_removed_during_refresh_stays_removed() {
        let temp_dir = TempDir::new().unwrap();
        let records = Arc::new(RecordFile::from_config(&StorageConfig::new(
            temp_dir.path().to_path_buf(),
        )));
        let source = Arc::new(
            StaticTickSource::new()
                .with_user("gone", ticks(2, 0))
                .with_user("kept", ticks(1, 0))
                .with_delay(Duration::from_millis(200)),
        );
        let mut store = ActivityStore::new();
        tracked(&mut store, "gone", 3);
        tracked(&mut store, "kept", 3);
        for record in store.records() {
            records.save_user(record).unwrap();
        }
        let store = store.into_shared();
        let refresher =
            Refresher::new(source, store.clone(), 30).with_records(Arc::clone(&records));

        let running = refresher.clone();
        let handle = tokio::spawn(async move { running.refresh_all().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(refresher.remove_user("gone").await.unwrap());

        let report = handle.await.unwrap().unwrap();
        let refreshed: Vec<&str> = report.refreshed.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(refreshed, vec!["kept"]);
        assert!(report.failed.is_empty());

        assert!(!store.read().await.contains("gone"));
        let loaded = records.load_store().unwrap();
        assert!(!loaded.contains("gone"));
        assert_eq!(loaded.get("kept").unwrap().total_ticks, 1);
    }

    #[tokio::test]
    async fn test_apply_ticks_rejects_empty() {
        let refresher = Refresher::new(
            Arc::new(StaticTickSource::new()),
            ActivityStore::new().into_shared(),
            30,
        );

        let result = refresher.apply_ticks(UserRef::new("1", "x"), Vec::new()).await;
        assert!(matches!(result, Err(RefreshError::NoTicks(name)) if name == "x"));
        assert!(refresher.store().read().await.is_empty());
    }

    #[test]
    fn test_refresh_status_serialization() {
        let json = serde_json::to_string(&RefreshStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");

        let parsed: RefreshStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, RefreshStatus::Running);
    }

    #[test]
    fn test_report_serializes_duration_as_millis() {
        let report = RefreshReport {
            duration: Duration::from_millis(1500),
            ..RefreshReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["duration"], 1500);
        assert!(json["refreshed"].as_array().unwrap().is_empty());
    }
}
