//! Persisted user records.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use super::jsonl::{JsonlReader, JsonlWriter};
use super::{StorageConfig, StorageError};
use crate::models::UserActivityRecord;
use crate::store::ActivityStore;

/// The users file. Writes are serialized and always rewrite the whole file.
pub struct RecordFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.users_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no broken state
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> Result<Vec<UserActivityRecord>, StorageError> {
        JsonlReader::new(self.path.clone()).read_all()
    }

    fn write(&self, records: &[UserActivityRecord]) -> Result<usize, StorageError> {
        JsonlWriter::new(self.path.clone()).write_all(records)
    }

    /// Load every persisted user into a fresh store.
    pub fn load_store(&self) -> Result<ActivityStore, StorageError> {
        let records = self.read()?;
        let store = ActivityStore::from_records(records);
        info!("Loaded {} users from {:?}", store.len(), self.path);
        Ok(store)
    }

    /// Persist one user, replacing any line with the same username.
    pub fn save_user(&self, record: &UserActivityRecord) -> Result<(), StorageError> {
        let _guard = self.lock();

        let mut records = self.read()?;
        match records.iter_mut().find(|r| r.username == record.username) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.write(&records)?;
        Ok(())
    }

    /// Drop a user from the file. Returns whether it was present.
    pub fn remove_user(&self, username: &str) -> Result<bool, StorageError> {
        let _guard = self.lock();

        let mut records = self.read()?;
        let before = records.len();
        records.retain(|r| r.username != username);
        if records.len() == before {
            return Ok(false);
        }
        self.write(&records)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tick, UserRef};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(username: &str, routes: &[&str]) -> UserActivityRecord {
        let ticks = routes
            .iter()
            .map(|r| Tick::new("2024-06-01", *r).with_rating("5.10a"))
            .collect();
        let at = Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap();
        UserActivityRecord::new(UserRef::new("200", username), ticks, at)
    }

    fn record_file(temp_dir: &TempDir) -> RecordFile {
        RecordFile::from_config(&StorageConfig::new(temp_dir.path().to_path_buf()))
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let file = record_file(&temp_dir);

        assert!(file.load_store().unwrap().is_empty());
    }

    #[test]
    fn test_save_user_appends_then_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let file = record_file(&temp_dir);

        file.save_user(&record("alex", &["A"])).unwrap();
        file.save_user(&record("blake", &["B"])).unwrap();
        file.save_user(&record("alex", &["A", "C"])).unwrap();

        let store = file.load_store().unwrap();
        let names: Vec<&str> = store.usernames().collect();
        assert_eq!(names, vec!["alex", "blake"]);
        assert_eq!(store.get("alex").unwrap().total_ticks, 2);
    }

    #[test]
    fn test_records_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let file = record_file(&temp_dir);
        let original = record("alex", &["Crack", "Slab"]);

        file.save_user(&original).unwrap();

        let store = file.load_store().unwrap();
        assert_eq!(store.get("alex").unwrap().as_ref(), &original);
    }

    #[test]
    fn test_remove_user() {
        let temp_dir = TempDir::new().unwrap();
        let file = record_file(&temp_dir);
        file.save_user(&record("alex", &["A"])).unwrap();
        file.save_user(&record("blake", &["B"])).unwrap();

        assert!(file.remove_user("alex").unwrap());
        assert!(!file.remove_user("alex").unwrap());

        let store = file.load_store().unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("blake"));
    }

    #[test]
    fn test_record_missing_ticks_loads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let file = record_file(&temp_dir);
        std::fs::write(
            file.path(),
            r#"{"userId":"7","username":"ghost","lastRefreshTime":"2024-06-01T00:00:00Z"}
"#,
        )
        .unwrap();

        let store = file.load_store().unwrap();
        let ghost = store.get("ghost").unwrap();
        assert_eq!(ghost.total_ticks, 0);
        assert!(ghost.all_ticks.is_empty());
    }

    #[test]
    fn test_unsorted_record_without_count_is_normalized_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = record_file(&temp_dir);
        std::fs::write(
            file.path(),
            r#"{"userId":"8","username":"legacy","lastRefreshTime":"2024-06-11T00:00:00Z","allTicks":[{"date":"2024-06-01","route":"First"},{"date":"2024-06-10","route":"Latest"}]}
"#,
        )
        .unwrap();

        let store = file.load_store().unwrap();
        let legacy = store.get("legacy").unwrap();
        assert_eq!(legacy.total_ticks, 2);
        assert_eq!(legacy.last_tick_date(), Some("2024-06-10"));

        let now = chrono::NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        let ranking = crate::calculate::recent_activity_counts(&store, now, 30);
        assert_eq!(ranking.ranked[0].last_tick_date.as_deref(), Some("2024-06-10"));
    }
}
