//! In-memory activity store.
//!
//! Holds one [`UserActivityRecord`] per username. Records are shared as
//! `Arc`s and only ever replaced whole, so a reader holding a record never
//! sees it change underneath.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::UserActivityRecord;

/// Store shared between request handlers and the refresher.
pub type SharedStore = Arc<RwLock<ActivityStore>>;

/// Username → record, in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct ActivityStore {
    records: Vec<Arc<UserActivityRecord>>,
    index: HashMap<String, usize>,
}

impl ActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from loaded records. Later duplicates replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = UserActivityRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// Insert a user's record, or replace it wholesale if the username is known.
    /// A replaced user keeps its original position.
    pub fn upsert(&mut self, record: UserActivityRecord) -> Option<Arc<UserActivityRecord>> {
        let record = Arc::new(record);
        match self.index.get(&record.username) {
            Some(&i) => {
                debug!("Replacing record for {}", record.username);
                Some(std::mem::replace(&mut self.records[i], record))
            }
            None => {
                debug!("Adding record for {}", record.username);
                self.index.insert(record.username.clone(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    /// Remove a user. Returns the removed record.
    pub fn remove(&mut self, username: &str) -> Option<Arc<UserActivityRecord>> {
        let i = self.index.remove(username)?;
        let removed = self.records.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, username: &str) -> Option<&Arc<UserActivityRecord>> {
        self.index.get(username).map(|&i| &self.records[i])
    }

    pub fn contains(&self, username: &str) -> bool {
        self.index.contains_key(username)
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &UserActivityRecord> {
        self.records.iter().map(Arc::as_ref)
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.username.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
