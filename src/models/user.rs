//! Tracked climber models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{sort_ticks_desc, Tick};

/// External identity of a climber on the climbing database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: String,
    pub username: String,
}

impl UserRef {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }

    /// Extract the user from a profile URL such as
    /// `https://www.mountainproject.com/user/110713768/crag-cat`.
    pub fn from_profile_url(profile_url: &str) -> Option<Self> {
        let url = Url::parse(profile_url.trim()).ok()?;
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        // Skip anything before the "user" segment
        segments.by_ref().find(|s| *s == "user")?;

        let user_id = segments.next()?;
        let username = segments.next()?;
        if !user_id.chars().all(|c| c.is_ascii_digit()) || !is_valid_username(username) {
            return None;
        }

        Some(Self::new(user_id, username))
    }
}

/// Whether `name` can be used as a username. Usernames double as file
/// names for directory sources, so path syntax is refused.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Everything known about one tracked climber.
///
/// `all_ticks` is kept most-recent-first and `total_ticks` always equals
/// its length; both are established by [`UserActivityRecord::new`], which
/// deserialization also goes through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRecord")]
pub struct UserActivityRecord {
    pub user_id: String,
    pub username: String,
    pub last_refresh_time: DateTime<Utc>,
    pub total_ticks: usize,
    pub all_ticks: Vec<Tick>,
}

/// Persisted shape. `totalTicks` is ignored on read and recomputed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    user_id: String,
    username: String,
    last_refresh_time: DateTime<Utc>,
    #[serde(default)]
    all_ticks: Vec<Tick>,
}

impl From<StoredRecord> for UserActivityRecord {
    fn from(stored: StoredRecord) -> Self {
        Self::new(
            UserRef::new(stored.user_id, stored.username),
            stored.all_ticks,
            stored.last_refresh_time,
        )
    }
}

impl UserActivityRecord {
    /// Build a record from a freshly ingested tick set.
    pub fn new(user: UserRef, mut ticks: Vec<Tick>, refreshed_at: DateTime<Utc>) -> Self {
        sort_ticks_desc(&mut ticks);
        Self {
            user_id: user.user_id,
            username: user.username,
            last_refresh_time: refreshed_at,
            total_ticks: ticks.len(),
            all_ticks: ticks,
        }
    }

    pub fn user_ref(&self) -> UserRef {
        UserRef::new(self.user_id.clone(), self.username.clone())
    }

    /// The most recent `n` ticks.
    pub fn latest(&self, n: usize) -> &[Tick] {
        &self.all_ticks[..n.min(self.all_ticks.len())]
    }

    /// Date of the most recent tick, as exported.
    pub fn last_tick_date(&self) -> Option<&str> {
        self.all_ticks.first().map(|t| t.date.as_str())
    }
}
