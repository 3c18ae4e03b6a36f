//! Core data structures for tasks.
//!
//! A [`Task`] is the only persisted entity. [`StoredTask`] is the lenient
//! on-disk shape that also accepts records written by older versions.
use std::fmt;

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{RemindError, Result};

/// Opaque task identifier, unique for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = RemindError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| RemindError::InvalidTask {
                message: format!("'{}' is not a valid task id", s),
            })
    }
}

/// Represents a single reminder task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier, assigned by the store
    pub id: TaskId,
    /// User supplied title, never empty
    pub title: String,
    /// Local moment the reminder fires, milliseconds since the epoch
    pub due_at: i64,
    /// Whether delivery has been attempted; never reset once set
    pub fired: bool,
    /// Creation time, milliseconds since the epoch
    pub created_at: i64,
}

impl Task {
    /// Creates a new unfired task. The title is trimmed and must not be empty.
    pub fn new(id: TaskId, title: &str, due_at: i64) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RemindError::InvalidTask {
                message: "title must not be empty".to_string(),
            });
        }

        Ok(Task {
            id,
            title: title.to_string(),
            due_at,
            fired: false,
            created_at: now_millis(),
        })
    }

    /// Milliseconds until the task is due; zero or negative once it has passed.
    pub fn millis_until_due(&self, now: i64) -> i64 {
        self.due_at.saturating_sub(now)
    }

    /// True for an unfired task whose due time has already passed.
    pub fn is_missed(&self, now: i64) -> bool {
        !self.fired && self.due_at <= now
    }

    /// Due time rendered in local wall-clock time.
    pub fn due_local(&self) -> String {
        match Local.timestamp_millis_opt(self.due_at) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                dt.format("%Y-%m-%d %H:%M").to_string()
            }
            LocalResult::None => format!("@{}", self.due_at),
        }
    }
}

/// On-disk record shape accepting both the current layout and legacy ones.
///
/// Legacy records carry `name` instead of `title`, an ISO `dateTime` or
/// separate `date`/`time` strings instead of `dueAt`, and `notified`
/// instead of `fired`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTask {
    pub id: Option<TaskId>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub due_at: Option<i64>,
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub fired: Option<bool>,
    pub notified: Option<bool>,
    pub created_at: Option<i64>,
}

impl StoredTask {
    /// True when the record is already in the canonical layout.
    pub fn is_canonical(&self) -> bool {
        self.id.is_some()
            && self.title.is_some()
            && self.due_at.is_some()
            && self.fired.is_some()
            && self.created_at.is_some()
    }

    /// Converts the record into a [`Task`], deriving `dueAt` when missing.
    pub fn normalize(self) -> Result<Task> {
        let id = self.id.ok_or_else(|| RemindError::InvalidTask {
            message: "record has no id".to_string(),
        })?;

        let title = self
            .title
            .or(self.name)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RemindError::InvalidTask {
                message: format!("record {} has no title", id),
            })?;

        let due_at = match (self.due_at, &self.date_time, &self.date, &self.time) {
            (Some(due_at), _, _, _) => due_at,
            (None, Some(date_time), _, _) => DateTime::parse_from_rfc3339(date_time)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| RemindError::InvalidTask {
                    message: format!("record {} has an unreadable dateTime: {}", id, e),
                })?,
            (None, None, Some(date), Some(time)) => local_due_millis(date, time)?,
            _ => {
                return Err(RemindError::InvalidTask {
                    message: format!("record {} has no due time", id),
                })
            }
        };

        Ok(Task {
            id,
            title,
            due_at,
            fired: self.fired.or(self.notified).unwrap_or(false),
            created_at: self.created_at.unwrap_or(due_at),
        })
    }
}

/// Combines separately entered date and time fields as local time.
///
/// Accepts `YYYY-MM-DD` and `HH:MM` (or `HH:MM:SS`). Ambiguous local times
/// resolve to the earlier instant; times inside a DST gap are rejected.
pub fn local_due_millis(date: &str, time: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
        RemindError::InvalidTask {
            message: format!("invalid date '{}': {}", date, e),
        }
    })?;

    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|e| RemindError::InvalidTask {
            message: format!("invalid time '{}': {}", time, e),
        })?;

    let naive = NaiveDateTime::new(date, time);
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt.timestamp_millis()),
        LocalResult::None => Err(RemindError::InvalidTask {
            message: format!("{} does not exist in the local timezone", naive),
        }),
    }
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
