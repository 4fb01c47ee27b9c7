/// Data models for database entities
///
/// All models map to database tables and use sqlx for type-safe queries.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One timestamped, categorized event in a user's behavioral log.
/// Owned by the logging side; the mining engine never mutates these.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: i64,
    pub user_id: String,
    pub activity_type: String,
    pub recorded_at: DateTime<Utc>,
}

/// Input for recording a new activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityInput {
    pub user_id: String,
    pub activity_type: String,
    /// None means "now"
    pub recorded_at: Option<DateTime<Utc>>,
}

/// A persisted recurring sequence for one user.
///
/// `steps_description` together with `user_id` is the natural key; the
/// schema enforces it with a UNIQUE constraint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessNote {
    pub id: i64,
    pub user_id: String,
    pub inferred_task_name: String,
    pub steps_description: String,
    pub source_activity_ids: String, // JSON array of activity ids
    pub occurrence_count: i64,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
    pub user_feedback: Option<String>,
    pub user_tags: Option<String>, // JSON array
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessNote {
    /// Parse source activity ids from JSON
    pub fn get_source_activity_ids(&self) -> Vec<i64> {
        serde_json::from_str(&self.source_activity_ids).unwrap_or_default()
    }

    /// Parse reviewer tags from JSON
    pub fn get_user_tags(&self) -> Vec<String> {
        self.user_tags
            .as_ref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}

/// Input for creating a process note (miner output)
#[derive(Debug, Clone)]
pub struct NewProcessNote {
    pub user_id: String,
    pub inferred_task_name: String,
    pub steps_description: String,
    pub source_activity_ids: Vec<i64>,
    pub occurrence_count: i64,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

/// Statistics refresh for an existing note. Only these two fields are ever
/// rewritten by the miner; first_observed_at and source ids are immutable.
#[derive(Debug, Clone)]
pub struct NoteStatsUpdate {
    pub note_id: i64,
    pub occurrence_count: i64,
    pub last_observed_at: DateTime<Utc>,
}

/// Task lifecycle states. `completed` and `archived` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Suggested,
    Accepted,
    InProgress,
    Completed,
    Archived,
}

impl TaskStatus {
    /// Statuses considered "still live" for the one-active-task-per-note rule
    pub fn active_set() -> Vec<TaskStatus> {
        vec![
            TaskStatus::Suggested,
            TaskStatus::Accepted,
            TaskStatus::InProgress,
        ]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Archived)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Suggested => "suggested",
            TaskStatus::Accepted => "accepted",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suggested" => Ok(TaskStatus::Suggested),
            "accepted" => Ok(TaskStatus::Accepted),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "archived" => Ok(TaskStatus::Archived),
            other => Err(EngineError::InvalidStatus(other.to_string())),
        }
    }
}

/// An actionable recommendation, optionally traced back to the note that
/// spawned it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub process_note_id: Option<i64>,
    pub description: String,
    pub source_type: String,
    pub source_identifier: Option<String>,
    pub priority_score: Option<f64>,
    pub status: String,
    pub due_date_inferred: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Typed view of the stored status string. The schema CHECK constraint
    /// keeps the column within the valid set, so the fallback is unreachable
    /// for rows this crate wrote.
    pub fn task_status(&self) -> TaskStatus {
        self.status.parse().unwrap_or(TaskStatus::Suggested)
    }
}

/// Input for creating a new task (generator output)
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: String,
    pub process_note_id: Option<i64>,
    pub description: String,
    pub source_type: String,
    pub source_identifier: Option<String>,
    pub priority_score: f64,
    pub status: TaskStatus,
    pub due_date_inferred: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// One row of prioritizer output: what the score was, what it should be.
/// Returned for every considered task so callers can preview before
/// committing.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreAdjustment {
    pub task_id: i64,
    pub original_score: f64,
    pub suggested_score: f64,
}

/// Fuzzy search hit over process notes
#[derive(Debug, Clone, Serialize)]
pub struct NoteMatch {
    pub note: ProcessNote,
    pub score: f64, // Fuzzy match score
}
