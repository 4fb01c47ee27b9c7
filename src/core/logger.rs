// Records activity events to the database
//
// Filters out noise events and malformed labels before they pollute the
// history the miner reads.

use crate::db::{ActivityInput, Database};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

// Nobody needs a 10KB activity label
const MAX_LABEL_LENGTH: usize = 200;

// Machine noise that says nothing about behavior
const IGNORE_LIST: &[&str] = &["heartbeat", "ping", "keepalive", "noop", "idle"];

pub struct ActivityLogger {
    db: Arc<Database>,
}

impl ActivityLogger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // Main logging function. Checks the label is sane, cleans it up, saves it.
    pub async fn log(
        &self,
        user_id: &str,
        activity_type: &str,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.validate_label(activity_type)?;

        let sanitized = self.sanitize_label(activity_type);

        let id = self
            .db
            .record_activity(ActivityInput {
                user_id: user_id.to_string(),
                activity_type: sanitized,
                recorded_at,
            })
            .await?;

        Ok(id)
    }

    // Check the label is usable (not empty, not huge)
    fn validate_label(&self, label: &str) -> Result<()> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidActivity("empty label".to_string()));
        }

        if trimmed.len() > MAX_LABEL_LENGTH {
            return Err(EngineError::ActivityTooLong(MAX_LABEL_LENGTH));
        }

        Ok(())
    }

    /// Sanitize an activity label
    ///
    /// - Removes null bytes
    /// - Trims whitespace
    /// - Normalizes whitespace (multiple spaces to single)
    fn sanitize_label(&self, label: &str) -> String {
        label
            .replace('\0', "")
            .trim()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Check if an event should be skipped entirely.
    ///
    /// Heartbeats and similar machine noise would show up as bogus
    /// "recurring behavior" if they reached the history.
    pub fn should_ignore(&self, label: &str) -> bool {
        let trimmed = label.trim();

        if trimmed.len() < 2 {
            return true;
        }

        IGNORE_LIST.contains(&trimmed.to_lowercase().as_str())
    }

    /// Batch-import labels for one user, oldest first.
    ///
    /// Useful for seeding from an existing event log. Bad rows are skipped,
    /// not fatal.
    pub async fn log_batch(&self, user_id: &str, labels: Vec<String>) -> Result<Vec<i64>> {
        let mut ids = Vec::new();

        for label in labels {
            if self.should_ignore(&label) {
                continue;
            }

            match self.log(user_id, &label, None).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!(label = %label, error = %e, "skipped activity during import");
                }
            }
        }

        Ok(ids)
    }
}
