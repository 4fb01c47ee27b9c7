// Re-scores a user's open tasks
//
// Heuristics over due dates, urgency/importance keywords, and status. Always
// returns the full preview; persisting is opt-in per call.

use crate::db::{Database, ScoreAdjustment, Task, TaskStatus};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Feature flag gating prioritization
pub const PRIORITIZATION_FLAG: &str = "smart_prioritization";

/// Fallback when a task has no stored score yet
const DEFAULT_SCORE: f64 = 0.5;

/// Keyword bonuses; both can apply to the same task
const URGENCY_BONUS: f64 = 0.15;
const IMPORTANCE_BONUS: f64 = 0.10;

/// Status nudges
const IN_PROGRESS_BONUS: f64 = 0.05;
const SUGGESTED_PENALTY: f64 = 0.05;

/// Score changes smaller than this are not worth a write
const SCORE_EPSILON: f64 = 1e-6;

pub struct TaskPrioritizer {
    db: Arc<Database>,
    urgency: Regex,
    importance: Regex,
}

impl TaskPrioritizer {
    pub fn new(db: Arc<Database>) -> Self {
        // Compiled once; the patterns are static so this cannot fail
        let urgency = Regex::new(r"(?i)\b(urgent|asap|critical|immediately)\b").unwrap();
        let importance = Regex::new(r"(?i)\b(important|essential)\b").unwrap();

        Self {
            db,
            urgency,
            importance,
        }
    }

    /// Verify the prioritization gate is on.
    ///
    /// Callers are expected to check before invoking `reprioritize`; this is
    /// the check, and it raises rather than silently no-ops.
    pub async fn ensure_enabled(&self) -> Result<()> {
        if self.db.is_feature_enabled(PRIORITIZATION_FLAG).await? {
            Ok(())
        } else {
            Err(EngineError::FeatureDisabled(PRIORITIZATION_FLAG.to_string()))
        }
    }

    /// Re-score every non-terminal task of a user.
    ///
    /// Assumes the caller is authorized once invoked. Returns original and
    /// suggested score for every considered task whether or not changes are
    /// applied; with `apply_changes`, scores that moved more than a
    /// negligible epsilon are persisted in one transaction.
    pub async fn reprioritize(
        &self,
        user_id: &str,
        apply_changes: bool,
    ) -> Result<Vec<ScoreAdjustment>> {
        let tasks = self.db.list_open_tasks_for_user(user_id).await?;
        let now = Utc::now();

        let mut adjustments = Vec::with_capacity(tasks.len());
        let mut to_persist = Vec::new();

        for task in &tasks {
            let original = task.priority_score.unwrap_or(DEFAULT_SCORE);
            let suggested = self.score_task(task, original, now);

            if (suggested - original).abs() > SCORE_EPSILON {
                debug!(task = task.id, original, suggested, "score adjusted");
                if apply_changes {
                    to_persist.push((task.id, suggested));
                }
            }

            adjustments.push(ScoreAdjustment {
                task_id: task.id,
                original_score: original,
                suggested_score: suggested,
            });
        }

        self.db.apply_priority_updates(&to_persist).await?;

        info!(
            user = %user_id,
            considered = adjustments.len(),
            persisted = to_persist.len(),
            "reprioritization complete"
        );

        Ok(adjustments)
    }

    fn score_task(&self, task: &Task, base: f64, now: DateTime<Utc>) -> f64 {
        let mut score = base;

        score += due_date_bonus(task.due_date_inferred, now);

        let text = match task.notes.as_deref() {
            Some(notes) => format!("{} {}", task.description, notes),
            None => task.description.clone(),
        };
        if self.urgency.is_match(&text) {
            score += URGENCY_BONUS;
        }
        if self.importance.is_match(&text) {
            score += IMPORTANCE_BONUS;
        }

        match task.task_status() {
            TaskStatus::InProgress => score += IN_PROGRESS_BONUS,
            TaskStatus::Suggested => score -= SUGGESTED_PENALTY,
            _ => {}
        }

        score.clamp(0.0, 1.0)
    }
}

/// Due-date bonus ladder: the closer (or further overdue) the date, the
/// larger the bonus, with overdue strictly above due-today. No due date
/// contributes nothing.
fn due_date_bonus(due: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(due) = due else {
        return 0.0;
    };

    let days_until = (due.date_naive() - now.date_naive()).num_days();
    match days_until {
        d if d < 0 => 0.25, // overdue
        0 => 0.20,          // due today
        1 => 0.15,          // due tomorrow
        2..=3 => 0.10,
        4..=7 => 0.05,
        _ => 0.0,
    }
}
