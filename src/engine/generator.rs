// Turns strong, recently-observed process notes into suggested tasks
//
// A note qualifies when it has been seen often enough and recently enough
// and no live task already points at it.

use crate::db::{Database, NewTask, ProcessNote, Task, TaskStatus};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Occurrence count at which the occurrence term of the priority saturates
const OCCURRENCE_SATURATION: f64 = 50.0;

/// Days after which the recency term of the priority decays to zero
const RECENCY_HORIZON_DAYS: f64 = 90.0;

/// Longest steps description quoted verbatim in task text
const MAX_DESCRIPTION_CHARS: usize = 80;

/// Generation parameters
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub min_occurrence: i64,
    pub recency_days: i64,
    /// Statuses that count as "already has a live task"
    pub active_statuses: Vec<TaskStatus>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_occurrence: 3,
            recency_days: 30,
            active_statuses: TaskStatus::active_set(),
        }
    }
}

pub struct TaskGenerator {
    db: Arc<Database>,
}

impl TaskGenerator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create suggested tasks for a user's qualifying process notes.
    ///
    /// Candidates are ordered most-recently-observed first. Notes that
    /// already have a task in one of `active_statuses` are skipped, which is
    /// what enforces the at-most-one-active-task-per-note rule. All inserts
    /// happen in one transaction.
    ///
    /// # Returns
    /// * `Ok(Vec<Task>)` - The created tasks; empty when nothing qualifies
    pub async fn generate(&self, user_id: &str, config: &GeneratorConfig) -> Result<Vec<Task>> {
        let now = Utc::now();
        let cutoff = now - Duration::days(config.recency_days);

        let candidates = self
            .db
            .list_notes_by_user(user_id, Some(config.min_occurrence), Some(cutoff))
            .await?;

        let mut new_tasks = Vec::new();
        for note in &candidates {
            let active = self
                .db
                .list_tasks_for_note(user_id, note.id, &config.active_statuses)
                .await?;
            if !active.is_empty() {
                debug!(note = note.id, "note already covered by a live task");
                continue;
            }

            new_tasks.push(NewTask {
                user_id: user_id.to_string(),
                process_note_id: Some(note.id),
                description: task_description(note),
                source_type: "process_note".to_string(),
                source_identifier: Some(note.id.to_string()),
                priority_score: compute_priority(note.occurrence_count, note.last_observed_at, now),
                status: TaskStatus::Suggested,
                due_date_inferred: None,
                notes: Some(audit_note(note)),
            });
        }

        let created = self.db.create_tasks(new_tasks).await?;

        info!(
            user = %user_id,
            candidates = candidates.len(),
            created = created.len(),
            "task generation complete"
        );

        Ok(created)
    }
}

/// Priority for a freshly suggested task.
///
/// A 0.1 floor so nothing scores zero, up to 0.6 from how often the sequence
/// occurs (saturating at 50), and up to 0.4 from how recently it was last
/// observed (decaying linearly to zero at 90 days). Always in `[0.0, 1.0]`.
pub fn compute_priority(
    occurrence_count: i64,
    last_observed_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let occurrence = (occurrence_count as f64 / OCCURRENCE_SATURATION).min(1.0);

    let days_since = (now - last_observed_at).num_seconds() as f64 / 86_400.0;
    let recency = ((RECENCY_HORIZON_DAYS - days_since) / RECENCY_HORIZON_DAYS).max(0.0);

    (0.1 + 0.6 * occurrence + 0.4 * recency).clamp(0.0, 1.0)
}

/// Task text shown to the user: the inferred name when the miner produced
/// one, otherwise the (truncated) raw sequence.
fn task_description(note: &ProcessNote) -> String {
    let name = note.inferred_task_name.trim();
    if !name.is_empty() {
        return name.to_string();
    }

    format!("Follow up on routine: {}", truncate(&note.steps_description))
}

/// Audit trail recorded on the task itself
fn audit_note(note: &ProcessNote) -> String {
    format!(
        "Suggested from recurring sequence '{}': observed {} times, last seen {}",
        truncate(&note.steps_description),
        note.occurrence_count,
        note.last_observed_at.format("%Y-%m-%d")
    )
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text.to_string();
    }

    let head: String = text.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewProcessNote;

    async fn seed_note(
        db: &Database,
        user: &str,
        description: &str,
        count: i64,
        last_observed_at: DateTime<Utc>,
    ) -> ProcessNote {
        db.apply_mined_changes(
            vec![NewProcessNote {
                user_id: user.to_string(),
                inferred_task_name: format!("Routine: {}", description),
                steps_description: description.to_string(),
                source_activity_ids: vec![1, 2, 3],
                occurrence_count: count,
                first_observed_at: last_observed_at - Duration::days(14),
                last_observed_at,
            }],
            vec![],
        )
        .await
        .unwrap();

        db.find_note_by_user_and_description(user, description)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_creates_suggested_task() {
        let db = Arc::new(Database::new_test().await.unwrap());
        let note = seed_note(&db, "u1", "a -> b -> c", 5, Utc::now() - Duration::days(1)).await;

        let generator = TaskGenerator::new(Arc::clone(&db));
        let created = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        let task = &created[0];
        assert_eq!(task.task_status(), TaskStatus::Suggested);
        assert_eq!(task.process_note_id, Some(note.id));
        assert_eq!(task.source_type, "process_note");
        assert_eq!(task.source_identifier.as_deref(), Some(note.id.to_string().as_str()));
        assert!(task.notes.as_deref().unwrap().contains("observed 5 times"));

        let score = task.priority_score.unwrap();
        assert!(score > 0.0 && score <= 1.0);
    }

    #[tokio::test]
    async fn test_no_duplicate_active_task() {
        let db = Arc::new(Database::new_test().await.unwrap());
        seed_note(&db, "u1", "a -> b -> c", 5, Utc::now() - Duration::days(1)).await;

        let generator = TaskGenerator::new(Arc::clone(&db));
        let first = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Nothing changed in between: second run must create nothing
        let second = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_completed_task_frees_the_note() {
        let db = Arc::new(Database::new_test().await.unwrap());
        seed_note(&db, "u1", "a -> b -> c", 5, Utc::now() - Duration::days(1)).await;

        let generator = TaskGenerator::new(Arc::clone(&db));
        let first = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();

        db.update_task_status(first[0].id, TaskStatus::Completed)
            .await
            .unwrap();

        let second = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_note_is_excluded() {
        let db = Arc::new(Database::new_test().await.unwrap());
        // Strong but stale: 10 occurrences, last seen 40 days ago
        seed_note(&db, "u1", "a -> b -> c", 10, Utc::now() - Duration::days(40)).await;

        let generator = TaskGenerator::new(Arc::clone(&db));
        let created = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();

        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_weak_note_is_excluded() {
        let db = Arc::new(Database::new_test().await.unwrap());
        seed_note(&db, "u1", "a -> b -> c", 2, Utc::now() - Duration::days(1)).await;

        let generator = TaskGenerator::new(Arc::clone(&db));
        let created = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();

        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_candidates_ordered_most_recent_first() {
        let db = Arc::new(Database::new_test().await.unwrap());
        seed_note(&db, "u1", "old -> old -> old", 5, Utc::now() - Duration::days(10)).await;
        seed_note(&db, "u1", "new -> new -> new", 5, Utc::now() - Duration::days(1)).await;

        let generator = TaskGenerator::new(Arc::clone(&db));
        let created = generator
            .generate("u1", &GeneratorConfig::default())
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert!(created[0].description.contains("new"));
        assert!(created[1].description.contains("old"));
    }

    #[test]
    fn test_priority_bounds() {
        let now = Utc::now();
        for count in [0, 1, 3, 50, 500] {
            for days in [0, 1, 45, 90, 400] {
                let score = compute_priority(count, now - Duration::days(days), now);
                assert!((0.0..=1.0).contains(&score), "score {} out of bounds", score);
            }
        }
    }

    #[test]
    fn test_priority_occurrence_saturates() {
        let now = Utc::now();
        let last = now - Duration::days(1);
        let at_saturation = compute_priority(50, last, now);
        let beyond = compute_priority(5000, last, now);
        assert_eq!(at_saturation, beyond);
    }

    #[test]
    fn test_priority_recency_decays_to_floor() {
        let now = Utc::now();
        // Past the 90-day horizon only the floor and occurrence terms remain
        let stale = compute_priority(5, now - Duration::days(120), now);
        let expected = 0.1 + 0.6 * (5.0 / 50.0);
        assert!((stale - expected).abs() < 1e-9);
    }

    #[test]
    fn test_priority_prefers_recent() {
        let now = Utc::now();
        let fresh = compute_priority(5, now - Duration::days(1), now);
        let older = compute_priority(5, now - Duration::days(60), now);
        assert!(fresh > older);
    }

    #[test]
    fn test_truncate_long_descriptions() {
        let long = "x".repeat(200);
        let short = truncate(&long);
        assert_eq!(short.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(short.ends_with("..."));
        assert_eq!(truncate("a -> b"), "a -> b");
    }
}
