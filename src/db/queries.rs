/// SQL query functions for database operations
///
/// All queries use sqlx for type safety. Engine writes that must be atomic
/// (mined note changes, generated tasks, score updates) run inside a single
/// transaction; a failure rolls the whole batch back and propagates.

use crate::db::models::*;
use crate::db::Database;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

impl Database {
    // ------------------------------------------------------------------
    // Activities
    // ------------------------------------------------------------------

    /// Record a single activity event
    ///
    /// # Arguments
    /// * `input` - Activity input data; `recorded_at = None` means "now"
    ///
    /// # Returns
    /// * `Ok(i64)` - The activity ID
    /// * `Err(EngineError)` - If the database operation fails
    pub async fn record_activity(&self, input: ActivityInput) -> Result<i64> {
        let recorded_at = input.recorded_at.unwrap_or_else(Utc::now);

        let result = sqlx::query(
            r#"
            INSERT INTO activities (user_id, activity_type, recorded_at)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.activity_type)
        .bind(recorded_at)
        .fetch_one(self.pool())
        .await?;

        Ok(result.get(0))
    }

    /// Get all activities for a user, oldest first.
    ///
    /// Ordering is stable: ascending by timestamp, ties broken by insertion
    /// id. The miner depends on this ordering.
    pub async fn list_activities_for_user(&self, user_id: &str) -> Result<Vec<Activity>> {
        let activities = sqlx::query_as::<_, Activity>(
            "SELECT * FROM activities WHERE user_id = ? ORDER BY recorded_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(activities)
    }

    // ------------------------------------------------------------------
    // Process notes
    // ------------------------------------------------------------------

    /// Look up a note by its natural key
    pub async fn find_note_by_user_and_description(
        &self,
        user_id: &str,
        description: &str,
    ) -> Result<Option<ProcessNote>> {
        let note = sqlx::query_as::<_, ProcessNote>(
            "SELECT * FROM process_notes WHERE user_id = ? AND steps_description = ?",
        )
        .bind(user_id)
        .bind(description)
        .fetch_optional(self.pool())
        .await?;

        Ok(note)
    }

    /// Get a note by ID
    pub async fn get_note_by_id(&self, id: i64) -> Result<Option<ProcessNote>> {
        let note = sqlx::query_as::<_, ProcessNote>("SELECT * FROM process_notes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(note)
    }

    /// List a user's notes, most recently observed first
    ///
    /// # Arguments
    /// * `min_occurrence` - Keep only notes seen at least this many times
    /// * `observed_since` - Keep only notes last observed at or after this
    pub async fn list_notes_by_user(
        &self,
        user_id: &str,
        min_occurrence: Option<i64>,
        observed_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProcessNote>> {
        let mut sql = String::from("SELECT * FROM process_notes WHERE user_id = ?");
        if min_occurrence.is_some() {
            sql.push_str(" AND occurrence_count >= ?");
        }
        if observed_since.is_some() {
            sql.push_str(" AND last_observed_at >= ?");
        }
        sql.push_str(" ORDER BY last_observed_at DESC, id DESC");

        let mut query = sqlx::query_as::<_, ProcessNote>(&sql).bind(user_id);
        if let Some(min) = min_occurrence {
            query = query.bind(min);
        }
        if let Some(since) = observed_since {
            query = query.bind(since);
        }

        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Persist one mining pass atomically.
    ///
    /// Inserts upsert against the `(user_id, steps_description)` natural key
    /// so a concurrent duplicate trigger cannot create a second note for the
    /// same sequence; the conflict arm refreshes statistics only and never
    /// touches `first_observed_at` or `source_activity_ids`.
    ///
    /// # Returns
    /// * `Ok((created, updated))` - Counts as computed by the caller's
    ///   read-then-decide pass
    pub async fn apply_mined_changes(
        &self,
        new_notes: Vec<NewProcessNote>,
        updates: Vec<NoteStatsUpdate>,
    ) -> Result<(usize, usize)> {
        let created = new_notes.len();
        let updated = updates.len();

        if created == 0 && updated == 0 {
            return Ok((0, 0));
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        for note in &new_notes {
            let source_ids = serde_json::to_string(&note.source_activity_ids)?;

            sqlx::query(
                r#"
                INSERT INTO process_notes (
                    user_id, inferred_task_name, steps_description,
                    source_activity_ids, occurrence_count,
                    first_observed_at, last_observed_at, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, steps_description) DO UPDATE SET
                    occurrence_count = excluded.occurrence_count,
                    last_observed_at = excluded.last_observed_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&note.user_id)
            .bind(&note.inferred_task_name)
            .bind(&note.steps_description)
            .bind(source_ids)
            .bind(note.occurrence_count)
            .bind(note.first_observed_at)
            .bind(note.last_observed_at)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for update in &updates {
            sqlx::query(
                r#"
                UPDATE process_notes
                SET occurrence_count = ?, last_observed_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(update.occurrence_count)
            .bind(update.last_observed_at)
            .bind(now)
            .bind(update.note_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok((created, updated))
    }

    /// Attach reviewer feedback to a note
    pub async fn set_note_feedback(&self, note_id: i64, feedback: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE process_notes SET user_feedback = ?, updated_at = ? WHERE id = ?",
        )
        .bind(feedback)
        .bind(Utc::now())
        .bind(note_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NoteNotFound(note_id));
        }

        Ok(())
    }

    /// Replace reviewer tags on a note
    pub async fn set_note_tags(&self, note_id: i64, tags: Vec<String>) -> Result<()> {
        let tags_json = serde_json::to_string(&tags)?;

        let result =
            sqlx::query("UPDATE process_notes SET user_tags = ?, updated_at = ? WHERE id = ?")
                .bind(tags_json)
                .bind(Utc::now())
                .bind(note_id)
                .execute(self.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NoteNotFound(note_id));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Get a task by ID
    pub async fn get_task_by_id(&self, id: i64) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(task)
    }

    /// Create a batch of tasks atomically, returning the created rows
    pub async fn create_tasks(&self, new_tasks: Vec<NewTask>) -> Result<Vec<Task>> {
        if new_tasks.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        let mut created = Vec::with_capacity(new_tasks.len());

        for task in &new_tasks {
            let row = sqlx::query_as::<_, Task>(
                r#"
                INSERT INTO tasks (
                    user_id, process_note_id, description, source_type,
                    source_identifier, priority_score, status,
                    due_date_inferred, notes, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(&task.user_id)
            .bind(task.process_note_id)
            .bind(&task.description)
            .bind(&task.source_type)
            .bind(&task.source_identifier)
            .bind(task.priority_score)
            .bind(task.status.to_string())
            .bind(task.due_date_inferred)
            .bind(&task.notes)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            created.push(row);
        }

        tx.commit().await?;

        Ok(created)
    }

    /// List a user's tasks linked to a note, filtered by status
    ///
    /// An empty status list matches nothing.
    pub async fn list_tasks_for_note(
        &self,
        user_id: &str,
        process_note_id: i64,
        statuses: &[TaskStatus],
    ) -> Result<Vec<Task>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT * FROM tasks WHERE user_id = ? AND process_note_id = ? AND status IN ({}) ORDER BY id ASC",
            placeholders
        );

        let mut query = sqlx::query_as::<_, Task>(&sql)
            .bind(user_id)
            .bind(process_note_id);
        for status in statuses {
            query = query.bind(status.to_string());
        }

        Ok(query.fetch_all(self.pool()).await?)
    }

    /// List a user's non-terminal tasks, highest priority first
    pub async fn list_open_tasks_for_user(&self, user_id: &str) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT * FROM tasks
            WHERE user_id = ? AND status NOT IN ('completed', 'archived')
            ORDER BY priority_score DESC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(tasks)
    }

    /// Persist a batch of priority score updates atomically
    pub async fn apply_priority_updates(&self, updates: &[(i64, f64)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        for (task_id, score) in updates {
            sqlx::query("UPDATE tasks SET priority_score = ?, updated_at = ? WHERE id = ?")
                .bind(score)
                .bind(now)
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Move a task to a new status.
    ///
    /// Terminal tasks are frozen; moving one is an invalid transition.
    pub async fn update_task_status(&self, task_id: i64, new_status: TaskStatus) -> Result<Task> {
        let task = self
            .get_task_by_id(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;

        let current = task.task_status();
        if current.is_terminal() {
            return Err(EngineError::InvalidStatusTransition {
                from: current.to_string(),
                to: new_status.to_string(),
            });
        }

        let updated = sqlx::query_as::<_, Task>(
            "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(new_status.to_string())
        .bind(Utc::now())
        .bind(task_id)
        .fetch_one(self.pool())
        .await?;

        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Preferences & feature flags
    // ------------------------------------------------------------------

    /// Get a preference value
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|r| r.get(0)))
    }

    /// Set a preference
    pub async fn set_preference(&self, key: String, value: String) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO preferences (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Check a feature flag. Flags default to enabled; only an explicit
    /// "false"/"off"/"0" disables one.
    pub async fn is_feature_enabled(&self, flag: &str) -> Result<bool> {
        let value = self.get_preference(&format!("feature.{}", flag)).await?;

        Ok(match value.as_deref() {
            Some("false") | Some("off") | Some("0") => false,
            _ => true,
        })
    }

    /// Turn a feature flag on or off
    pub async fn set_feature_enabled(&self, flag: &str, enabled: bool) -> Result<()> {
        self.set_preference(format!("feature.{}", flag), enabled.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn note_input(user: &str, description: &str, count: i64, last: DateTime<Utc>) -> NewProcessNote {
        NewProcessNote {
            user_id: user.to_string(),
            inferred_task_name: format!("Routine: {}", description),
            steps_description: description.to_string(),
            source_activity_ids: vec![1, 2, 3],
            occurrence_count: count,
            first_observed_at: last - Duration::days(7),
            last_observed_at: last,
        }
    }

    #[tokio::test]
    async fn test_record_and_list_activities() {
        let db = Database::new_test().await.unwrap();

        let base = Utc::now();
        for (i, label) in ["open_editor", "run_tests", "commit"].iter().enumerate() {
            db.record_activity(ActivityInput {
                user_id: "u1".to_string(),
                activity_type: label.to_string(),
                recorded_at: Some(base + Duration::minutes(i as i64)),
            })
            .await
            .unwrap();
        }

        let activities = db.list_activities_for_user("u1").await.unwrap();
        assert_eq!(activities.len(), 3);
        // Oldest first
        assert_eq!(activities[0].activity_type, "open_editor");
        assert_eq!(activities[2].activity_type, "commit");
    }

    #[tokio::test]
    async fn test_activity_tie_break_by_id() {
        let db = Database::new_test().await.unwrap();

        let ts = Utc::now();
        for label in ["first", "second"] {
            db.record_activity(ActivityInput {
                user_id: "u1".to_string(),
                activity_type: label.to_string(),
                recorded_at: Some(ts),
            })
            .await
            .unwrap();
        }

        let activities = db.list_activities_for_user("u1").await.unwrap();
        assert_eq!(activities[0].activity_type, "first");
        assert_eq!(activities[1].activity_type, "second");
    }

    #[tokio::test]
    async fn test_note_upsert_no_duplicates() {
        let db = Database::new_test().await.unwrap();
        let now = Utc::now();

        let (created, _) = db
            .apply_mined_changes(vec![note_input("u1", "a -> b -> c", 3, now)], vec![])
            .await
            .unwrap();
        assert_eq!(created, 1);

        // Same natural key again: conflict arm fires, still one row
        db.apply_mined_changes(vec![note_input("u1", "a -> b -> c", 5, now)], vec![])
            .await
            .unwrap();

        let notes = db.list_notes_by_user("u1", None, None).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].occurrence_count, 5);
    }

    #[tokio::test]
    async fn test_note_conflict_preserves_first_observed() {
        let db = Database::new_test().await.unwrap();
        let now = Utc::now();

        db.apply_mined_changes(vec![note_input("u1", "a -> b -> c", 3, now)], vec![])
            .await
            .unwrap();
        let original = db
            .find_note_by_user_and_description("u1", "a -> b -> c")
            .await
            .unwrap()
            .unwrap();

        let mut later = note_input("u1", "a -> b -> c", 4, now + Duration::days(1));
        later.first_observed_at = now + Duration::days(1);
        later.source_activity_ids = vec![9, 10, 11];
        db.apply_mined_changes(vec![later], vec![]).await.unwrap();

        let after = db
            .find_note_by_user_and_description("u1", "a -> b -> c")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.first_observed_at, original.first_observed_at);
        assert_eq!(after.get_source_activity_ids(), vec![1, 2, 3]);
        assert_eq!(after.occurrence_count, 4);
    }

    #[tokio::test]
    async fn test_list_notes_filters() {
        let db = Database::new_test().await.unwrap();
        let now = Utc::now();

        db.apply_mined_changes(
            vec![
                note_input("u1", "a -> b -> c", 10, now - Duration::days(40)),
                note_input("u1", "d -> e -> f", 4, now),
                note_input("u1", "g -> h -> i", 2, now),
            ],
            vec![],
        )
        .await
        .unwrap();

        let recent_strong = db
            .list_notes_by_user("u1", Some(3), Some(now - Duration::days(30)))
            .await
            .unwrap();
        assert_eq!(recent_strong.len(), 1);
        assert_eq!(recent_strong[0].steps_description, "d -> e -> f");
    }

    #[tokio::test]
    async fn test_note_feedback_and_tags() {
        let db = Database::new_test().await.unwrap();

        db.apply_mined_changes(vec![note_input("u1", "a -> b -> c", 3, Utc::now())], vec![])
            .await
            .unwrap();
        let note = db
            .find_note_by_user_and_description("u1", "a -> b -> c")
            .await
            .unwrap()
            .unwrap();

        db.set_note_feedback(note.id, "this one matters").await.unwrap();
        db.set_note_tags(note.id, vec!["weekly".to_string()]).await.unwrap();

        let updated = db.get_note_by_id(note.id).await.unwrap().unwrap();
        assert_eq!(updated.user_feedback.as_deref(), Some("this one matters"));
        assert_eq!(updated.get_user_tags(), vec!["weekly".to_string()]);

        let missing = db.set_note_feedback(9999, "nope").await;
        assert!(matches!(missing, Err(EngineError::NoteNotFound(9999))));
    }

    #[tokio::test]
    async fn test_create_and_list_tasks() {
        let db = Database::new_test().await.unwrap();

        let created = db
            .create_tasks(vec![NewTask {
                user_id: "u1".to_string(),
                process_note_id: None,
                description: "Review recurring routine".to_string(),
                source_type: "process_note".to_string(),
                source_identifier: None,
                priority_score: 0.7,
                status: TaskStatus::Suggested,
                due_date_inferred: None,
                notes: None,
            }])
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].task_status(), TaskStatus::Suggested);
        assert_eq!(created[0].priority_score, Some(0.7));

        let open = db.list_open_tasks_for_user("u1").await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn test_list_tasks_for_note_status_filter() {
        let db = Database::new_test().await.unwrap();

        db.apply_mined_changes(vec![note_input("u1", "a -> b -> c", 3, Utc::now())], vec![])
            .await
            .unwrap();
        let note = db
            .find_note_by_user_and_description("u1", "a -> b -> c")
            .await
            .unwrap()
            .unwrap();

        let created = db
            .create_tasks(vec![NewTask {
                user_id: "u1".to_string(),
                process_note_id: Some(note.id),
                description: "task".to_string(),
                source_type: "process_note".to_string(),
                source_identifier: Some(note.id.to_string()),
                priority_score: 0.5,
                status: TaskStatus::Suggested,
                due_date_inferred: None,
                notes: None,
            }])
            .await
            .unwrap();

        let active = db
            .list_tasks_for_note("u1", note.id, &TaskStatus::active_set())
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        db.update_task_status(created[0].id, TaskStatus::Completed)
            .await
            .unwrap();

        let active = db
            .list_tasks_for_note("u1", note.id, &TaskStatus::active_set())
            .await
            .unwrap();
        assert!(active.is_empty());

        // Empty filter matches nothing
        let none = db.list_tasks_for_note("u1", note.id, &[]).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_task_is_frozen() {
        let db = Database::new_test().await.unwrap();

        let created = db
            .create_tasks(vec![NewTask {
                user_id: "u1".to_string(),
                process_note_id: None,
                description: "task".to_string(),
                source_type: "process_note".to_string(),
                source_identifier: None,
                priority_score: 0.5,
                status: TaskStatus::Suggested,
                due_date_inferred: None,
                notes: None,
            }])
            .await
            .unwrap();

        db.update_task_status(created[0].id, TaskStatus::Archived)
            .await
            .unwrap();

        let result = db
            .update_task_status(created[0].id, TaskStatus::InProgress)
            .await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_priority_updates_persist() {
        let db = Database::new_test().await.unwrap();

        let created = db
            .create_tasks(vec![NewTask {
                user_id: "u1".to_string(),
                process_note_id: None,
                description: "task".to_string(),
                source_type: "process_note".to_string(),
                source_identifier: None,
                priority_score: 0.5,
                status: TaskStatus::Suggested,
                due_date_inferred: None,
                notes: None,
            }])
            .await
            .unwrap();

        db.apply_priority_updates(&[(created[0].id, 0.9)]).await.unwrap();

        let task = db.get_task_by_id(created[0].id).await.unwrap().unwrap();
        assert_eq!(task.priority_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_feature_flags() {
        let db = Database::new_test().await.unwrap();

        // Default: enabled
        assert!(db.is_feature_enabled("smart_prioritization").await.unwrap());

        db.set_feature_enabled("smart_prioritization", false)
            .await
            .unwrap();
        assert!(!db.is_feature_enabled("smart_prioritization").await.unwrap());

        db.set_feature_enabled("smart_prioritization", true)
            .await
            .unwrap();
        assert!(db.is_feature_enabled("smart_prioritization").await.unwrap());
    }
}
