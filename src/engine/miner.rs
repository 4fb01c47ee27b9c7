// Finds recurring sequences in a user's activity log
//
// Like when someone always opens the editor, runs the tests, then commits.
// Sequences seen often enough get persisted as process notes.

use crate::db::{Activity, Database, NewProcessNote, NoteStatsUpdate};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Mining parameters. Windows of every length in `[min_len, max_len]` are
/// enumerated independently, so a long recurring pattern also registers as
/// its shorter sub-patterns; occurrence counts of nested sequences are not
/// independent statistics. Callers filter by length if only the longest
/// patterns matter.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub min_len: usize,
    pub max_len: usize,
    pub recurrence_threshold: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            min_len: 3,
            max_len: 7,
            recurrence_threshold: 3,
        }
    }
}

/// What one mining pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MineOutcome {
    pub notes_created: usize,
    pub notes_updated: usize,
}

pub struct SequenceMiner {
    db: Arc<Database>,
}

impl SequenceMiner {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Run one mining pass for a user.
    ///
    /// Reads the full activity history, counts every contiguous sub-sequence
    /// of each window length, and persists notes for sequences meeting the
    /// recurrence threshold. All note writes happen in one transaction.
    ///
    /// # Returns
    /// * `Ok(MineOutcome)` - Counts of notes created and updated. Fewer
    ///   activities than `min_len` is a legitimate empty result, not an error.
    pub async fn mine(&self, user_id: &str, config: &MinerConfig) -> Result<MineOutcome> {
        let min_len = config.min_len.max(1);
        let threshold = config.recurrence_threshold.max(1);

        let activities = self.db.list_activities_for_user(user_id).await?;
        if activities.len() < min_len {
            debug!(
                user = %user_id,
                activities = activities.len(),
                "not enough history to mine"
            );
            return Ok(MineOutcome::default());
        }

        // Every contiguous window of every length, keyed by the ordered
        // tuple of activity types. Instances of one key all share a length,
        // and windows() yields them in ascending start order.
        let mut instances: HashMap<Vec<&str>, Vec<&[Activity]>> = HashMap::new();
        for len in min_len..=config.max_len.min(activities.len()) {
            for window in activities.windows(len) {
                let key: Vec<&str> = window.iter().map(|a| a.activity_type.as_str()).collect();
                instances.entry(key).or_default().push(window);
            }
        }

        // Deterministic processing order for stable logs and counts
        let mut recurring: Vec<_> = instances
            .into_iter()
            .filter(|(_, occurrences)| occurrences.len() >= threshold)
            .collect();
        recurring.sort_by(|a, b| a.0.cmp(&b.0));

        let mut new_notes = Vec::new();
        let mut updates = Vec::new();

        for (key, occurrences) in recurring {
            let description = key.join(" -> ");
            let count = occurrences.len() as i64;

            // Earliest instance is the first enumerated one; the latest
            // observation is the latest *end* timestamp, which with
            // overlapping windows is not the same as the latest start.
            let first_instance = occurrences[0];
            let first_observed_at = first_instance[0].recorded_at;
            let last_observed_at = occurrences
                .iter()
                .map(|w| w[w.len() - 1].recorded_at)
                .max()
                .unwrap_or(first_observed_at);

            match self
                .db
                .find_note_by_user_and_description(user_id, &description)
                .await?
            {
                Some(existing) => {
                    // Only a real change counts as an update
                    if existing.occurrence_count != count
                        || existing.last_observed_at != last_observed_at
                    {
                        updates.push(NoteStatsUpdate {
                            note_id: existing.id,
                            occurrence_count: count,
                            last_observed_at,
                        });
                    }
                }
                None => {
                    new_notes.push(NewProcessNote {
                        user_id: user_id.to_string(),
                        inferred_task_name: infer_task_name(&key),
                        steps_description: description,
                        source_activity_ids: first_instance.iter().map(|a| a.id).collect(),
                        occurrence_count: count,
                        first_observed_at,
                        last_observed_at,
                    });
                }
            }
        }

        let (created, updated) = self.db.apply_mined_changes(new_notes, updates).await?;

        info!(
            user = %user_id,
            created,
            updated,
            "mining pass complete"
        );

        Ok(MineOutcome {
            notes_created: created,
            notes_updated: updated,
        })
    }
}

/// Derive a human-readable name for a sequence key
fn infer_task_name(key: &[&str]) -> String {
    match key {
        [] => "Recurring routine".to_string(),
        [only] => format!("Recurring '{}' routine", only),
        [first, .., last] => {
            format!("Routine: {} ... {} ({} steps)", first, last, key.len())
        }
    }
}
