/// Process note searcher with fuzzy matching
///
/// Lets a reviewer find the note they want to annotate without typing the
/// exact sequence string.

use crate::db::{Database, NoteMatch};
use crate::error::Result;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::sync::Arc;

/// Handles note searching with fuzzy matching
pub struct NoteSearcher {
    db: Arc<Database>,
    matcher: SkimMatcherV2,
}

impl NoteSearcher {
    /// Create a new searcher instance
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Search a user's notes with fuzzy matching
    ///
    /// # Arguments
    /// * `user_id` - Whose notes to search
    /// * `query` - Search query
    /// * `limit` - Maximum results to return
    ///
    /// # Returns
    /// * `Ok(Vec<NoteMatch>)` - Search results sorted by score
    pub async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<NoteMatch>> {
        let notes = self.db.list_notes_by_user(user_id, None, None).await?;

        // Match against both the sequence string and the inferred name,
        // keeping the better score
        let mut results: Vec<NoteMatch> = notes
            .into_iter()
            .filter_map(|note| {
                let by_steps = self.matcher.fuzzy_match(&note.steps_description, query);
                let by_name = self.matcher.fuzzy_match(&note.inferred_task_name, query);
                by_steps
                    .into_iter()
                    .chain(by_name)
                    .max()
                    .map(|score| NoteMatch {
                        note,
                        score: score as f64,
                    })
            })
            .collect();

        // Sort by score (highest first)
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

        results.truncate(limit);

        Ok(results)
    }

    /// Search by reviewer tags
    pub async fn search_by_tags(&self, user_id: &str, tags: &[String]) -> Result<Vec<NoteMatch>> {
        let notes = self.db.list_notes_by_user(user_id, None, None).await?;

        let results: Vec<NoteMatch> = notes
            .into_iter()
            .filter(|note| {
                let note_tags = note.get_user_tags();
                tags.iter().any(|tag| note_tags.contains(tag))
            })
            .map(|note| NoteMatch { note, score: 1.0 })
            .collect();

        Ok(results)
    }
}
