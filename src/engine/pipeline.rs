/// Full-pass orchestrator
///
/// Runs mine -> generate -> reprioritize for one user. The three components
/// never call each other; they only share persisted state, so the pipeline
/// is just sequencing plus the feature-gate check before the scoring step.

use crate::db::{Database, ScoreAdjustment, Task};
use crate::engine::{
    GeneratorConfig, MinerConfig, SequenceMiner, TaskGenerator, TaskPrioritizer,
};
use crate::error::Result;
use std::sync::Arc;

pub struct Pipeline {
    miner: SequenceMiner,
    generator: TaskGenerator,
    prioritizer: TaskPrioritizer,
}

impl Pipeline {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            miner: SequenceMiner::new(Arc::clone(&db)),
            generator: TaskGenerator::new(Arc::clone(&db)),
            prioritizer: TaskPrioritizer::new(db),
        }
    }

    /// Run a full pass with default configs.
    ///
    /// `apply_scores` is forwarded to the prioritizer; mining and generation
    /// always persist. Raises `FeatureDisabled` before touching any score if
    /// the prioritization gate is off.
    pub async fn run(&self, user_id: &str, apply_scores: bool) -> Result<PipelineReport> {
        let outcome = self.miner.mine(user_id, &MinerConfig::default()).await?;

        let tasks_created = self
            .generator
            .generate(user_id, &GeneratorConfig::default())
            .await?;

        self.prioritizer.ensure_enabled().await?;
        let adjustments = self.prioritizer.reprioritize(user_id, apply_scores).await?;

        Ok(PipelineReport {
            notes_created: outcome.notes_created,
            notes_updated: outcome.notes_updated,
            tasks_created,
            adjustments,
        })
    }
}

/// What one full pass did
#[derive(Debug)]
pub struct PipelineReport {
    pub notes_created: usize,
    pub notes_updated: usize,
    pub tasks_created: Vec<Task>,
    pub adjustments: Vec<ScoreAdjustment>,
}
