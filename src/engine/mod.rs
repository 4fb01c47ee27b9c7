/// Process discovery engine
///
/// Sequence mining, task generation, and task prioritization over the shared
/// repositories. The three components are independently callable and only
/// communicate through persisted state.

pub mod generator;
pub mod miner;
pub mod pipeline;
pub mod prioritizer;

pub use generator::{compute_priority, GeneratorConfig, TaskGenerator};
pub use miner::{MineOutcome, MinerConfig, SequenceMiner};
pub use pipeline::{Pipeline, PipelineReport};
pub use prioritizer::{TaskPrioritizer, PRIORITIZATION_FLAG};
