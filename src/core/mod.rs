/// Core ingestion and lookup helpers
///
/// Everything that feeds or reads the engine without being the engine:
/// activity logging with validation, and fuzzy note search for reviewers.

pub mod logger;
pub mod searcher;

pub use logger::ActivityLogger;
pub use searcher::NoteSearcher;
