/// Error types for taskmint
///
/// This module defines all possible errors that can occur in the engine.
/// Uses thiserror for ergonomic error handling.

use thiserror::Error;

/// Main error type for taskmint operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database-related errors. Any write that fails mid-transaction is
    /// rolled back in full before this is surfaced.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O errors (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid activity label (empty, malformed)
    #[error("Invalid activity: {0}")]
    InvalidActivity(String),

    /// Activity label exceeds maximum length
    #[error("Activity label exceeds maximum allowed length of {0} characters")]
    ActivityTooLong(usize),

    /// A status value outside the allowed set
    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    /// A disallowed status transition (e.g. moving a completed task)
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// A feature gate consulted before an operation turned out to be off
    #[error("Feature '{0}' is disabled")]
    FeatureDisabled(String),

    /// Task lookup failed
    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    /// Process note lookup failed
    #[error("Process note not found: {0}")]
    NoteNotFound(i64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for taskmint operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Convert EngineError to a user-friendly error message
impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Database(e) => {
                format!("Database error occurred. Please try again. Details: {}", e)
            }
            EngineError::Io(e) => {
                format!("File system error. Check permissions. Details: {}", e)
            }
            EngineError::Serialization(e) => {
                format!("Data format error: {}", e)
            }
            EngineError::InvalidActivity(reason) => {
                format!("Invalid activity: {}", reason)
            }
            EngineError::ActivityTooLong(max) => {
                format!("Activity label exceeds maximum length of {} characters", max)
            }
            EngineError::InvalidStatus(status) => {
                format!("'{}' is not a valid task status", status)
            }
            EngineError::InvalidStatusTransition { from, to } => {
                format!("Cannot move a task from '{}' to '{}'", from, to)
            }
            EngineError::FeatureDisabled(flag) => {
                format!("The '{}' feature is disabled for this installation", flag)
            }
            EngineError::TaskNotFound(id) => {
                format!("Task {} not found", id)
            }
            EngineError::NoteNotFound(id) => {
                format!("Process note {} not found", id)
            }
            EngineError::Config(msg) => {
                format!("Configuration issue: {}", msg)
            }
        }
    }

    /// Whether the caller may sensibly retry the failed operation.
    /// Persistence failures are transient; everything else is a client error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Database(_) | EngineError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_user_messages() {
        let err = EngineError::TaskNotFound(42);
        assert!(err.user_message().contains("42"));

        let err = EngineError::FeatureDisabled("smart_prioritization".to_string());
        assert!(err.user_message().contains("smart_prioritization"));
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidStatus("started".to_string());
        let display = format!("{}", err);
        assert!(display.contains("Invalid task status"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!EngineError::FeatureDisabled("x".to_string()).is_retryable());
        assert!(!EngineError::InvalidStatusTransition {
            from: "completed".to_string(),
            to: "suggested".to_string()
        }
        .is_retryable());
    }
}
