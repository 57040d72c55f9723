use thiserror::Error;

/// Errors from workflow management (create, update, delete, lookup).
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow not found")]
    NotFound,

    #[error("invalid workflow: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

/// Errors from scheduled task management.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("scheduled task not found")]
    NotFound,

    #[error("invalid scheduled task: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

/// Errors from repository operations (used by trait definitions in studyflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_error_display() {
        let err = WorkflowError::Invalid("step 2 has no name".to_string());
        assert_eq!(err.to_string(), "invalid workflow: step 2 has no name");
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");

        let err = RepositoryError::Conflict("run already finished".to_string());
        assert_eq!(err.to_string(), "conflict: run already finished");
    }
}
