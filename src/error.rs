//! Engine error types
//!
//! Per-task failures are recorded as [`Outcome`](crate::models::Outcome) data and
//! never show up here. These errors describe misuse of the execution lifecycle.

use thiserror::Error;

use crate::models::ExecutionId;

/// Errors raised by the batch execution engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("Execution {0} is already completed")]
    AlreadyCompleted(ExecutionId),

    #[error("Execution id {0} is already in use")]
    DuplicateExecutionId(ExecutionId),

    #[error("Result recorded for execution {0} after it completed")]
    ResultAfterCompletion(ExecutionId),

    #[error("Execution {id} cannot complete with {recorded}/{expected} results")]
    IncompleteResults {
        id: ExecutionId,
        recorded: usize,
        expected: usize,
    },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let id = ExecutionId::from("exec-1");
        assert_eq!(
            EngineError::AlreadyCompleted(id.clone()).to_string(),
            "Execution exec-1 is already completed"
        );
        assert_eq!(
            EngineError::ExecutionNotFound(id.clone()).to_string(),
            "Execution not found: exec-1"
        );
        assert_eq!(
            EngineError::IncompleteResults {
                id,
                recorded: 1,
                expected: 3
            }
            .to_string(),
            "Execution exec-1 cannot complete with 1/3 results"
        );
    }
}
