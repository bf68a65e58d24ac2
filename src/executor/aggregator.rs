//! Per-execution result aggregation
//!
//! Results, counters, status and end time share one mutex so that a reader
//! never sees the counters out of step with the result list.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::models::{ExecutionId, ExecutionStatus, TaskResult};

#[derive(Debug)]
struct AggregateState {
    status: ExecutionStatus,
    ended_at: Option<DateTime<Utc>>,
    results: Vec<TaskResult>,
    success_count: usize,
    failure_count: usize,
}

/// Consistent copy of the aggregate state
#[derive(Clone, Debug)]
pub struct AggregateView {
    pub status: ExecutionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub results: Vec<TaskResult>,
    pub success_count: usize,
    pub failure_count: usize,
}

/// Thread-safe accumulator of task outcomes for one execution
#[derive(Debug)]
pub struct ResultAggregator {
    execution_id: ExecutionId,
    total: usize,
    state: Mutex<AggregateState>,
}

impl ResultAggregator {
    pub fn new(execution_id: ExecutionId, total: usize) -> Self {
        Self {
            execution_id,
            total,
            state: Mutex::new(AggregateState {
                status: ExecutionStatus::Running,
                ended_at: None,
                results: Vec::with_capacity(total),
                success_count: 0,
                failure_count: 0,
            }),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Append a result and bump the matching counter
    ///
    /// Failure, Error and Cancelled outcomes all count as failures.
    pub fn add_result(&self, result: TaskResult) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.status == ExecutionStatus::Completed {
            return Err(EngineError::ResultAfterCompletion(self.execution_id.clone()));
        }

        if result.outcome.is_success() {
            state.success_count += 1;
        } else {
            state.failure_count += 1;
        }
        state.results.push(result);
        Ok(())
    }

    /// Transition to completed, exactly once and only with every result in
    pub fn finalize(&self, now: DateTime<Utc>) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.status == ExecutionStatus::Completed {
            return Err(EngineError::AlreadyCompleted(self.execution_id.clone()));
        }

        if state.results.len() != self.total {
            warn!(
                "Refusing to complete execution {} with {}/{} results",
                self.execution_id,
                state.results.len(),
                self.total
            );
            return Err(EngineError::IncompleteResults {
                id: self.execution_id.clone(),
                recorded: state.results.len(),
                expected: self.total,
            });
        }

        state.status = ExecutionStatus::Completed;
        state.ended_at = Some(now);
        Ok(())
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.lock().status
    }

    /// `(success_count, failure_count)`
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.success_count, state.failure_count)
    }

    pub fn len(&self) -> usize {
        self.state.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view(&self) -> AggregateView {
        let state = self.state.lock();
        AggregateView {
            status: state.status,
            ended_at: state.ended_at,
            results: state.results.clone(),
            success_count: state.success_count,
            failure_count: state.failure_count,
        }
    }
}
