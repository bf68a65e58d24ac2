//! Execution models
//!
//! An execution is one batch run across all of its tasks, addressable by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Outcome, TaskResult};

/// Identifier of one batch run
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Per-variant outcome counts, derived from the results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeBreakdown {
    pub success: usize,
    pub failure: usize,
    pub error: usize,
    pub cancelled: usize,
}

/// Read-consistent copy of an execution record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: ExecutionId,
    /// Task names in submission order
    pub tasks: Vec<String>,
    pub concurrency: usize,
    pub delay_ms: u64,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_tests: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub cancelled: bool,
    /// Results in completion order
    pub results: Vec<TaskResult>,
}

impl ExecutionSnapshot {
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Wall-clock time of the run, up to now if still running
    pub fn elapsed_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Sum of the individual task durations
    pub fn total_task_duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.outcome.duration_ms()).sum()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.total_tests as f64) * 100.0
        }
    }

    pub fn breakdown(&self) -> OutcomeBreakdown {
        let mut breakdown = OutcomeBreakdown::default();
        for result in &self.results {
            match result.outcome {
                Outcome::Success { .. } => breakdown.success += 1,
                Outcome::Failure { .. } => breakdown.failure += 1,
                Outcome::Error { .. } => breakdown.error += 1,
                Outcome::Cancelled { .. } => breakdown.cancelled += 1,
            }
        }
        breakdown
    }

    /// Results that did not succeed, in completion order
    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| !r.outcome.is_success())
    }
}
