//! Task outcome models
//!
//! Defines the classified outcome of one task and the result record kept
//! for it in an execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::RawResponse;

/// Classified result of running one task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Call completed with a 2xx status
    Success {
        http_status: u16,
        body: String,
        duration_ms: u64,
    },
    /// Call completed with a status outside 2xx
    Failure {
        http_status: u16,
        body: String,
        duration_ms: u64,
    },
    /// Call could not be completed
    Error { message: String, duration_ms: u64 },
    /// Task was never invoked because its execution was cancelled
    Cancelled { reason: String },
}

impl Outcome {
    /// Classify the result of an executor call
    pub fn classify<E: fmt::Display>(result: Result<RawResponse, E>, elapsed: Duration) -> Self {
        let duration_ms = elapsed.as_millis() as u64;
        match result {
            Ok(response) if response.is_success() => Outcome::Success {
                http_status: response.status,
                body: response.body,
                duration_ms,
            },
            Ok(response) => Outcome::Failure {
                http_status: response.status,
                body: response.body,
                duration_ms,
            },
            Err(e) => Outcome::Error {
                message: format!("{e:#}"),
                duration_ms,
            },
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Outcome::Cancelled {
            reason: reason.into(),
        }
    }

    /// Only `Success` counts toward the success counter
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Outcome::Success { http_status, .. } | Outcome::Failure { http_status, .. } => {
                Some(*http_status)
            }
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            Outcome::Success { duration_ms, .. }
            | Outcome::Failure { duration_ms, .. }
            | Outcome::Error { duration_ms, .. } => *duration_ms,
            Outcome::Cancelled { .. } => 0,
        }
    }

    /// Human readable reason for anything that is not a success
    pub fn error_message(&self) -> Option<String> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { http_status, .. } => Some(format!("HTTP status {http_status}")),
            Outcome::Error { message, .. } => Some(message.clone()),
            Outcome::Cancelled { reason } => Some(reason.clone()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Failure { .. } => "failure",
            Outcome::Error { .. } => "error",
            Outcome::Cancelled { .. } => "cancelled",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "✓",
            Outcome::Failure { .. } => "✗",
            Outcome::Error { .. } => "!",
            Outcome::Cancelled { .. } => "○",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success {
                http_status,
                duration_ms,
                ..
            } => write!(f, "OK (status {http_status}, {duration_ms}ms)"),
            Outcome::Failure {
                http_status,
                duration_ms,
                ..
            } => write!(f, "status {http_status} ({duration_ms}ms)"),
            Outcome::Error {
                message,
                duration_ms,
            } => write!(f, "FAILED ({message}, {duration_ms}ms)"),
            Outcome::Cancelled { reason } => write!(f, "CANCELLED ({reason})"),
        }
    }
}

/// Outcome of one task as recorded in an execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_name: String,
    /// Submission index of the task (0-based)
    pub index: usize,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(task_name: impl Into<String>, index: usize, outcome: Outcome) -> Self {
        Self {
            task_name: task_name.into(),
            index,
            outcome,
            finished_at: Utc::now(),
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.outcome.symbol(),
            self.task_name,
            self.outcome
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        let outcome = Outcome::classify::<String>(
            Ok(RawResponse::new(201, "{}")),
            Duration::from_millis(12),
        );
        assert!(outcome.is_success());
        assert_eq!(outcome.http_status(), Some(201));
        assert_eq!(outcome.duration_ms(), 12);
    }

    #[test]
    fn test_classify_bad_status() {
        let outcome = Outcome::classify::<String>(
            Ok(RawResponse::new(404, "not found")),
            Duration::from_millis(5),
        );
        assert!(matches!(outcome, Outcome::Failure { http_status: 404, .. }));
        assert_eq!(outcome.error_message().as_deref(), Some("HTTP status 404"));
    }

    #[test]
    fn test_classify_transport_error() {
        let outcome = Outcome::classify(
            Err::<RawResponse, _>("connection refused"),
            Duration::from_millis(3),
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.http_status(), None);
        assert_eq!(outcome.label(), "error");
    }

    #[test]
    fn test_classify_keeps_error_causes() {
        let err = anyhow::anyhow!("connection refused").context("Failed to publish to q.orders");
        let outcome = Outcome::classify(Err::<RawResponse, _>(err), Duration::from_millis(3));
        assert_eq!(
            outcome.error_message().as_deref(),
            Some("Failed to publish to q.orders: connection refused")
        );
    }

    #[test]
    fn test_task_result_serializes_flat() {
        let result = TaskResult::new(
            "orders",
            0,
            Outcome::Success {
                http_status: 200,
                body: "{\"routed\":true}".into(),
                duration_ms: 8,
            },
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["http_status"], 200);
        assert_eq!(value["task_name"], "orders");
    }
}
