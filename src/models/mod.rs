//! Data models for batch message testing
//!
//! This module contains all data structures used throughout the application.

mod execution;
mod log_event;
mod mock;
mod outcome;
mod task;
mod test_case;

pub use execution::{ExecutionId, ExecutionSnapshot, ExecutionStatus, OutcomeBreakdown};
pub use log_event::{EventLevel, LogEvent};
pub use mock::{repeated_tasks, MockField, MockKind, MockSpec};
pub use outcome::{Outcome, TaskResult};
pub use task::{RawResponse, Task};
pub use test_case::TestCase;
