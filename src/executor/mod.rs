//! Batch execution engine
//!
//! Schedules independent tasks onto a bounded worker pool, aggregates their
//! outcomes per execution and streams progress events to live subscribers.

mod aggregator;
mod batch;
mod log_bus;
mod pool;
mod registry;

pub use aggregator::{AggregateView, ResultAggregator};
pub use batch::{BatchExecutor, BatchOptions, DEFAULT_CONCURRENCY, DEFAULT_DELAY};
pub use log_bus::{LogBus, LogSubscription, DEFAULT_MAILBOX_CAPACITY};
pub use pool::WorkerPool;
pub use registry::{ExecutionRecord, ExecutionRegistry, IdGenerator};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{RawResponse, Task};

/// Performs the remote call for one task
///
/// An `Err` means the call could not be completed at all (transport, DNS,
/// timeout). A completed call with any status code is an `Ok`.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;

    async fn execute(&self, task: &Task<Self::Payload>) -> Result<RawResponse>;
}
