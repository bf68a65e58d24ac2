//! Batch execution facade
//!
//! `start` registers the execution and hands back its id right away; the
//! worker pool runs detached and the record is finalized when it returns.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::log_bus::{LogBus, LogSubscription};
use super::pool::WorkerPool;
use super::registry::{ExecutionRecord, ExecutionRegistry};
use super::TaskExecutor;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExecutionId, ExecutionSnapshot, ExecutionStatus, LogEvent, Task};

/// Default number of tasks in flight
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default pause before each task after the first
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Parallelism and pacing of one batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub delay: Duration,
}

impl BatchOptions {
    pub fn new(concurrency: usize, delay: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            delay,
        }
    }

    /// Normalize caller-supplied values: concurrency below 1 becomes 1 and a
    /// negative delay becomes no delay
    pub fn from_raw(concurrency: i64, delay_ms: i64) -> Self {
        Self::new(
            concurrency.max(1) as usize,
            Duration::from_millis(delay_ms.max(0) as u64),
        )
    }

    /// One task at a time, no pacing
    pub fn sequential() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, DEFAULT_DELAY)
    }
}

/// Starts batches and exposes their status and live logs
pub struct BatchExecutor<E: TaskExecutor> {
    executor: Arc<E>,
    registry: Arc<ExecutionRegistry>,
    log_bus: LogBus,
}

impl<E: TaskExecutor> Clone for BatchExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            registry: self.registry.clone(),
            log_bus: self.log_bus.clone(),
        }
    }
}

impl<E: TaskExecutor> BatchExecutor<E> {
    pub fn new(executor: Arc<E>) -> Self {
        Self::with_parts(executor, Arc::new(ExecutionRegistry::new()), LogBus::new())
    }

    pub fn with_parts(executor: Arc<E>, registry: Arc<ExecutionRegistry>, log_bus: LogBus) -> Self {
        Self {
            executor,
            registry,
            log_bus,
        }
    }

    pub fn registry(&self) -> &Arc<ExecutionRegistry> {
        &self.registry
    }

    pub fn log_bus(&self) -> &LogBus {
        &self.log_bus
    }

    /// Start a batch and return its id without waiting for it to run
    ///
    /// Must be called from within a tokio runtime. Only fails when the
    /// registry cannot allocate an id.
    pub fn start(
        &self,
        tasks: Vec<Task<E::Payload>>,
        options: BatchOptions,
    ) -> EngineResult<ExecutionId> {
        self.launch(tasks, options, false).map(|(id, _)| id)
    }

    /// Like [`start`](Self::start), but subscribes to the execution's logs
    /// before any task runs so that no event is missed
    pub fn start_observed(
        &self,
        tasks: Vec<Task<E::Payload>>,
        options: BatchOptions,
    ) -> EngineResult<(ExecutionId, LogSubscription)> {
        let (id, subscription) = self.launch(tasks, options, true)?;
        let subscription = subscription.unwrap_or_else(|| self.subscribe_logs(&id));
        Ok((id, subscription))
    }

    fn launch(
        &self,
        tasks: Vec<Task<E::Payload>>,
        options: BatchOptions,
        observe: bool,
    ) -> EngineResult<(ExecutionId, Option<LogSubscription>)> {
        let options = BatchOptions::new(options.concurrency, options.delay);
        let names = tasks.iter().map(|t| t.name.clone()).collect();
        let record = self
            .registry
            .create(names, options.concurrency, options.delay)?;
        let id = record.id().clone();
        let subscription = observe.then(|| self.log_bus.subscribe(&id));

        info!(
            "Started execution {} with {} tasks (concurrency {}, delay {}ms)",
            id,
            tasks.len(),
            options.concurrency,
            options.delay.as_millis()
        );

        if tasks.is_empty() {
            finish(&self.registry, &self.log_bus, &record, Duration::ZERO);
            return Ok((id, subscription));
        }

        let pool = WorkerPool::new(self.executor.clone(), options.concurrency, options.delay);
        let registry = self.registry.clone();
        let bus = self.log_bus.clone();
        tokio::spawn(async move {
            let elapsed = pool.run(tasks, record.clone(), bus.clone()).await;
            finish(&registry, &bus, &record, elapsed);
        });

        Ok((id, subscription))
    }

    pub fn get_execution(&self, id: &ExecutionId) -> Option<ExecutionSnapshot> {
        self.registry.get(id)
    }

    pub fn list_executions(&self) -> Vec<ExecutionSnapshot> {
        self.registry.list()
    }

    /// Subscribe to live events of an execution
    ///
    /// Subscribing to a completed execution yields a stream that ends
    /// immediately; an unknown id yields a stream with no events.
    pub fn subscribe_logs(&self, id: &ExecutionId) -> LogSubscription {
        let mut subscription = self.log_bus.subscribe(id);
        // subscribe first: a completion racing with this check closes the
        // mailbox after it was registered
        if self
            .registry
            .get(id)
            .is_some_and(|snapshot| snapshot.is_completed())
        {
            subscription.close();
        }
        subscription
    }

    pub fn unsubscribe_logs(&self, subscription: LogSubscription) {
        self.log_bus.unsubscribe(subscription);
    }

    /// Skip every task of the execution that has not been started yet;
    /// running tasks finish normally
    pub fn cancel(&self, id: &ExecutionId) -> EngineResult<()> {
        let record = self
            .registry
            .record(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(id.clone()))?;

        if record.aggregator().status() == ExecutionStatus::Completed {
            return Ok(());
        }

        if !record.cancel_token().is_cancelled() {
            warn!("Cancelling execution {}", id);
            record.cancel_token().cancel();
            self.log_bus
                .publish(id, LogEvent::warning("Cancellation requested"));
        }
        Ok(())
    }

    /// Wait until the execution is completed and return its final snapshot
    pub async fn wait(&self, id: &ExecutionId) -> EngineResult<ExecutionSnapshot> {
        let record = self
            .registry
            .record(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(id.clone()))?;

        let mut completion = record.completion();
        // the sender lives in the record we hold, so the channel cannot close
        let _ = completion
            .wait_for(|status| *status == ExecutionStatus::Completed)
            .await;
        Ok(record.snapshot())
    }
}

/// Finalize the record, announce the summary and end the log streams
///
/// The streams are closed on every path, so observers never hang on a
/// record that failed to finalize.
fn finish(registry: &ExecutionRegistry, bus: &LogBus, record: &ExecutionRecord, elapsed: Duration) {
    let finalized = registry.mark_completed(record.id());
    if let Ok(snapshot) = &finalized {
        let message = format!(
            "Batch completed in {}ms: {} succeeded, {} failed",
            elapsed.as_millis(),
            snapshot.success_count,
            snapshot.failure_count
        );
        let event = if snapshot.failure_count == 0 {
            LogEvent::success(message)
        } else {
            LogEvent::warning(message)
        };
        info!("Execution {}: {}", record.id(), event.message);
        bus.publish(record.id(), event);
    }
    bus.close(record.id());

    match finalized {
        Ok(_) => {}
        // another caller completed the record once every result was in
        Err(EngineError::AlreadyCompleted(_)) => {
            warn!("Execution {} was already completed", record.id());
        }
        Err(e) => {
            error!("Failed to finalize execution {}: {}", record.id(), e);
            if cfg!(debug_assertions) {
                panic!("execution {} not finalized: {e}", record.id());
            }
        }
    }
}
