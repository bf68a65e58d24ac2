//! Bounded-concurrency worker pool
//!
//! Every task gets its own spawned unit. Units queue on a semaphore for
//! admission, tasks after the first sleep for the stagger delay once
//! admitted, and at most `concurrency` executor calls are in flight at any
//! instant. Results land in the aggregator in completion order.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use super::log_bus::LogBus;
use super::registry::ExecutionRecord;
use super::TaskExecutor;
use crate::models::{EventLevel, LogEvent, Outcome, Task, TaskResult};
use crate::utils::Timer;

/// Schedules tasks onto a fixed number of admission slots
pub struct WorkerPool<E: TaskExecutor> {
    executor: Arc<E>,
    concurrency: usize,
    delay: Duration,
}

/// State shared by every unit of one run
struct RunContext<E: TaskExecutor> {
    executor: Arc<E>,
    semaphore: Arc<Semaphore>,
    delay: Duration,
    record: Arc<ExecutionRecord>,
    bus: LogBus,
    total: usize,
}

impl<E: TaskExecutor> WorkerPool<E> {
    pub fn new(executor: Arc<E>, concurrency: usize, delay: Duration) -> Self {
        Self {
            executor,
            concurrency: concurrency.max(1),
            delay,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run every task to completion and return the wall-clock time taken
    ///
    /// Individual task failures never abort sibling tasks.
    pub async fn run(
        &self,
        tasks: Vec<Task<E::Payload>>,
        record: Arc<ExecutionRecord>,
        bus: LogBus,
    ) -> Duration {
        let timer = Timer::start(format!("execution {}", record.id()));
        let total = tasks.len();
        if total == 0 {
            return timer.stop();
        }

        info!(
            "Running {} tasks for {} (max {} concurrent, {}ms delay)",
            total,
            record.id(),
            self.concurrency,
            self.delay.as_millis()
        );
        bus.publish(
            record.id(),
            LogEvent::info(format!(
                "Starting batch of {} tasks (concurrency {}, delay {}ms)",
                total,
                self.concurrency,
                self.delay.as_millis()
            )),
        );

        let ctx = Arc::new(RunContext {
            executor: self.executor.clone(),
            semaphore: Arc::new(Semaphore::new(self.concurrency)),
            delay: self.delay,
            record,
            bus,
            total,
        });

        let mut names = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);
        for (index, task) in tasks.into_iter().enumerate() {
            names.push(task.name.clone());
            handles.push(tokio::spawn(run_unit(ctx.clone(), index, task)));
        }

        for (index, (name, joined)) in names.into_iter().zip(join_all(handles).await).enumerate() {
            if let Err(e) = joined {
                error!("Task {} of {} did not finish: {}", name, ctx.record.id(), e);
                let outcome = Outcome::Error {
                    message: format!("task aborted: {e}"),
                    duration_ms: 0,
                };
                publish_outcome(&ctx, index, &name, &outcome);
                record_result(&ctx, TaskResult::new(name, index, outcome));
            }
        }

        let elapsed = timer.stop();
        info!(
            "Execution {} finished {} tasks in {}ms",
            ctx.record.id(),
            total,
            elapsed.as_millis()
        );
        elapsed
    }
}

/// Drive one task from admission to its recorded outcome
async fn run_unit<E: TaskExecutor>(ctx: Arc<RunContext<E>>, index: usize, task: Task<E::Payload>) {
    let Some(permit) = admit(&ctx, index).await else {
        debug!("Task {} skipped, execution cancelled", task.name);
        let outcome = Outcome::cancelled("execution cancelled before the task started");
        publish_outcome(&ctx, index, &task.name, &outcome);
        record_result(&ctx, TaskResult::new(task.name, index, outcome));
        return;
    };

    ctx.bus.publish(
        ctx.record.id(),
        LogEvent::info(format!("[{}/{}] Running {}", index + 1, ctx.total, task.name))
            .with_task(&task.name),
    );

    let timer = Timer::start(&task.name);
    let response = ctx.executor.execute(&task).await;
    let outcome = Outcome::classify(response, timer.elapsed());
    debug!("Task {} finished: {}", task.name, outcome);

    publish_outcome(&ctx, index, &task.name, &outcome);
    drop(permit);
    record_result(&ctx, TaskResult::new(task.name, index, outcome));
}

/// Wait for an admission slot and the stagger delay
///
/// Returns `None` if the execution is cancelled before the executor is invoked.
async fn admit<E: TaskExecutor>(ctx: &RunContext<E>, index: usize) -> Option<OwnedSemaphorePermit> {
    let cancel = ctx.record.cancel_token();

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        permit = ctx.semaphore.clone().acquire_owned() => permit.ok()?,
    };

    if index > 0 && !ctx.delay.is_zero() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(ctx.delay) => {}
        }
    } else if cancel.is_cancelled() {
        return None;
    }

    Some(permit)
}

fn publish_outcome<E: TaskExecutor>(ctx: &RunContext<E>, index: usize, name: &str, outcome: &Outcome) {
    let level = match outcome {
        Outcome::Success { .. } => EventLevel::Success,
        Outcome::Failure { .. } | Outcome::Cancelled { .. } => EventLevel::Warning,
        Outcome::Error { .. } => EventLevel::Error,
    };
    ctx.bus.publish(
        ctx.record.id(),
        LogEvent::new(
            level,
            format!("[{}/{}] {}: {}", index + 1, ctx.total, name, outcome),
        )
        .with_task(name),
    );
}

fn record_result<E: TaskExecutor>(ctx: &RunContext<E>, result: TaskResult) {
    if let Err(e) = ctx.record.aggregator().add_result(result) {
        error!("Failed to record task result: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::{tasks, Script, ScriptedExecutor};
    use crate::executor::ExecutionRegistry;
    use std::collections::HashSet;
    use std::time::Instant;

    fn record_for(registry: &ExecutionRegistry, scripts: &[Script]) -> Arc<ExecutionRecord> {
        let names = tasks(scripts).into_iter().map(|t| t.name).collect();
        registry.create(names, 1, Duration::ZERO).unwrap()
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeded() {
        let scripts = vec![Script::SlowStatus(200, Duration::from_millis(20)); 12];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);
        let executor = ScriptedExecutor::new();

        let pool = WorkerPool::new(executor.clone(), 3, Duration::ZERO);
        pool.run(tasks(&scripts), record.clone(), LogBus::new()).await;

        assert!(executor.max_in_flight() <= 3);
        assert!(executor.max_in_flight() >= 2);
        assert_eq!(executor.calls(), 12);
        assert_eq!(record.aggregator().counts(), (12, 0));
    }

    #[tokio::test]
    async fn test_fewer_tasks_than_slots_all_run_together() {
        let scripts = vec![Script::SlowStatus(200, Duration::from_millis(100)); 3];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);
        let executor = ScriptedExecutor::new();

        let start = Instant::now();
        let pool = WorkerPool::new(executor.clone(), 10, Duration::ZERO);
        pool.run(tasks(&scripts), record.clone(), LogBus::new()).await;

        assert_eq!(executor.max_in_flight(), 3);
        assert!(start.elapsed() < Duration::from_millis(300));
        assert_eq!(record.aggregator().counts(), (3, 0));
    }

    #[tokio::test]
    async fn test_zero_concurrency_clamped() {
        let executor = ScriptedExecutor::new();
        let pool = WorkerPool::new(executor.clone(), 0, Duration::ZERO);
        assert_eq!(pool.concurrency(), 1);

        let scripts = vec![Script::Status(200); 4];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);
        pool.run(tasks(&scripts), record, LogBus::new()).await;
        assert_eq!(executor.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_siblings() {
        let scripts = vec![
            Script::Fail("connection refused"),
            Script::Status(200),
            Script::Status(500),
            Script::Panic,
            Script::Status(204),
        ];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);

        let pool = WorkerPool::new(ScriptedExecutor::new(), 2, Duration::ZERO);
        pool.run(tasks(&scripts), record.clone(), LogBus::new()).await;

        let view = record.aggregator().view();
        assert_eq!(view.results.len(), 5);
        assert_eq!(view.success_count, 2);
        assert_eq!(view.failure_count, 3);

        let panicked = view
            .results
            .iter()
            .find(|r| r.task_name == "task-3")
            .unwrap();
        assert!(matches!(panicked.outcome, Outcome::Error { .. }));
    }

    #[tokio::test]
    async fn test_stagger_delay_paces_tasks() {
        let scripts = vec![Script::Fail("unreachable"); 3];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);

        let start = Instant::now();
        let pool = WorkerPool::new(ScriptedExecutor::new(), 1, Duration::from_millis(100));
        pool.run(tasks(&scripts), record.clone(), LogBus::new()).await;

        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(record.aggregator().counts(), (0, 3));
    }

    #[tokio::test]
    async fn test_delay_overlaps_across_slots() {
        let scripts = vec![Script::Status(200); 4];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);

        let start = Instant::now();
        let pool = WorkerPool::new(ScriptedExecutor::new(), 4, Duration::from_millis(100));
        pool.run(tasks(&scripts), record, LogBus::new()).await;

        // admitted tasks sleep concurrently, so the delays do not add up
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_events_published_per_task() {
        let scripts = vec![Script::Status(200), Script::Status(503)];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);
        let bus = LogBus::new();
        let mut subscription = bus.subscribe(record.id());

        let pool = WorkerPool::new(ScriptedExecutor::new(), 1, Duration::ZERO);
        pool.run(tasks(&scripts), record, bus).await;

        let events: Vec<_> = std::iter::from_fn(|| subscription.try_recv()).collect();
        // one start summary, then a starting and an outcome event per task
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].level, EventLevel::Info);
        assert!(events.iter().any(|e| e.level == EventLevel::Success));
        assert!(events.iter().any(|e| e.level == EventLevel::Warning));
    }

    #[tokio::test]
    async fn test_cancel_skips_waiting_tasks() {
        let scripts = vec![Script::SlowStatus(200, Duration::from_millis(100)); 4];
        let registry = ExecutionRegistry::new();
        let record = record_for(&registry, &scripts);
        let executor = ScriptedExecutor::new();

        let pool = WorkerPool::new(executor.clone(), 1, Duration::ZERO);
        let run = pool.run(tasks(&scripts), record.clone(), LogBus::new());
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            record.cancel_token().cancel();
        };
        tokio::join!(run, cancel);

        let view = record.aggregator().view();
        assert_eq!(view.results.len(), 4);
        assert_eq!(executor.calls(), 1);
        let cancelled = view
            .results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Cancelled { .. }))
            .count();
        assert_eq!(cancelled, 3);
        assert_eq!(view.success_count, 1);
    }

    #[tokio::test]
    async fn test_concurrency_does_not_change_outcomes() {
        let scripts = vec![
            Script::Status(200),
            Script::Status(404),
            Script::Fail("dns"),
            Script::Status(201),
            Script::Status(502),
        ];

        let collect = |concurrency: usize| {
            let scripts = scripts.clone();
            async move {
                let registry = ExecutionRegistry::new();
                let record = record_for(&registry, &scripts);
                WorkerPool::new(ScriptedExecutor::new(), concurrency, Duration::ZERO)
                    .run(tasks(&scripts), record.clone(), LogBus::new())
                    .await;
                record
                    .aggregator()
                    .view()
                    .results
                    .into_iter()
                    .map(|r| (r.task_name, r.outcome.label(), r.outcome.http_status()))
                    .collect::<HashSet<_>>()
            }
        };

        let parallel = collect(scripts.len()).await;
        let sequential = collect(1).await;
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.len(), 5);
    }
}
