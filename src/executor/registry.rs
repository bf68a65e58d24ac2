//! Execution registry
//!
//! Keeps every execution of this process addressable by id. The id map has
//! its own read/write lock; each record guards its mutable state through
//! its [`ResultAggregator`], so unrelated batches never contend.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::aggregator::ResultAggregator;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExecutionId, ExecutionSnapshot, ExecutionStatus};

/// Produces ids for new executions
pub type IdGenerator = Arc<dyn Fn() -> ExecutionId + Send + Sync>;

fn default_id() -> ExecutionId {
    ExecutionId::new(format!("exec-{}", Uuid::new_v4().simple()))
}

/// State of one batch run
#[derive(Debug)]
pub struct ExecutionRecord {
    id: ExecutionId,
    tasks: Vec<String>,
    concurrency: usize,
    delay: Duration,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    aggregator: ResultAggregator,
    completion: watch::Sender<ExecutionStatus>,
}

impl ExecutionRecord {
    fn new(id: ExecutionId, tasks: Vec<String>, concurrency: usize, delay: Duration) -> Self {
        let (completion, _) = watch::channel(ExecutionStatus::Running);
        Self {
            aggregator: ResultAggregator::new(id.clone(), tasks.len()),
            id,
            tasks,
            concurrency: concurrency.max(1),
            delay,
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            completion,
        }
    }

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Receiver that observes `Completed` once the record is finalized
    pub fn completion(&self) -> watch::Receiver<ExecutionStatus> {
        self.completion.subscribe()
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        let view = self.aggregator.view();
        ExecutionSnapshot {
            id: self.id.clone(),
            tasks: self.tasks.clone(),
            concurrency: self.concurrency,
            delay_ms: self.delay.as_millis() as u64,
            status: view.status,
            started_at: self.started_at,
            ended_at: view.ended_at,
            total_tests: self.tasks.len(),
            success_count: view.success_count,
            failure_count: view.failure_count,
            cancelled: self.cancel.is_cancelled(),
            results: view.results,
        }
    }
}

/// Process-wide map of execution id to execution record
pub struct ExecutionRegistry {
    executions: RwLock<HashMap<ExecutionId, Arc<ExecutionRecord>>>,
    id_generator: IdGenerator,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
            id_generator: Arc::new(default_id),
        }
    }

    /// Use a custom id generator (useful for deterministic tests)
    pub fn with_id_generator(
        mut self,
        generator: impl Fn() -> ExecutionId + Send + Sync + 'static,
    ) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    /// Register a new running execution
    pub fn create(
        &self,
        tasks: Vec<String>,
        concurrency: usize,
        delay: Duration,
    ) -> EngineResult<Arc<ExecutionRecord>> {
        let id = (self.id_generator)();
        let mut executions = self.executions.write();
        if executions.contains_key(&id) {
            return Err(EngineError::DuplicateExecutionId(id));
        }

        let record = Arc::new(ExecutionRecord::new(id.clone(), tasks, concurrency, delay));
        executions.insert(id.clone(), record.clone());
        debug!("Registered execution {} ({} tasks)", id, record.tasks.len());
        Ok(record)
    }

    pub fn record(&self, id: &ExecutionId) -> Option<Arc<ExecutionRecord>> {
        self.executions.read().get(id).cloned()
    }

    pub fn get(&self, id: &ExecutionId) -> Option<ExecutionSnapshot> {
        self.record(id).map(|record| record.snapshot())
    }

    /// Mark an execution completed and return its final snapshot
    ///
    /// A second call for the same id is rejected with `AlreadyCompleted`, and
    /// a call before every task has a result with `IncompleteResults`; the
    /// record stays running in that case.
    pub fn mark_completed(&self, id: &ExecutionId) -> EngineResult<ExecutionSnapshot> {
        let record = self
            .record(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(id.clone()))?;

        record.aggregator.finalize(Utc::now())?;
        record.completion.send_replace(ExecutionStatus::Completed);
        debug!("Execution {} marked completed", id);
        Ok(record.snapshot())
    }

    /// All executions, oldest first
    pub fn list(&self) -> Vec<ExecutionSnapshot> {
        let records: Vec<_> = self.executions.read().values().cloned().collect();
        let mut snapshots: Vec<_> = records.iter().map(|r| r.snapshot()).collect();
        snapshots.sort_by_key(|s| s.started_at);
        snapshots
    }

    pub fn active_count(&self) -> usize {
        self.executions
            .read()
            .values()
            .filter(|r| r.aggregator.status() == ExecutionStatus::Running)
            .count()
    }

    /// Drop a record; the embedding application decides when to prune
    pub fn remove(&self, id: &ExecutionId) -> Option<Arc<ExecutionRecord>> {
        self.executions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.read().is_empty()
    }
}

impl Default for ExecutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
