use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::GzblockError;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::Result;

/// Fixed set of named worker threads pulling tasks from a shared source.
///
/// A run spawns scoped threads, so task sources and processors may borrow
/// from the caller's stack. Every task runs under `catch_unwind`; errors and
/// panics are handed to the caller's `on_error` callback, which is expected
/// to cancel the task source so the remaining workers drain and exit.
pub struct WorkerPool {
    num_workers: usize,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    /// Creates a worker pool using the default worker telemetry implementation.
    pub fn new(num_workers: usize) -> Self {
        Self::with_telemetry(num_workers, Arc::new(DefaultWorkerTelemetry))
    }

    /// Creates a worker pool with a custom telemetry backend.
    pub fn with_telemetry(num_workers: usize, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        Self {
            num_workers: num_workers.max(1),
            telemetry,
        }
    }

    /// Number of workers configured in this pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs workers until `next_task` reports exhaustion on every thread.
    ///
    /// Blocks until all workers have joined. `next_task` is called with the
    /// worker id and should block until a task is available or return `None`
    /// to stop that worker.
    pub fn run<T, S, P, E>(
        &self,
        task_kind: &'static str,
        next_task: S,
        process: P,
        on_error: E,
    ) -> PoolRuntimeSnapshot
    where
        T: Send,
        S: Fn(usize) -> Option<T> + Sync,
        P: Fn(usize, T) -> Result<()> + Sync,
        E: Fn(GzblockError) + Sync,
    {
        let started_at = Instant::now();
        let telemetry = self.telemetry.as_ref();
        let next_task = &next_task;
        let process = &process;
        let on_error = &on_error;

        let workers = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.num_workers);
            for worker_id in 0..self.num_workers {
                let spawned = thread::Builder::new()
                    .name(format!("gzblock-{task_kind}-{worker_id}"))
                    .spawn_scoped(scope, move || {
                        run_worker_loop(worker_id, task_kind, telemetry, next_task, process, on_error)
                    });
                match spawned {
                    Ok(handle) => handles.push((worker_id, handle)),
                    Err(error) => {
                        on_error(GzblockError::Io(error).with_context("spawning worker thread"));
                        break;
                    }
                }
            }

            let mut workers = Vec::with_capacity(handles.len());
            for (worker_id, handle) in handles {
                match handle.join() {
                    Ok(snapshot) => workers.push(snapshot),
                    Err(payload) => {
                        on_error(GzblockError::Other(anyhow::anyhow!(
                            "worker thread panicked: {}",
                            panic_message(payload.as_ref())
                        )));
                        workers.push(WorkerRuntimeSnapshot::idle(worker_id));
                    }
                }
            }
            workers
        });

        PoolRuntimeSnapshot {
            elapsed: started_at.elapsed(),
            completed: workers.iter().map(|worker| worker.tasks_completed).sum(),
            failed: workers.iter().map(|worker| worker.tasks_failed).sum(),
            workers,
        }
    }
}

/// Per-worker runtime metrics captured by the worker pool.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

impl WorkerRuntimeSnapshot {
    fn idle(worker_id: usize) -> Self {
        Self {
            worker_id,
            tasks_completed: 0,
            tasks_failed: 0,
            uptime: Duration::ZERO,
            busy: Duration::ZERO,
            idle: Duration::ZERO,
            utilization: 0.0,
        }
    }
}

/// Runtime metrics snapshot for one pool run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub completed: usize,
    pub failed: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

fn run_worker_loop<T, S, P, E>(
    worker_id: usize,
    task_kind: &'static str,
    telemetry: &dyn WorkerTelemetry,
    next_task: &S,
    process: &P,
    on_error: &E,
) -> WorkerRuntimeSnapshot
where
    S: Fn(usize) -> Option<T>,
    P: Fn(usize, T) -> Result<()>,
    E: Fn(GzblockError),
{
    let started_at = Instant::now();
    let mut snapshot = WorkerRuntimeSnapshot::idle(worker_id);

    while let Some(task) = next_task(worker_id) {
        telemetry.on_task_started(worker_id, task_kind);
        let task_started = Instant::now();

        let result = match catch_unwind(AssertUnwindSafe(|| process(worker_id, task))) {
            Ok(result) => result,
            Err(payload) => Err(GzblockError::Other(anyhow::anyhow!(
                "{task_kind} task panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        let elapsed = task_started.elapsed();
        snapshot.busy += elapsed;
        match result {
            Ok(()) => {
                snapshot.tasks_completed += 1;
                telemetry.on_task_finished(worker_id, task_kind, elapsed);
            }
            Err(error) => {
                snapshot.tasks_failed += 1;
                telemetry.on_task_failed(worker_id, task_kind, elapsed);
                on_error(error);
            }
        }
    }

    snapshot.uptime = started_at.elapsed();
    snapshot.busy = snapshot.busy.min(snapshot.uptime);
    snapshot.idle = snapshot.uptime.saturating_sub(snapshot.busy);
    snapshot.utilization = if snapshot.uptime.is_zero() {
        0.0
    } else {
        snapshot.busy.as_secs_f64() / snapshot.uptime.as_secs_f64()
    };
    snapshot
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
