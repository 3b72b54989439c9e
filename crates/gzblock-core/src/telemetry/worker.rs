use std::time::Duration;

use crate::telemetry;
use crate::telemetry::tags;
use crate::types::duration_to_us;

/// Hooks invoked by [`crate::WorkerPool`] around every task.
///
/// `task_kind` names the transform being run (`"compress"`, `"decompress"`,
/// `"scan"`), so one backend can split metrics per pipeline.
pub trait WorkerTelemetry: Send + Sync {
    fn on_task_started(&self, worker_id: usize, task_kind: &str);
    fn on_task_finished(&self, worker_id: usize, task_kind: &str, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, task_kind: &str, elapsed: Duration);
}

/// Default implementation feeding the in-process registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_task_started(&self, _worker_id: usize, _task_kind: &str) {
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_START_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_start")],
        );
    }

    fn on_task_finished(&self, worker_id: usize, task_kind: &str, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_FINISH_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish"), ("result", "ok")],
        );
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task"), ("result", "ok")],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "worker"), ("op", "task"), ("result", "ok")],
        );
        tracing::trace!(worker_id, task_kind, elapsed_us, "worker task finished");
    }

    fn on_task_failed(&self, worker_id: usize, task_kind: &str, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_FAIL_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish"), ("result", "error")],
        );
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task"), ("result", "error")],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "worker"), ("op", "task"), ("result", "error")],
        );
        tracing::debug!(worker_id, task_kind, elapsed_us, "worker task failed");
    }
}
