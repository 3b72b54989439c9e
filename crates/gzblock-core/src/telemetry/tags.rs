pub const METRIC_BUFFER_ACQUIRE_CREATED_COUNT: &str = "gzblock.buffer.acquire.created.count";
pub const METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT: &str = "gzblock.buffer.acquire.recycled.count";
pub const METRIC_BUFFER_ACQUIRE_LATENCY_US: &str = "gzblock.buffer.acquire.latency_us";
pub const METRIC_BUFFER_RECYCLE_OK_COUNT: &str = "gzblock.buffer.recycle.ok.count";
pub const METRIC_BUFFER_RECYCLE_DROPPED_COUNT: &str = "gzblock.buffer.recycle.dropped.count";

pub const METRIC_MMAP_OPEN_COUNT: &str = "gzblock.mmap.open.count";
pub const METRIC_MMAP_OPEN_LATENCY_US: &str = "gzblock.mmap.open.latency_us";

pub const METRIC_SPLIT_BLOCK_COUNT: &str = "gzblock.split.block.count";
pub const METRIC_SPLIT_BYTES: &str = "gzblock.split.bytes";

pub const METRIC_QUEUE_DEPTH: &str = "gzblock.queue.depth";

pub const METRIC_GATE_WAIT_US: &str = "gzblock.gate.wait_us";
pub const METRIC_GATE_BLOCK_COUNT: &str = "gzblock.gate.block.count";
pub const METRIC_GATE_BYTES: &str = "gzblock.gate.bytes";

pub const METRIC_SCAN_CANDIDATE_COUNT: &str = "gzblock.scan.candidate.count";
pub const METRIC_SCAN_REJECTED_COUNT: &str = "gzblock.scan.rejected.count";
pub const METRIC_SCAN_DISCARDED_COUNT: &str = "gzblock.scan.discarded.count";
pub const METRIC_SCAN_RESYNC_COUNT: &str = "gzblock.scan.resync.count";

pub const METRIC_WORKER_TASK_COUNT: &str = "gzblock.worker.task.count";
pub const METRIC_WORKER_TASK_START_COUNT: &str = "gzblock.worker.task.start.count";
pub const METRIC_WORKER_TASK_FINISH_COUNT: &str = "gzblock.worker.task.finish.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "gzblock.worker.task.fail.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "gzblock.worker.task.latency_us";

pub const METRIC_PIPELINE_RUN_COUNT: &str = "gzblock.pipeline.run.count";
pub const METRIC_PIPELINE_FAIL_COUNT: &str = "gzblock.pipeline.fail.count";

pub const METRIC_COMPRESSION_BLOCK_COUNT: &str = "gzblock.compression.block.count";
pub const METRIC_COMPRESSION_LATENCY_US: &str = "gzblock.compression.latency_us";
pub const METRIC_COMPRESSION_INPUT_BYTES: &str = "gzblock.compression.input_bytes";
pub const METRIC_COMPRESSION_OUTPUT_BYTES: &str = "gzblock.compression.output_bytes";
