use std::time::Duration;

use serde::Serialize;

use crate::buffer::PoolMetricsSnapshot;
use crate::core::WorkerRuntimeSnapshot;
use crate::format::{
    DEFAULT_BLOCK_SIZE, DEFAULT_LEVEL, DEFAULT_PARTITION_SIZE, FramingMode, MAX_BLOCK_SIZE,
    MAX_LEVEL, MIN_PARTITION_SIZE,
};
use crate::io::ScanStats;
use crate::{GzblockError, Result};

/// Knobs shared by the compression and decompression pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Uncompressed bytes per block.
    pub block_size: usize,
    /// Upper bound on worker threads; runs use fewer when there is less work.
    pub workers: usize,
    /// Deflate level, 0 through 9.
    pub level: u32,
    pub framing: FramingMode,
    /// Blocks buffered between the reader and the workers. Zero means twice the
    /// worker count.
    pub queue_capacity: usize,
    /// Compressed bytes per scan partition when decompressing without an index.
    pub partition_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            workers: num_cpus::get(),
            level: DEFAULT_LEVEL,
            framing: FramingMode::MultiMember,
            queue_capacity: 0,
            partition_size: DEFAULT_PARTITION_SIZE,
        }
    }
}

impl PipelineOptions {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_framing(mut self, framing: FramingMode) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_partition_size(mut self, partition_size: usize) -> Self {
        self.partition_size = partition_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(GzblockError::InvalidConfig(format!(
                "block size must be between 1 and {MAX_BLOCK_SIZE} bytes, got {}",
                self.block_size
            )));
        }
        if self.workers == 0 {
            return Err(GzblockError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.level > MAX_LEVEL {
            return Err(GzblockError::InvalidConfig(format!(
                "compression level must be 0..={MAX_LEVEL}, got {}",
                self.level
            )));
        }
        if self.partition_size < MIN_PARTITION_SIZE {
            return Err(GzblockError::InvalidConfig(format!(
                "partition size must be at least {MIN_PARTITION_SIZE} bytes, got {}",
                self.partition_size
            )));
        }
        Ok(())
    }

    /// Queue capacity for a run with `workers` threads.
    pub fn effective_queue_capacity(&self, workers: usize) -> usize {
        if self.queue_capacity == 0 {
            workers.max(1) * 2
        } else {
            self.queue_capacity
        }
    }
}

/// Direction of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunKind {
    Compress,
    Decompress,
}

/// Summary returned by every pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub kind: RunKind,
    pub framing: FramingMode,
    pub elapsed: Duration,
    pub input_bytes: u64,
    pub output_bytes: u64,
    /// Blocks compressed, or members decoded.
    pub blocks: u64,
    pub workers: Vec<WorkerRuntimeSnapshot>,
    /// Present on the scan-based decompression path.
    pub scan: Option<ScanStats>,
    /// Present on the compression path.
    pub buffer_pool: Option<PoolMetricsSnapshot>,
}

impl RunStats {
    /// Output bytes per input byte.
    pub fn ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            1.0
        } else {
            self.output_bytes as f64 / self.input_bytes as f64
        }
    }
}
