pub mod buffer;
pub mod compression;
pub mod core;
pub mod error;
pub mod format;
pub mod io;
pub mod pipeline;
pub mod telemetry;
pub mod types;

pub use buffer::{BufferPool, PoolMetricsSnapshot, PooledBuffer};
pub use compression::{BlockTransform, CompressBlock, DecompressMember};
pub use core::{BoundedBlockQueue, FailureSlot, OrderedWriteGate, WorkerPool};
pub use error::GzblockError;
pub use format::FramingMode;
pub use io::{BlockSplitter, MemberBoundaryScanner, MmapInput, ScanStats};
pub use pipeline::{
    CompressPipeline, DecompressPipeline, PipelineOptions, RunKind, RunStats, compress_file,
    decompress_file,
};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use telemetry::{NoProgress, ProgressSink};
pub use types::{Block, BlockData, MemberSpan, PartitionBoundary, Result, ScannedMember};
