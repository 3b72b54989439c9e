use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::GzblockError;
use crate::buffer::{BufferPool, PoolMetricsSnapshot};
use crate::compression::{BlockTransform, CompressBlock};
use crate::core::{OrderedWriteGate, WorkerPool, WorkerRuntimeSnapshot};
use crate::io::BlockSplitter;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::telemetry::{NoProgress, ProgressSink};
use crate::types::{Block, Result};

use super::shared::{PipelineShared, run_queued};
use super::types::{PipelineOptions, RunKind, RunStats};
use super::{create_output, finish_output, open_input, record_run, remove_partial_output};

/// Parallel block compressor.
///
/// A reader thread cuts the input into `block_size` blocks, workers compress
/// each block into a self-contained gzip member, and the write gate emits the
/// members in block order. The output is a standard multi-member gzip stream.
///
/// # Example
/// ```no_run
/// use gzblock_core::{CompressPipeline, PipelineOptions};
///
/// let pipeline = CompressPipeline::new(PipelineOptions::default().with_workers(4))?;
/// let stats = pipeline.compress_file("data.bin", "data.bin.gz")?;
/// println!("{} blocks", stats.blocks);
/// # Ok::<(), gzblock_core::GzblockError>(())
/// ```
pub struct CompressPipeline {
    options: PipelineOptions,
    progress: Arc<dyn ProgressSink>,
    worker_telemetry: Arc<dyn WorkerTelemetry>,
}

impl CompressPipeline {
    /// # Errors
    /// [`GzblockError::InvalidConfig`] when `options` fail validation.
    pub fn new(options: PipelineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            progress: Arc::new(NoProgress),
            worker_telemetry: Arc::new(DefaultWorkerTelemetry),
        })
    }

    /// Reports every committed block to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        self.worker_telemetry = telemetry;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Compresses `input` into `output`.
    ///
    /// On failure the partially written output file is removed.
    pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<RunStats> {
        let input = input.as_ref();
        let output = output.as_ref();
        let (reader, len) = open_input(input)?;

        let result = create_output(output).and_then(|writer| {
            let (writer, stats) = self.compress(reader, len, writer)?;
            finish_output(writer)?;
            Ok(stats)
        });
        if result.is_err() {
            remove_partial_output(output);
        }
        result
    }

    /// Compresses everything `reader` yields into `writer`.
    ///
    /// `len_hint` is the input length when known; it sizes the worker pool and
    /// gives progress reporting a total up front. The reader is always drained
    /// to EOF, so a wrong hint never truncates the output. Returns the flushed
    /// writer.
    pub fn compress<R, W>(
        &self,
        reader: R,
        len_hint: Option<u64>,
        writer: W,
    ) -> Result<(W, RunStats)>
    where
        R: Read + Send,
        W: Write + Send,
    {
        let started_at = Instant::now();
        let result = self.compress_inner(reader, len_hint, writer, started_at);
        record_run(RunKind::Compress, result.is_ok());
        result
    }

    fn compress_inner<R, W>(
        &self,
        mut reader: R,
        len_hint: Option<u64>,
        mut writer: W,
        started_at: Instant,
    ) -> Result<(W, RunStats)>
    where
        R: Read + Send,
        W: Write + Send,
    {
        let options = &self.options;
        let transform = CompressBlock::new(options.level, options.framing);

        // A length hint of zero is not proof of EOF: pipes and procfs files
        // report zero while still yielding data.
        let mut probe = [0u8; 1];
        let probed = read_probe(&mut reader, &mut probe)?;
        if probed == 0 {
            tracing::debug!("empty input, writing a single empty member");
            let written = self.write_empty_member(&transform, &mut writer)?;
            writer.flush()?;
            self.progress.on_block_completed(1, Some(1));
            return Ok((writer, self.stats(started_at, 0, written, 1, Vec::new(), None)));
        }
        let reader = (&probe[..probed]).chain(reader);
        let len_hint = len_hint.filter(|&len| len > 0);

        let planned_blocks = len_hint.map(|len| BlockSplitter::block_count(len, options.block_size));
        let workers = match planned_blocks {
            Some(blocks) => options.workers.min(blocks.min(usize::MAX as u64) as usize),
            None => options.workers,
        }
        .max(1);
        let queue_capacity = options.effective_queue_capacity(workers);
        let buffer_pool = Arc::new(BufferPool::new(
            options.block_size,
            queue_capacity + workers + 1,
        ));
        let splitter = BlockSplitter::new(options.block_size, Arc::clone(&buffer_pool));
        tracing::debug!(
            workers,
            queue_capacity,
            block_size = options.block_size,
            framing = ?options.framing,
            planned_blocks,
            "starting compression"
        );

        let shared = PipelineShared::new(
            queue_capacity,
            OrderedWriteGate::with_progress(writer, Arc::clone(&self.progress)),
        );
        if let Some(total) = planned_blocks {
            shared.gate.set_total(total);
        }

        let pool = WorkerPool::with_telemetry(workers, Arc::clone(&self.worker_telemetry));
        let shared_ref = &shared;
        let run = run_queued(shared_ref, &pool, &transform, move |queue| {
            let summary = splitter.split_into(reader, queue)?;
            shared_ref.gate.set_total(summary.blocks);
            Ok(summary)
        });

        let (mut writer, gate) = shared.finish()?;
        let split = run.produced.ok_or_else(|| {
            GzblockError::Other(anyhow::anyhow!("reader finished without a summary"))
        })?;
        if gate.committed != split.blocks {
            return Err(GzblockError::SequenceGap {
                expected: split.blocks,
                written: gate.committed,
            });
        }

        let output_bytes = gate.bytes_written;
        let blocks = split.blocks;
        writer.flush()?;

        tracing::debug!(
            blocks,
            input_bytes = split.bytes,
            output_bytes,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "compression finished"
        );
        let stats = self.stats(
            started_at,
            split.bytes,
            output_bytes,
            blocks,
            run.runtime.workers,
            Some(buffer_pool.metrics()),
        );
        Ok((writer, stats))
    }

    fn write_empty_member<W: Write>(
        &self,
        transform: &CompressBlock,
        writer: &mut W,
    ) -> Result<u64> {
        let member = transform.apply(&Block::borrowed(0, &[]))?;
        writer.write_all(&member)?;
        Ok(member.len() as u64)
    }

    fn stats(
        &self,
        started_at: Instant,
        input_bytes: u64,
        output_bytes: u64,
        blocks: u64,
        workers: Vec<WorkerRuntimeSnapshot>,
        buffer_pool: Option<PoolMetricsSnapshot>,
    ) -> RunStats {
        RunStats {
            kind: RunKind::Compress,
            framing: self.options.framing,
            elapsed: started_at.elapsed(),
            input_bytes,
            output_bytes,
            blocks,
            workers,
            scan: None,
            buffer_pool,
        }
    }
}

/// Compresses `input` into `output` using `options`.
pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: PipelineOptions,
) -> Result<RunStats> {
    CompressPipeline::new(options)?.compress_file(input, output)
}

/// Reads at most one byte, retrying on interruption.
fn read_probe<R: Read>(reader: &mut R, probe: &mut [u8; 1]) -> Result<usize> {
    loop {
        match reader.read(probe) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                return Err(GzblockError::Io(error).with_context("reading uncompressed input"));
            }
        }
    }
}
