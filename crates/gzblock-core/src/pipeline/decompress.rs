use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::GzblockError;
use crate::compression::DecompressMember;
use crate::core::{FailureSlot, OrderedWriteGate, WorkerPool};
use crate::format::{FramingMode, SIGNATURE, index_members};
use crate::io::{MemberBoundaryScanner, MmapInput};
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::telemetry::{NoProgress, ProgressSink};
use crate::types::{Block, MemberSpan, Result};

use super::shared::{PipelineShared, run_queued};
use super::types::{PipelineOptions, RunKind, RunStats};
use super::{create_output, finish_output, record_run, remove_partial_output};

/// Parallel decompressor for multi-member gzip streams.
///
/// Indexed streams are split along the lengths recorded in their headers and
/// fed to workers through the bounded queue. Any other stream is cut into
/// partitions which workers scan for member signatures; each partition's
/// output goes through the write gate under the partition index, so the
/// output order matches the input regardless of which worker finishes first.
pub struct DecompressPipeline {
    options: PipelineOptions,
    progress: Arc<dyn ProgressSink>,
    worker_telemetry: Arc<dyn WorkerTelemetry>,
}

impl DecompressPipeline {
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

    /// Reports every committed member (indexed) or partition (scanned) to `progress`.
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

    /// Decompresses the gzip file at `input` into `output`.
    ///
    /// The input is memory-mapped. On failure the partially written output
    /// file is removed.
    pub fn decompress_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<RunStats> {
        let output = output.as_ref();
        let input = MmapInput::open(input.as_ref())?;

        let result = create_output(output).and_then(|writer| {
            let (writer, stats) = self.decompress_slice(input.as_slice(), writer)?;
            finish_output(writer)?;
            Ok(stats)
        });
        if result.is_err() {
            remove_partial_output(output);
        }
        result
    }

    /// Reads `reader` to the end and decompresses it into `writer`.
    ///
    /// Member discovery needs random access, so the whole compressed input is
    /// buffered first.
    pub fn decompress<R: Read, W: Write + Send>(
        &self,
        mut reader: R,
        writer: W,
    ) -> Result<(W, RunStats)> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|error| GzblockError::Io(error).with_context("reading compressed input"))?;
        self.decompress_slice(&data, writer)
    }

    /// Decompresses an in-memory multi-member gzip stream into `writer`.
    ///
    /// # Errors
    /// [`GzblockError::InvalidFormat`] for empty or non-gzip input,
    /// [`GzblockError::CorruptMember`] when the member chain breaks, and any
    /// I/O error from `writer`.
    pub fn decompress_slice<W: Write + Send>(
        &self,
        data: &[u8],
        writer: W,
    ) -> Result<(W, RunStats)> {
        let started_at = Instant::now();
        let result = self.decompress_inner(data, writer, started_at);
        record_run(RunKind::Decompress, result.is_ok());
        result
    }

    fn decompress_inner<W: Write + Send>(
        &self,
        data: &[u8],
        writer: W,
        started_at: Instant,
    ) -> Result<(W, RunStats)> {
        if data.is_empty() {
            return Err(GzblockError::InvalidFormat("empty input is not a gzip stream"));
        }
        if !data.starts_with(&SIGNATURE) {
            return Err(GzblockError::InvalidFormat("input does not start with a gzip member"));
        }

        let (mut writer, mut stats) = match index_members(data) {
            Some(spans) => {
                tracing::debug!(members = spans.len(), "indexed stream detected");
                self.decompress_indexed(data, spans, writer)?
            }
            None => {
                tracing::debug!("no member index, scanning for member boundaries");
                self.decompress_scanned(data, writer)?
            }
        };
        writer.flush()?;

        stats.elapsed = started_at.elapsed();
        tracing::debug!(
            framing = ?stats.framing,
            members = stats.blocks,
            input_bytes = stats.input_bytes,
            output_bytes = stats.output_bytes,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "decompression finished"
        );
        Ok((writer, stats))
    }

    fn decompress_indexed<W: Write + Send>(
        &self,
        data: &[u8],
        spans: Vec<MemberSpan>,
        writer: W,
    ) -> Result<(W, RunStats)> {
        let members = spans.len() as u64;
        let workers = self.options.workers.min(spans.len()).max(1);
        let queue_capacity = self.options.effective_queue_capacity(workers);

        let shared = PipelineShared::new(
            queue_capacity,
            OrderedWriteGate::with_progress(writer, Arc::clone(&self.progress)),
        );
        shared.gate.set_total(members);

        let pool = WorkerPool::with_telemetry(workers, Arc::clone(&self.worker_telemetry));
        let run = run_queued(&shared, &pool, &DecompressMember, move |queue| {
            for span in &spans {
                let block = Block::borrowed(span.sequence, &data[span.start..span.end]);
                if !queue.enqueue(block) {
                    return Err(GzblockError::Cancelled);
                }
            }
            Ok(())
        });

        let (writer, gate) = shared.finish()?;
        if gate.committed != members {
            return Err(GzblockError::SequenceGap {
                expected: members,
                written: gate.committed,
            });
        }

        Ok((
            writer,
            RunStats {
                kind: RunKind::Decompress,
                framing: FramingMode::Indexed,
                elapsed: Default::default(),
                input_bytes: data.len() as u64,
                output_bytes: gate.bytes_written,
                blocks: members,
                workers: run.runtime.workers,
                scan: None,
                buffer_pool: None,
            },
        ))
    }

    fn decompress_scanned<W: Write + Send>(
        &self,
        data: &[u8],
        writer: W,
    ) -> Result<(W, RunStats)> {
        let scanner = MemberBoundaryScanner::new(data, self.options.partition_size);
        let partitions = scanner.partitions();
        let workers = self.options.workers.min(partitions.len()).max(1);
        tracing::debug!(
            partitions = partitions.len(),
            partition_size = self.options.partition_size,
            workers,
            "starting scan"
        );

        let gate = OrderedWriteGate::with_progress(writer, Arc::clone(&self.progress));
        gate.set_total(partitions.len() as u64);
        let failure = FailureSlot::new();
        let next_partition = AtomicUsize::new(0);

        let pool = WorkerPool::with_telemetry(workers, Arc::clone(&self.worker_telemetry));
        let runtime = pool.run(
            "scan",
            |_| {
                if failure.is_failed() {
                    return None;
                }
                partitions.get(next_partition.fetch_add(1, Ordering::Relaxed)).copied()
            },
            |_, part| {
                let speculative = scanner.scan_partition(&part);
                let Some(mut turn) = gate.acquire_turn(part.index as u64)? else {
                    return Ok(());
                };
                let members = scanner.settle(&part, speculative)?;
                for member in &members {
                    turn.write_chunk(&member.payload)?;
                }
                turn.commit();
                Ok(())
            },
            |error| {
                failure.record(error);
                gate.fail();
            },
        );

        if let Some(error) = failure.take() {
            return Err(error);
        }
        let (writer, summary) = gate.into_inner();
        let expected = partitions.len() as u64;
        if summary.committed != expected {
            return Err(GzblockError::SequenceGap {
                expected,
                written: summary.committed,
            });
        }
        if scanner.settled_end() != data.len() {
            return Err(GzblockError::CorruptMember {
                offset: scanner.settled_end() as u64,
                reason: "member chain stops before end of input".to_string(),
            });
        }

        let scan = scanner.stats();
        Ok((
            writer,
            RunStats {
                kind: RunKind::Decompress,
                framing: FramingMode::MultiMember,
                elapsed: Default::default(),
                input_bytes: data.len() as u64,
                output_bytes: summary.bytes_written,
                blocks: scan.members,
                workers: runtime.workers,
                scan: Some(scan),
                buffer_pool: None,
            },
        ))
    }
}

/// Decompresses the gzip file at `input` into `output` using `options`.
pub fn decompress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: PipelineOptions,
) -> Result<RunStats> {
    DecompressPipeline::new(options)?.decompress_file(input, output)
}
