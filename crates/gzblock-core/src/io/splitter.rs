use std::io::Read;
use std::sync::Arc;

use crate::GzblockError;
use crate::buffer::BufferPool;
use crate::core::BoundedBlockQueue;
use crate::telemetry::{self, tags};
use crate::types::{Block, Result};

/// Cuts a sequential input into fixed-size blocks.
///
/// Blocks are numbered densely from zero and pushed onto a bounded queue, so
/// the reader stalls whenever workers fall behind. Only the last block may be
/// short.
#[derive(Debug, Clone)]
pub struct BlockSplitter {
    block_size: usize,
    buffer_pool: Arc<BufferPool>,
}

/// What the splitter produced before reaching end of input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub blocks: u64,
    pub bytes: u64,
}

impl BlockSplitter {
    pub fn new(block_size: usize, buffer_pool: Arc<BufferPool>) -> Self {
        Self {
            block_size: block_size.max(1),
            buffer_pool,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks an input of `len` bytes splits into.
    pub fn block_count(len: u64, block_size: usize) -> u64 {
        len.div_ceil(block_size.max(1) as u64)
    }

    /// Reads `reader` to the end, enqueueing one block per `block_size` bytes.
    ///
    /// Does not close the queue. Returns [`GzblockError::Cancelled`] when the
    /// queue is closed underneath it.
    pub fn split_into<R: Read>(
        &self,
        mut reader: R,
        queue: &BoundedBlockQueue<Block<'_>>,
    ) -> Result<SplitSummary> {
        let mut summary = SplitSummary::default();
        loop {
            let mut buffer = self.buffer_pool.acquire();
            let read = (&mut reader)
                .take(self.block_size as u64)
                .read_to_end(buffer.as_mut_vec())
                .map_err(|error| {
                    GzblockError::Io(error)
                        .with_context(format!("reading input block {}", summary.blocks))
                })?;
            if read == 0 {
                break;
            }

            tracing::trace!(sequence = summary.blocks, len = read, "block read");
            if !queue.enqueue(Block::pooled(summary.blocks, buffer)) {
                return Err(GzblockError::Cancelled);
            }
            summary.blocks += 1;
            summary.bytes += read as u64;
            telemetry::increment_counter(
                tags::METRIC_SPLIT_BLOCK_COUNT,
                1,
                &[("subsystem", "split"), ("op", "enqueue")],
            );
            telemetry::increment_counter(
                tags::METRIC_SPLIT_BYTES,
                read as u64,
                &[("subsystem", "split"), ("op", "enqueue")],
            );

            if read < self.block_size {
                break;
            }
        }

        tracing::debug!(blocks = summary.blocks, bytes = summary.bytes, "input split complete");
        Ok(summary)
    }
}
