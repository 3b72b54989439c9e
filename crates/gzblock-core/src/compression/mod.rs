use std::time::Instant;

use crate::format::{FramingMode, encode_indexed_member};
use crate::telemetry::{self, tags};
use crate::types::{Block, duration_to_us};
use crate::{GzblockError, Result};

pub mod gzip;

pub use gzip::{DecodedMember, NotAMember, compress_member, decode_exact_member, try_decode_member};

/// Per-block work run by the queued pipeline skeleton.
///
/// Compression and framed decompression share the same producer, worker and
/// write-gate wiring and differ only in the transform they plug in.
pub trait BlockTransform: Send + Sync {
    /// Short label used for thread names and metrics.
    fn kind(&self) -> &'static str;

    fn apply(&self, block: &Block<'_>) -> Result<Vec<u8>>;
}

/// Compresses a block into one self-contained gzip member.
#[derive(Debug, Clone, Copy)]
pub struct CompressBlock {
    level: u32,
    framing: FramingMode,
}

impl CompressBlock {
    pub fn new(level: u32, framing: FramingMode) -> Self {
        Self { level, framing }
    }
}

impl BlockTransform for CompressBlock {
    fn kind(&self) -> &'static str {
        "compress"
    }

    fn apply(&self, block: &Block<'_>) -> Result<Vec<u8>> {
        let started_at = Instant::now();
        let result = match self.framing {
            FramingMode::MultiMember => compress_member(block.data(), self.level),
            FramingMode::Indexed => encode_indexed_member(block.data(), block.sequence, self.level),
        };
        let result = result.map_err(|error| {
            error.with_context(format!("compressing block {}", block.sequence))
        });

        if let Ok(member) = &result {
            record(
                "compress",
                block.len() as u64,
                member.len() as u64,
                duration_to_us(started_at.elapsed()),
            );
        }
        result
    }
}

/// Decodes a block holding exactly one member.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressMember;

impl BlockTransform for DecompressMember {
    fn kind(&self) -> &'static str {
        "decompress"
    }

    fn apply(&self, block: &Block<'_>) -> Result<Vec<u8>> {
        let started_at = Instant::now();
        let payload = decode_exact_member(block.data()).map_err(|error| {
            GzblockError::DecompressionError(format!("member {}: {}", block.sequence, error.reason))
        })?;
        record(
            "decompress",
            block.len() as u64,
            payload.len() as u64,
            duration_to_us(started_at.elapsed()),
        );
        Ok(payload)
    }
}

fn record(op: &'static str, input_bytes: u64, output_bytes: u64, elapsed_us: u64) {
    let labels = [("subsystem", "compression"), ("op", op)];
    telemetry::increment_counter(tags::METRIC_COMPRESSION_BLOCK_COUNT, 1, &labels);
    telemetry::record_histogram(tags::METRIC_COMPRESSION_LATENCY_US, elapsed_us, &labels);
    telemetry::record_histogram(tags::METRIC_COMPRESSION_INPUT_BYTES, input_bytes, &labels);
    telemetry::record_histogram(tags::METRIC_COMPRESSION_OUTPUT_BYTES, output_bytes, &labels);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::index_members;

    #[test]
    fn compressed_block_decodes_back() {
        let block = Block::owned(3, b"block payload".repeat(50));
        for framing in [FramingMode::MultiMember, FramingMode::Indexed] {
            let member = CompressBlock::new(6, framing).apply(&block).unwrap();
            let decoded = DecompressMember.apply(&Block::borrowed(3, &member)).unwrap();
            assert_eq!(decoded, block.data());
        }
    }

    #[test]
    fn indexed_block_records_its_sequence() {
        let member = CompressBlock::new(1, FramingMode::Indexed)
            .apply(&Block::owned(0, vec![1, 2, 3]))
            .unwrap();
        let spans = index_members(&member).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].len(), member.len());
    }

    #[test]
    fn malformed_member_names_its_sequence() {
        let error = DecompressMember
            .apply(&Block::borrowed(9, b"\x1f\x8b\x08\0\0\0\0\0\0\xff garbage"))
            .unwrap_err();
        assert!(error.to_string().contains("member 9"), "{error}");
    }
}
