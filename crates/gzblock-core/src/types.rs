use std::time::Duration;

use crate::buffer::PooledBuffer;
use crate::error::GzblockError;

pub type Result<T> = std::result::Result<T, GzblockError>;

/// Converts a duration to whole microseconds, saturating at `u64::MAX`.
pub fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

/// A unit of work flowing from a producer to the worker pool.
///
/// Blocks carry a dense sequence number starting at zero; the write gate uses it
/// to restore input order on the output side.
#[derive(Debug)]
pub struct Block<'a> {
    pub sequence: u64,
    pub data: BlockData<'a>,
}

/// Backing storage for a [`Block`].
#[derive(Debug)]
pub enum BlockData<'a> {
    /// Buffer drawn from a [`crate::BufferPool`]; returned to the pool on drop.
    Pooled(PooledBuffer),
    Owned(Vec<u8>),
    /// Span of a larger input that outlives the pipeline run.
    Borrowed(&'a [u8]),
}

impl Block<'static> {
    pub fn owned(sequence: u64, data: Vec<u8>) -> Self {
        Self {
            sequence,
            data: BlockData::Owned(data),
        }
    }

    pub fn pooled(sequence: u64, buffer: PooledBuffer) -> Self {
        Self {
            sequence,
            data: BlockData::Pooled(buffer),
        }
    }
}

impl<'a> Block<'a> {
    pub fn borrowed(sequence: u64, data: &'a [u8]) -> Self {
        Self {
            sequence,
            data: BlockData::Borrowed(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
}

impl BlockData<'_> {
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Pooled(buffer) => buffer.as_slice(),
            Self::Owned(data) => data,
            Self::Borrowed(data) => data,
        }
    }
}

/// Byte range of the compressed input assigned to one decompression task.
///
/// Ranges are contiguous and non-overlapping; `index` doubles as the write-gate
/// sequence of the partition's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBoundary {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl PartitionBoundary {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Exact location of a framed member inside the compressed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSpan {
    pub sequence: u64,
    pub start: usize,
    pub end: usize,
}

impl MemberSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A member located and decoded by the boundary scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedMember {
    pub offset: usize,
    pub len: usize,
    pub payload: Vec<u8>,
}

impl ScannedMember {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}
