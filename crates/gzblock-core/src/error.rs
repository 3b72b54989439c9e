use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GzblockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("corrupt gzip member at offset {offset}: {reason}")]
    CorruptMember { offset: u64, reason: String },
    #[error("compression error: {0}")]
    CompressionError(String),
    #[error("decompression error: {0}")]
    DecompressionError(String),
    #[error("invalid block id (expected {expected}, actual {actual})")]
    InvalidBlockId { expected: u64, actual: u64 },
    #[error("sequence gap: {written} of {expected} blocks reached the output")]
    SequenceGap { expected: u64, written: u64 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("pipeline cancelled")]
    Cancelled,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<GzblockError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl GzblockError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns true for the cancellation marker raised by threads unwinding after another failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Context { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
