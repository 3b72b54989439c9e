use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use memmap2::{Mmap, MmapOptions};

use crate::GzblockError;
use crate::telemetry;
use crate::telemetry::tags;
use crate::types::{Result, duration_to_us};

/// Read-only memory map of a compressed input file.
///
/// The decompression scanner reads the whole input as one slice, which the map
/// provides without copying the file into memory. Zero-length files are not
/// mapped and read as an empty slice.
///
/// # Example
/// ```no_run
/// use gzblock_core::MmapInput;
/// use std::path::Path;
///
/// let input = MmapInput::open(Path::new("data.gz"))?;
/// let bytes: &[u8] = input.as_slice();
/// # Ok::<(), gzblock_core::GzblockError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MmapInput {
    mmap: Option<Arc<Mmap>>,
    path: PathBuf,
    len: u64,
}

impl MmapInput {
    /// Maps `path` read-only.
    ///
    /// # Errors
    /// [`GzblockError::InputNotFound`] when the path does not exist, I/O errors
    /// otherwise.
    pub fn open(path: &Path) -> Result<Self> {
        let started_at = Instant::now();
        let result = (|| {
            let file = File::open(path).map_err(|error| match error.kind() {
                io::ErrorKind::NotFound => GzblockError::InputNotFound(path.to_path_buf()),
                _ => GzblockError::Io(error),
            })?;
            let len = file.metadata()?.len();
            if usize::try_from(len).is_err() {
                return Err(GzblockError::InvalidFormat("input larger than address space"));
            }

            let mmap = if len == 0 {
                None
            } else {
                // SAFETY: read-only map; the file must not be truncated while mapped.
                Some(Arc::new(unsafe { MmapOptions::new().map(&file)? }))
            };

            Ok(Self {
                mmap,
                path: path.to_path_buf(),
                len,
            })
        })();

        telemetry::increment_counter(
            tags::METRIC_MMAP_OPEN_COUNT,
            1,
            &[("subsystem", "mmap"), ("op", "open")],
        );
        telemetry::record_histogram(
            tags::METRIC_MMAP_OPEN_LATENCY_US,
            duration_to_us(started_at.elapsed()),
            &[("subsystem", "mmap"), ("op", "open")],
        );
        match &result {
            Ok(input) => tracing::debug!(path = %path.display(), len = input.len, "mapped input"),
            Err(error) => tracing::debug!(path = %path.display(), %error, "mmap open failed"),
        }

        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len_u64(&self) -> u64 {
        self.len
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whole file contents.
    pub fn as_slice(&self) -> &[u8] {
        match &self.mmap {
            Some(map) => &map[..],
            None => &[],
        }
    }

    /// Returns `start..end` of the file.
    ///
    /// # Errors
    /// Returns an error if the range is reversed or runs past the end of the file.
    pub fn slice(&self, start: usize, end: usize) -> Result<&[u8]> {
        if start > end || end > self.len() {
            return Err(GzblockError::InvalidFormat("invalid mmap slice range"));
        }
        Ok(&self.as_slice()[start..end])
    }
}
