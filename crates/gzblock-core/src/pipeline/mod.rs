use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;

use crate::GzblockError;
use crate::telemetry::{self, tags};
use crate::types::Result;

mod compress;
mod decompress;
mod shared;
pub mod types;

pub use compress::{CompressPipeline, compress_file};
pub use decompress::{DecompressPipeline, decompress_file};
pub use types::{PipelineOptions, RunKind, RunStats};

const OUTPUT_BUFFER_SIZE: usize = 1 << 20;

/// Opens `path` for sequential reading.
///
/// The length is only returned for regular files; pipes, character devices
/// and `/proc` entries report zero regardless of what they yield.
fn open_input(path: &Path) -> Result<(File, Option<u64>)> {
    let file = File::open(path).map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => GzblockError::InputNotFound(path.to_path_buf()),
        _ => GzblockError::Io(error).with_context(format!("opening {}", path.display())),
    })?;
    let metadata = file.metadata()?;
    let len = metadata.is_file().then(|| metadata.len());
    Ok((file, len))
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|error| {
        GzblockError::Io(error).with_context(format!("creating {}", path.display()))
    })?;
    Ok(BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file))
}

/// Flushes the buffered writer and syncs the file to disk.
fn finish_output(writer: BufWriter<File>) -> Result<()> {
    let file = writer.into_inner().map_err(|error| {
        GzblockError::Io(error.into_error()).with_context("flushing output")
    })?;
    file.sync_all()?;
    Ok(())
}

fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to remove partial output")
        }
    }
}

fn record_run(kind: RunKind, succeeded: bool) {
    let op = match kind {
        RunKind::Compress => "compress",
        RunKind::Decompress => "decompress",
    };
    let labels = [("subsystem", "pipeline"), ("op", op)];
    telemetry::increment_counter(tags::METRIC_PIPELINE_RUN_COUNT, 1, &labels);
    if !succeeded {
        telemetry::increment_counter(tags::METRIC_PIPELINE_FAIL_COUNT, 1, &labels);
    }
}
