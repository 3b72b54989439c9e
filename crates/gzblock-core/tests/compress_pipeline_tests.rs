mod support;

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use gzblock_core::compression::decode_exact_member;
use gzblock_core::{
    CompressPipeline, FramingMode, GzblockError, PipelineOptions, RunKind, compress_file,
    decompress_file,
};
use support::{TestResult, compress_bytes, decompress_bytes, gunzip, member_offsets, sample_input};

fn options(block_size: usize, workers: usize) -> PipelineOptions {
    PipelineOptions::default()
        .with_block_size(block_size)
        .with_workers(workers)
}

#[test]
fn round_trips_edge_sized_inputs() -> TestResult {
    let block_size = 4096;
    for len in [0usize, 1, block_size - 1, block_size, block_size + 1, 5 * block_size + 17] {
        let input = sample_input(len);
        let (compressed, stats) = compress_bytes(&input, options(block_size, 4))?;
        assert_eq!(stats.kind, RunKind::Compress);
        assert_eq!(stats.input_bytes, len as u64);
        assert_eq!(stats.output_bytes, compressed.len() as u64);
        assert_eq!(stats.blocks, (len as u64).div_ceil(block_size as u64).max(1));

        assert_eq!(gunzip(&compressed)?, input, "reference decoder, len {len}");
        let (restored, _) = decompress_bytes(&compressed, options(block_size, 3))?;
        assert_eq!(restored, input, "pipeline decoder, len {len}");
    }
    Ok(())
}

#[test]
fn empty_input_produces_one_empty_member() -> TestResult {
    let (compressed, stats) = compress_bytes(&[], PipelineOptions::default())?;
    assert_eq!(stats.blocks, 1);
    assert!(stats.workers.is_empty());
    assert_eq!(member_offsets(&compressed), vec![0]);
    assert!(gunzip(&compressed)?.is_empty());
    Ok(())
}

#[test]
fn zero_length_hint_still_drains_the_reader() -> TestResult {
    let input = sample_input(10_000);
    let pipeline = CompressPipeline::new(options(4096, 2))?;
    let (compressed, stats) = pipeline.compress(&input[..], Some(0), Vec::new())?;
    assert_eq!(stats.input_bytes, input.len() as u64);
    assert_eq!(stats.blocks, 3);
    assert_eq!(gunzip(&compressed)?, input);
    Ok(())
}

#[cfg(unix)]
#[test]
fn named_pipe_input_is_not_mistaken_for_empty() -> TestResult {
    let dir = tempfile::tempdir()?;
    let fifo = dir.path().join("input.fifo");
    let output = dir.path().join("input.fifo.gz");
    let status = std::process::Command::new("mkfifo").arg(&fifo).status()?;
    assert!(status.success(), "mkfifo failed");

    let payload = b"hello from a pipe, this must survive".repeat(100);
    let writer_path = fifo.clone();
    let writer_payload = payload.clone();
    let feeder = std::thread::spawn(move || -> io::Result<()> {
        let mut pipe = std::fs::OpenOptions::new().write(true).open(writer_path)?;
        pipe.write_all(&writer_payload)
    });

    let stats = compress_file(&fifo, &output, options(1000, 2))?;
    feeder.join().map_err(|_| "pipe writer panicked")??;

    assert_eq!(stats.input_bytes, payload.len() as u64);
    assert_eq!(stats.blocks, 4);
    assert_eq!(gunzip(&std::fs::read(&output)?)?, payload);
    Ok(())
}

#[test]
fn output_is_identical_across_worker_counts() -> TestResult {
    let input = sample_input(300 * 1024 + 123);
    let (reference, _) = compress_bytes(&input, options(16 * 1024, 1))?;
    for workers in [2usize, 8] {
        let (compressed, _) = compress_bytes(&input, options(16 * 1024, workers))?;
        assert_eq!(compressed, reference, "{workers} workers");
    }
    Ok(())
}

#[test]
fn ten_blocks_become_ten_independent_members() -> TestResult {
    let mib = 1024 * 1024;
    let input = sample_input(10 * mib);
    let (compressed, stats) = compress_bytes(&input, options(mib, 4))?;
    assert_eq!(stats.blocks, 10);
    assert_eq!(stats.workers.len(), 4);

    let offsets = member_offsets(&compressed);
    assert_eq!(offsets.len(), 10);
    for (index, window) in offsets
        .iter()
        .copied()
        .chain([compressed.len()])
        .collect::<Vec<_>>()
        .windows(2)
        .enumerate()
    {
        let payload = decode_exact_member(&compressed[window[0]..window[1]])
            .map_err(|error| error.reason)?;
        assert_eq!(payload, &input[index * mib..(index + 1) * mib]);
    }

    let (restored, stats) = decompress_bytes(&compressed, options(mib, 3))?;
    assert_eq!(stats.blocks, 10);
    assert_eq!(restored, input);
    Ok(())
}

#[test]
fn stream_input_without_length_hint() -> TestResult {
    let input = sample_input(70_000);
    let pipeline = CompressPipeline::new(options(8192, 3))?;
    let (compressed, stats) = pipeline.compress(&input[..], None, Vec::new())?;
    assert_eq!(stats.blocks, 9);
    assert_eq!(gunzip(&compressed)?, input);

    let (empty, stats) = pipeline.compress(&[][..], None, Vec::new())?;
    assert_eq!(stats.blocks, 1);
    assert!(gunzip(&empty)?.is_empty());
    Ok(())
}

#[test]
fn progress_reports_every_block_in_order() -> TestResult {
    let ticks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ticks);
    let pipeline = CompressPipeline::new(options(1024, 4))?.with_progress(Arc::new(
        move |completed: u64, total: Option<u64>| {
            sink.lock().unwrap().push((completed, total));
        },
    ));

    let input = sample_input(10 * 1024);
    pipeline.compress(&input[..], Some(input.len() as u64), Vec::new())?;

    let ticks = ticks.lock().unwrap();
    let completed: Vec<u64> = ticks.iter().map(|(completed, _)| *completed).collect();
    assert_eq!(completed, (1..=10).collect::<Vec<_>>());
    assert_eq!(ticks.last().map(|(_, total)| *total), Some(Some(10)));
    Ok(())
}

#[test]
fn indexed_framing_is_plain_gzip() -> TestResult {
    let input = sample_input(200_000);
    let framed = options(32 * 1024, 4).with_framing(FramingMode::Indexed);
    let (compressed, _) = compress_bytes(&input, framed)?;
    assert_eq!(gunzip(&compressed)?, input);

    let (restored, stats) = decompress_bytes(&compressed, options(32 * 1024, 2))?;
    assert_eq!(stats.framing, FramingMode::Indexed);
    assert_eq!(stats.blocks, 7);
    assert!(stats.scan.is_none());
    assert_eq!(restored, input);
    Ok(())
}

#[test]
fn file_round_trip() -> TestResult {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("data.bin");
    let packed = dir.path().join("data.bin.gz");
    let unpacked = dir.path().join("data.out");
    let input = sample_input(123_457);
    std::fs::write(&source, &input)?;

    let stats = compress_file(&source, &packed, options(10_000, 4))?;
    assert_eq!(stats.blocks, 13);
    assert_eq!(std::fs::metadata(&packed)?.len(), stats.output_bytes);

    let stats = decompress_file(&packed, &unpacked, options(10_000, 4).with_partition_size(4096))?;
    assert_eq!(stats.output_bytes, input.len() as u64);
    assert_eq!(std::fs::read(&unpacked)?, input);
    Ok(())
}

#[test]
fn missing_input_is_reported_before_output_is_created() -> TestResult {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("missing.bin");
    let output = dir.path().join("missing.bin.gz");

    match compress_file(&missing, &output, PipelineOptions::default()) {
        Err(GzblockError::InputNotFound(path)) => assert_eq!(path, missing),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!output.exists());
    Ok(())
}

#[test]
fn rejects_invalid_options() {
    assert!(matches!(
        CompressPipeline::new(PipelineOptions::default().with_block_size(0)),
        Err(GzblockError::InvalidConfig(_))
    ));
    assert!(matches!(
        CompressPipeline::new(PipelineOptions::default().with_level(12)),
        Err(GzblockError::InvalidConfig(_))
    ));
}

/// Accepts `budget` bytes, then fails every write.
struct FailingWriter {
    budget: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::other("disk full"));
        }
        let n = buf.len().min(self.budget);
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_failure_surfaces_once_without_deadlock() -> TestResult {
    let input = sample_input(512 * 1024);
    let pipeline = CompressPipeline::new(options(4096, 8).with_queue_capacity(2))?;
    let writer = FailingWriter { budget: 10_000 };

    let error = match pipeline.compress(&input[..], Some(input.len() as u64), writer) {
        Err(error) => error,
        Ok(_) => panic!("write budget should have been exceeded"),
    };
    assert!(!error.is_cancelled());
    assert!(error.to_string().contains("disk full"), "{error}");
    Ok(())
}
