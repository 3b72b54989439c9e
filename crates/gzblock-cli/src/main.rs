use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use gzblock_core::{
    CompressPipeline, DecompressPipeline, FramingMode, GzblockError, PipelineOptions,
    ProgressSink, RunKind, RunStats,
};
use tracing_subscriber::EnvFilter;

const STDIO_PATH: &str = "-";

#[derive(Parser)]
#[command(
    name = "gzblock",
    version,
    about = "Parallel block gzip compressor",
    long_about = "Compress and decompress files as independent gzip members on a worker pool. \
                  Output is a standard multi-member gzip stream."
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a multi-member gzip file.
    Compress {
        /// Source file, or `-` for stdin.
        input: PathBuf,

        /// Destination path (defaults to <input>.gz, or stdout for stdin).
        output: Option<PathBuf>,

        /// Uncompressed block size (supports suffixes K/M/G, e.g. 64K, 1M).
        #[arg(long, default_value = "1M", value_parser = parse_size)]
        block_size: usize,

        /// Deflate level, 0 (store) to 9 (best).
        #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        /// On-disk framing of the members.
        #[arg(long, value_enum, default_value_t = FramingArg::MultiMember)]
        framing: FramingArg,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Decompress a multi-member gzip file.
    Decompress {
        /// Source file, or `-` for stdin.
        input: PathBuf,

        /// Destination path (defaults to <input> without `.gz`, or stdout for stdin).
        output: Option<PathBuf>,

        /// Compressed bytes per scan partition (supports suffixes K/M/G).
        #[arg(long, default_value = "1M", value_parser = parse_size)]
        partition_size: usize,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Number of worker threads (defaults to CPU count).
    #[arg(long, default_value_t = num_cpus::get())]
    workers: usize,

    /// Blocks buffered between the reader and the workers (0 = twice the workers).
    #[arg(long, default_value_t = 0)]
    queue_capacity: usize,

    /// Overwrite an existing output file.
    #[arg(short, long, default_value_t = false)]
    force: bool,

    /// Show a progress line on stderr.
    #[arg(long, default_value_t = false)]
    progress: bool,

    /// Print a run summary on stderr when done.
    #[arg(long, default_value_t = false)]
    stats: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FramingArg {
    MultiMember,
    Indexed,
}

impl From<FramingArg> for FramingMode {
    fn from(value: FramingArg) -> Self {
        match value {
            FramingArg::MultiMember => FramingMode::MultiMember,
            FramingArg::Indexed => FramingMode::Indexed,
        }
    }
}

/// Where a command writes its output.
enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    fn label(&self) -> String {
        match self {
            Self::Stdout => "<stdout>".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Compress {
            input,
            output,
            block_size,
            level,
            framing,
            common,
        } => {
            let options = PipelineOptions::default()
                .with_block_size(block_size)
                .with_level(level)
                .with_framing(framing.into());
            compress_command(&input, output, options, &common)?
        }
        Commands::Decompress {
            input,
            output,
            partition_size,
            common,
        } => {
            let options = PipelineOptions::default().with_partition_size(partition_size);
            decompress_command(&input, output, options, &common)?
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn compress_command(
    input: &Path,
    output: Option<PathBuf>,
    options: PipelineOptions,
    common: &CommonArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let destination = resolve_destination(input, output, default_compress_output)?;
    check_overwrite(&destination, common.force)?;

    let options = options
        .with_workers(common.workers)
        .with_queue_capacity(common.queue_capacity);
    let mut pipeline = CompressPipeline::new(options)?;
    if common.progress {
        pipeline = pipeline.with_progress(Arc::new(ConsoleProgress));
    }

    let stats = match (is_stdio(input), &destination) {
        (false, Destination::File(path)) => pipeline.compress_file(input, path)?,
        (true, Destination::File(path)) => {
            write_output_file(path, |writer| pipeline.compress(io::stdin(), None, writer))?
        }
        (from_stdin, Destination::Stdout) => {
            let writer = BufWriter::new(io::stdout());
            let (writer, stats) = if from_stdin {
                pipeline.compress(io::stdin(), None, writer)?
            } else {
                let file = File::open(input)?;
                let metadata = file.metadata()?;
                let len = metadata.is_file().then(|| metadata.len());
                pipeline.compress(file, len, writer)?
            };
            writer.into_inner().map_err(|error| error.into_error())?;
            stats
        }
    };

    finish_progress(common.progress);
    if common.stats {
        print_summary(&display_input(input), &destination.label(), &stats);
    }
    Ok(())
}

fn decompress_command(
    input: &Path,
    output: Option<PathBuf>,
    options: PipelineOptions,
    common: &CommonArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let destination = resolve_destination(input, output, default_decompress_output)?;
    check_overwrite(&destination, common.force)?;

    let options = options
        .with_workers(common.workers)
        .with_queue_capacity(common.queue_capacity);
    let mut pipeline = DecompressPipeline::new(options)?;
    if common.progress {
        pipeline = pipeline.with_progress(Arc::new(ConsoleProgress));
    }

    let stats = match (is_stdio(input), &destination) {
        (false, Destination::File(path)) => pipeline.decompress_file(input, path)?,
        (true, Destination::File(path)) => {
            write_output_file(path, |writer| pipeline.decompress(io::stdin(), writer))?
        }
        (from_stdin, Destination::Stdout) => {
            let writer = BufWriter::new(io::stdout());
            let (writer, stats) = if from_stdin {
                pipeline.decompress(io::stdin(), writer)?
            } else {
                let input = gzblock_core::MmapInput::open(input)?;
                pipeline.decompress_slice(input.as_slice(), writer)?
            };
            writer.into_inner().map_err(|error| error.into_error())?;
            stats
        }
    };

    finish_progress(common.progress);
    if common.stats {
        print_summary(&display_input(input), &destination.label(), &stats);
    }
    Ok(())
}

/// Creates `path`, lets `write` fill it, and removes the file again if any
/// step fails.
fn write_output_file<F>(path: &Path, write: F) -> Result<RunStats, Box<dyn std::error::Error>>
where
    F: FnOnce(BufWriter<File>) -> Result<(BufWriter<File>, RunStats), GzblockError>,
{
    let file = File::create(path)?;
    let result = write(BufWriter::new(file))
        .map_err(Box::<dyn std::error::Error>::from)
        .and_then(|(writer, stats)| {
            writer.into_inner().map_err(|error| error.into_error())?;
            Ok(stats)
        });
    if result.is_err() {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to remove partial output")
            }
        }
    }
    result
}

fn resolve_destination(
    input: &Path,
    output: Option<PathBuf>,
    default_output: fn(&Path) -> Result<PathBuf, String>,
) -> Result<Destination, Box<dyn std::error::Error>> {
    match output {
        Some(path) if is_stdio(&path) => Ok(Destination::Stdout),
        Some(path) => Ok(Destination::File(path)),
        None if is_stdio(input) => Ok(Destination::Stdout),
        None => Ok(Destination::File(default_output(input)?)),
    }
}

fn check_overwrite(destination: &Destination, force: bool) -> Result<(), String> {
    match destination {
        Destination::File(path) if path.exists() && !force => Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )),
        _ => Ok(()),
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO_PATH
}

fn display_input(input: &Path) -> String {
    if is_stdio(input) {
        "<stdin>".to_string()
    } else {
        input.display().to_string()
    }
}

fn default_compress_output(input: &Path) -> Result<PathBuf, String> {
    let mut out = input.as_os_str().to_os_string();
    out.push(".gz");
    Ok(PathBuf::from(out))
}

fn default_decompress_output(input: &Path) -> Result<PathBuf, String> {
    let has_gz_extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if has_gz_extension {
        let out = input.with_extension("");
        if out != input && !out.as_os_str().is_empty() {
            return Ok(out);
        }
    }

    Err(format!(
        "cannot derive an output name for {} (no .gz suffix); pass an output path",
        input.display()
    ))
}

/// Redraws a single stderr line on every committed block.
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_block_completed(&self, completed: u64, total: Option<u64>) {
        let line = match total {
            Some(total) if total > 0 => {
                let percent = (completed.min(total) as f64 / total as f64) * 100.0;
                format!("\r\x1b[2K[{percent:6.2}%] blocks {completed}/{total}")
            }
            _ => format!("\r\x1b[2K[  ...  ] blocks {completed}"),
        };
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

fn finish_progress(enabled: bool) {
    if enabled {
        eprintln!();
    }
}

fn print_summary(input: &str, output: &str, stats: &RunStats) {
    let elapsed_secs = stats.elapsed.as_secs_f64().max(1e-6);
    let read_bps = stats.input_bytes as f64 / elapsed_secs;
    let write_bps = stats.output_bytes as f64 / elapsed_secs;
    let (title, unit) = match stats.kind {
        RunKind::Compress => ("compress complete", "blocks"),
        RunKind::Decompress => ("decompress complete", "members"),
    };

    eprintln!("{title}");
    eprintln!("  input: {input}");
    eprintln!("  output: {output}");
    eprintln!("  framing: {:?}", stats.framing);
    eprintln!("  elapsed: {}", format_duration(stats.elapsed));
    eprintln!("  input bytes: {}", format_bytes(stats.input_bytes));
    eprintln!("  output bytes: {}", format_bytes(stats.output_bytes));
    eprintln!("  output/input ratio: {:.3}x", stats.ratio());
    eprintln!("  read throughput: {}/s", format_rate(read_bps));
    eprintln!("  write throughput: {}/s", format_rate(write_bps));
    eprintln!("  {unit}: {}", stats.blocks);

    if let Some(scan) = &stats.scan {
        eprintln!(
            "  scan: {} partitions | {} candidates | {} rejected | {} discarded | {} resynced",
            scan.partitions, scan.candidates, scan.rejected, scan.discarded, scan.resynced
        );
    }

    let total_tasks: usize = stats.workers.iter().map(|worker| worker.tasks_completed).sum();
    let max_tasks = stats
        .workers
        .iter()
        .map(|worker| worker.tasks_completed)
        .max()
        .unwrap_or(0);
    let min_tasks = stats
        .workers
        .iter()
        .map(|worker| worker.tasks_completed)
        .min()
        .unwrap_or(0);
    eprintln!(
        "  scheduler: {} workers | task balance min/max {min_tasks}/{max_tasks} | total tasks {total_tasks}",
        stats.workers.len()
    );
    for worker in &stats.workers {
        eprintln!(
            "    w{:02} tasks {:>6} | uptime {:>8} | busy {:>8} | idle {:>8} | util {:>6.2}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.uptime),
            format_duration(worker.busy),
            format_duration(worker.idle),
            worker.utilization * 100.0,
        );
    }

    if let Some(pool) = &stats.buffer_pool {
        eprintln!(
            "  buffer pool: created {} | recycled {} | dropped {}",
            pool.created, pool.recycled, pool.dropped
        );
    }
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;

    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" | "kib" => 1024usize,
        "m" | "mb" | "mib" => 1024usize * 1024usize,
        "g" | "gb" | "gib" => 1024usize * 1024usize * 1024usize,
        other => {
            return Err(format!("invalid size suffix '{other}' in '{value}'"));
        }
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: {value}"))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }
    format_bytes(bytes_per_second as u64)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
