use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};

use flate2::read::MultiGzDecoder;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn gzblock(args: &[&str], cwd: &Path) -> std::io::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_gzblock"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|index| (index % 251) as u8 ^ (index / 7) as u8).collect()
}

#[test]
fn compress_then_decompress_with_default_names() -> TestResult {
    let dir = tempfile::tempdir()?;
    let input = sample(300_000);
    std::fs::write(dir.path().join("data.bin"), &input)?;

    let output = gzblock(&["compress", "data.bin", "--block-size", "64K", "--workers", "3"], dir.path())?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let compressed = std::fs::read(dir.path().join("data.bin.gz"))?;
    let mut decoded = Vec::new();
    MultiGzDecoder::new(&compressed[..]).read_to_end(&mut decoded)?;
    assert_eq!(decoded, input);

    std::fs::remove_file(dir.path().join("data.bin"))?;
    let output = gzblock(&["decompress", "data.bin.gz", "--workers", "2", "--stats"], dir.path())?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stderr).contains("decompress complete"));
    assert_eq!(std::fs::read(dir.path().join("data.bin"))?, input);
    Ok(())
}

#[test]
fn refuses_to_overwrite_without_force() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("a.txt"), b"hello")?;
    std::fs::write(dir.path().join("a.txt.gz"), b"keep me")?;

    let output = gzblock(&["compress", "a.txt"], dir.path())?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("error: "));
    assert_eq!(std::fs::read(dir.path().join("a.txt.gz"))?, b"keep me");

    let output = gzblock(&["compress", "a.txt", "--force", "--framing", "indexed"], dir.path())?;
    assert!(output.status.success());
    assert_ne!(std::fs::read(dir.path().join("a.txt.gz"))?, b"keep me");
    Ok(())
}

#[test]
fn decompress_needs_an_output_name_without_gz_suffix() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("plain"), b"whatever")?;

    let output = gzblock(&["decompress", "plain"], dir.path())?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("pass an output path"));
    Ok(())
}

#[test]
fn missing_input_fails_with_message() -> TestResult {
    let dir = tempfile::tempdir()?;
    let output = gzblock(&["compress", "nope.bin"], dir.path())?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("input not found"));
    assert!(!dir.path().join("nope.bin.gz").exists());
    Ok(())
}

#[test]
fn streams_between_stdin_and_stdout() -> TestResult {
    let dir = tempfile::tempdir()?;
    let input = sample(100_000);

    let mut child = Command::new(env!("CARGO_BIN_EXE_gzblock"))
        .args(["compress", "-", "--block-size", "16K"])
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    let mut stdin = child.stdin.take().ok_or("no stdin")?;
    let payload = input.clone();
    let feeder = std::thread::spawn(move || stdin.write_all(&payload));
    let compressed = child.wait_with_output()?;
    feeder.join().map_err(|_| "feeder panicked")??;
    assert!(compressed.status.success());

    let mut child = Command::new(env!("CARGO_BIN_EXE_gzblock"))
        .args(["decompress", "-"])
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    let mut stdin = child.stdin.take().ok_or("no stdin")?;
    let payload = compressed.stdout;
    let feeder = std::thread::spawn(move || stdin.write_all(&payload));
    let restored = child.wait_with_output()?;
    feeder.join().map_err(|_| "feeder panicked")??;
    assert!(restored.status.success());
    assert_eq!(restored.stdout, input);
    Ok(())
}

#[test]
fn failed_stdin_run_leaves_no_output_file() -> TestResult {
    let dir = tempfile::tempdir()?;

    let mut child = Command::new(env!("CARGO_BIN_EXE_gzblock"))
        .args(["decompress", "-", "restored.bin"])
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let mut stdin = child.stdin.take().ok_or("no stdin")?;
    stdin.write_all(b"this is not gzip data")?;
    drop(stdin);
    let output = child.wait_with_output()?;

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid format"));
    assert!(!dir.path().join("restored.bin").exists());
    Ok(())
}
