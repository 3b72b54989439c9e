#![allow(dead_code)]

use std::io::Read;

use flate2::read::MultiGzDecoder;
use gzblock_core::{CompressPipeline, DecompressPipeline, PipelineOptions, RunStats};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Deterministic, moderately compressible bytes.
pub fn sample_input(len: usize) -> Vec<u8> {
    let mut state = 0x9e37_79b9u32;
    (0..len)
        .map(|index| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if index % 4 == 0 {
                (state >> 24) as u8
            } else {
                b"the quick brown fox "[index % 20]
            }
        })
        .collect()
}

pub fn compress_bytes(
    input: &[u8],
    options: PipelineOptions,
) -> Result<(Vec<u8>, RunStats), Box<dyn std::error::Error>> {
    let pipeline = CompressPipeline::new(options)?;
    Ok(pipeline.compress(input, Some(input.len() as u64), Vec::new())?)
}

pub fn decompress_bytes(
    input: &[u8],
    options: PipelineOptions,
) -> Result<(Vec<u8>, RunStats), Box<dyn std::error::Error>> {
    let pipeline = DecompressPipeline::new(options)?;
    Ok(pipeline.decompress_slice(input, Vec::new())?)
}

/// Decodes with flate2's reference multi-member decoder.
pub fn gunzip(input: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut output = Vec::new();
    MultiGzDecoder::new(input).read_to_end(&mut output)?;
    Ok(output)
}

/// Offsets where a member starts, found by walking the stream with flate2.
pub fn member_offsets(input: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut offset = 0usize;
    while offset < input.len() {
        offsets.push(offset);
        let mut decoder = flate2::bufread::GzDecoder::new(&input[offset..]);
        let mut sink = Vec::new();
        if decoder.read_to_end(&mut sink).is_err() {
            break;
        }
        let remaining = decoder.into_inner().len();
        offset = input.len() - remaining;
    }
    offsets
}
