use std::io::Write;

use flate2::{Compression, Decompress, FlushDecompress, GzBuilder, Status};
use thiserror::Error;

use crate::format::{MAX_BLOCK_SIZE, MemberHeader, TRAILER_SIZE};
use crate::types::Result;

const INFLATE_CHUNK: usize = 32 * 1024;

/// One member decoded from the front of a byte slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMember {
    pub payload: Vec<u8>,
    /// Exact member length in the input, header and trailer included.
    pub consumed: usize,
}

/// The bytes at a position do not start a valid gzip member.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a gzip member: {reason}")]
pub struct NotAMember {
    pub reason: String,
}

impl NotAMember {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Compresses `data` into one self-contained gzip member.
///
/// The header carries a zero mtime and no file name, so equal input always
/// yields equal bytes.
pub fn compress_member(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::with_capacity(data.len() / 2 + 64), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decodes exactly one member from the front of `input`.
///
/// Bytes after the member are left untouched and reported through
/// [`DecodedMember::consumed`]. Header, deflate stream, CRC32 and ISIZE are
/// all checked, so a coincidental signature inside compressed data is
/// rejected rather than mis-split. The whole payload is held in memory.
pub fn try_decode_member(input: &[u8]) -> std::result::Result<DecodedMember, NotAMember> {
    decode_with_capacity(input, INFLATE_CHUNK)
}

/// Decodes `member`, which must be exactly one complete member.
///
/// The ISIZE trailer sizes the output buffer up front.
pub fn decode_exact_member(member: &[u8]) -> std::result::Result<Vec<u8>, NotAMember> {
    let capacity = member
        .len()
        .checked_sub(4)
        .map(|at| {
            let mut isize = [0u8; 4];
            isize.copy_from_slice(&member[at..]);
            u32::from_le_bytes(isize) as usize
        })
        .unwrap_or(0)
        .min(MAX_BLOCK_SIZE);
    let decoded = decode_with_capacity(member, capacity.max(1))?;
    if decoded.consumed != member.len() {
        return Err(NotAMember::new(format!(
            "{} trailing bytes after member",
            member.len() - decoded.consumed
        )));
    }
    Ok(decoded.payload)
}

fn decode_with_capacity(
    input: &[u8],
    capacity: usize,
) -> std::result::Result<DecodedMember, NotAMember> {
    let header = MemberHeader::parse(input).map_err(NotAMember::new)?;
    let body = &input[header.header_len..];

    let mut inflater = Decompress::new(false);
    let mut payload = Vec::with_capacity(capacity);
    loop {
        if payload.len() == payload.capacity() {
            payload.reserve(payload.capacity().max(INFLATE_CHUNK));
        }
        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let status = inflater
            .decompress_vec(&body[before_in as usize..], &mut payload, FlushDecompress::None)
            .map_err(|error| NotAMember::new(format!("deflate stream: {error}")))?;
        match status {
            Status::StreamEnd => break,
            _ => {
                if inflater.total_in() == before_in && inflater.total_out() == before_out {
                    return Err(NotAMember::new("truncated deflate stream"));
                }
            }
        }
    }

    let deflate_len = inflater.total_in() as usize;
    let trailer_at = header.header_len + deflate_len;
    let trailer = input
        .get(trailer_at..trailer_at + TRAILER_SIZE)
        .ok_or_else(|| NotAMember::new("truncated trailer"))?;
    let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
    if crc != crc32fast::hash(&payload) {
        return Err(NotAMember::new("crc32 mismatch"));
    }
    if isize != payload.len() as u32 {
        return Err(NotAMember::new("length mismatch"));
    }

    Ok(DecodedMember {
        payload,
        consumed: trailer_at + TRAILER_SIZE,
    })
}
