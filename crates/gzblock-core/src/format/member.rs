use std::io::Write;

use flate2::Compression;
use flate2::write::DeflateEncoder;

use crate::GzblockError;
use crate::types::{MemberSpan, Result};

use super::{
    BASE_HEADER_SIZE, FLAG_FCOMMENT, FLAG_FEXTRA, FLAG_FHCRC, FLAG_FNAME, FLAG_RESERVED,
    INDEX_SUBFIELD_ID, INDEX_SUBFIELD_LEN, INDEXED_HEADER_SIZE, OS_UNKNOWN, SIGNATURE,
    TRAILER_SIZE,
};

/// Payload of the `GB` FEXTRA subfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexField {
    /// Total member length including header and trailer.
    pub member_len: u32,
    pub sequence: u64,
}

impl IndexField {
    pub fn to_bytes(&self) -> [u8; INDEX_SUBFIELD_LEN] {
        let mut bytes = [0u8; INDEX_SUBFIELD_LEN];
        bytes[..4].copy_from_slice(&self.member_len.to_le_bytes());
        bytes[4..].copy_from_slice(&self.sequence.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != INDEX_SUBFIELD_LEN {
            return None;
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[..4]);
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&bytes[4..]);
        Some(Self {
            member_len: u32::from_le_bytes(len),
            sequence: u64::from_le_bytes(sequence),
        })
    }
}

/// Parsed gzip member header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberHeader {
    pub flags: u8,
    /// Bytes from the signature to the first deflate byte.
    pub header_len: usize,
    pub index: Option<IndexField>,
}

impl MemberHeader {
    /// Parses the header at the start of `bytes`.
    ///
    /// Optional FEXTRA, FNAME, FCOMMENT and FHCRC sections are skipped; an
    /// FEXTRA carrying a `GB` subfield of the right length is decoded.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, &'static str> {
        if bytes.len() < BASE_HEADER_SIZE {
            return Err("truncated header");
        }
        if bytes[..SIGNATURE.len()] != SIGNATURE {
            return Err("missing gzip signature");
        }
        let flags = bytes[3];
        if flags & FLAG_RESERVED != 0 {
            return Err("reserved header flags set");
        }

        let mut pos = BASE_HEADER_SIZE;
        let mut index = None;
        if flags & FLAG_FEXTRA != 0 {
            let xlen_bytes = bytes.get(pos..pos + 2).ok_or("truncated extra field")?;
            let xlen = u16::from_le_bytes([xlen_bytes[0], xlen_bytes[1]]) as usize;
            pos += 2;
            let extra = bytes.get(pos..pos + xlen).ok_or("truncated extra field")?;
            index = find_index_field(extra);
            pos += xlen;
        }
        if flags & FLAG_FNAME != 0 {
            pos = skip_zero_terminated(bytes, pos).ok_or("unterminated file name")?;
        }
        if flags & FLAG_FCOMMENT != 0 {
            pos = skip_zero_terminated(bytes, pos).ok_or("unterminated comment")?;
        }
        if flags & FLAG_FHCRC != 0 {
            pos += 2;
        }
        if pos > bytes.len() {
            return Err("truncated header");
        }

        Ok(Self {
            flags,
            header_len: pos,
            index,
        })
    }
}

fn skip_zero_terminated(bytes: &[u8], pos: usize) -> Option<usize> {
    let tail = bytes.get(pos..)?;
    memchr::memchr(0, tail).map(|nul| pos + nul + 1)
}

fn find_index_field(mut extra: &[u8]) -> Option<IndexField> {
    while extra.len() >= 4 {
        let id = [extra[0], extra[1]];
        let len = u16::from_le_bytes([extra[2], extra[3]]) as usize;
        let data = extra.get(4..4 + len)?;
        if id == INDEX_SUBFIELD_ID {
            return IndexField::from_bytes(data);
        }
        extra = &extra[4 + len..];
    }
    None
}

/// Compresses `data` into one gzip member whose header carries its own
/// length and `sequence` in a `GB` subfield.
pub fn encode_indexed_member(data: &[u8], sequence: u64, level: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(INDEXED_HEADER_SIZE + data.len() / 2 + TRAILER_SIZE);
    out.extend_from_slice(&SIGNATURE);
    out.push(FLAG_FEXTRA);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.push(extra_flags(level));
    out.push(OS_UNKNOWN);
    out.extend_from_slice(&((4 + INDEX_SUBFIELD_LEN) as u16).to_le_bytes());
    out.extend_from_slice(&INDEX_SUBFIELD_ID);
    out.extend_from_slice(&(INDEX_SUBFIELD_LEN as u16).to_le_bytes());
    let field_at = out.len();
    out.extend_from_slice(&[0u8; INDEX_SUBFIELD_LEN]);

    let mut encoder = DeflateEncoder::new(out, Compression::new(level));
    encoder.write_all(data)?;
    let mut out = encoder.finish()?;
    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());

    let member_len = u32::try_from(out.len()).map_err(|_| {
        GzblockError::CompressionError(format!(
            "indexed member for block {sequence} exceeds the 4 GiB length field"
        ))
    })?;
    out[field_at..field_at + INDEX_SUBFIELD_LEN]
        .copy_from_slice(&IndexField { member_len, sequence }.to_bytes());
    Ok(out)
}

/// XFL byte per RFC 1952: 2 for maximum compression, 4 for fastest.
fn extra_flags(level: u32) -> u8 {
    match level {
        9 => 2,
        0 | 1 => 4,
        _ => 0,
    }
}

/// Walks the member headers of an indexed stream.
///
/// Returns `None` unless every member carries a `GB` subfield, sequences are
/// dense from zero, and the recorded lengths tile `data` exactly.
pub fn index_members(data: &[u8]) -> Option<Vec<MemberSpan>> {
    let mut spans = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        let header = MemberHeader::parse(&data[offset..]).ok()?;
        let index = header.index?;
        if index.sequence != spans.len() as u64 {
            return None;
        }

        let len = index.member_len as usize;
        if len < header.header_len + TRAILER_SIZE {
            return None;
        }
        let end = offset.checked_add(len).filter(|end| *end <= data.len())?;
        spans.push(MemberSpan {
            sequence: index.sequence,
            start: offset,
            end,
        });
        offset = end;
    }

    if spans.is_empty() { None } else { Some(spans) }
}
