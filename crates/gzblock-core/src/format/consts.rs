/// First three bytes of every gzip member: ID1, ID2 and the deflate method byte.
pub const SIGNATURE: [u8; 3] = [0x1f, 0x8b, 0x08];

pub const FLAG_FTEXT: u8 = 0x01;
pub const FLAG_FHCRC: u8 = 0x02;
pub const FLAG_FEXTRA: u8 = 0x04;
pub const FLAG_FNAME: u8 = 0x08;
pub const FLAG_FCOMMENT: u8 = 0x10;
/// Bits that must be zero in a conforming header.
pub const FLAG_RESERVED: u8 = 0xe0;

/// Fixed part of a gzip header.
pub const BASE_HEADER_SIZE: usize = 10;
/// CRC32 and ISIZE.
pub const TRAILER_SIZE: usize = 8;
pub const OS_UNKNOWN: u8 = 0xff;

/// FEXTRA subfield identifying an indexed member.
pub const INDEX_SUBFIELD_ID: [u8; 2] = *b"GB";
/// Member length (u32 LE) followed by block sequence (u64 LE).
pub const INDEX_SUBFIELD_LEN: usize = 12;
/// Header size of an indexed member: base header, XLEN, subfield id and length, payload.
pub const INDEXED_HEADER_SIZE: usize = BASE_HEADER_SIZE + 2 + 4 + INDEX_SUBFIELD_LEN;

pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024 * 1024;
pub const DEFAULT_PARTITION_SIZE: usize = 1024 * 1024;
pub const MIN_PARTITION_SIZE: usize = 64;
pub const DEFAULT_LEVEL: u32 = 6;
pub const MAX_LEVEL: u32 = 9;
