use serde::{Deserialize, Serialize};

pub mod consts;
pub mod member;

pub use consts::*;
pub use member::{IndexField, MemberHeader, encode_indexed_member, index_members};

/// On-disk framing of compressed output.
///
/// Both framings are plain multi-member gzip and decode with any gzip tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramingMode {
    /// Plain members; decompression locates them by scanning.
    #[default]
    MultiMember,
    /// Members carry their length and sequence in an FEXTRA subfield, so
    /// decompression can split the input without scanning.
    Indexed,
}
