pub mod mmap;
pub mod scanner;
pub mod splitter;

pub use mmap::MmapInput;
pub use scanner::{MemberBoundaryScanner, ScanStats, partition_ranges};
pub use splitter::{BlockSplitter, SplitSummary};
