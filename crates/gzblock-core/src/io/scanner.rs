use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use memchr::memmem;
use serde::Serialize;

use crate::GzblockError;
use crate::compression::try_decode_member;
use crate::format::SIGNATURE;
use crate::telemetry::{self, tags};
use crate::types::{PartitionBoundary, Result, ScannedMember};

/// Splits `len` bytes into contiguous partitions of `partition_size` bytes.
///
/// The last partition absorbs the remainder; an empty input has no partitions.
pub fn partition_ranges(len: usize, partition_size: usize) -> Vec<PartitionBoundary> {
    let partition_size = partition_size.max(1);
    let mut partitions = Vec::with_capacity(len.div_ceil(partition_size));
    let mut start = 0usize;
    while start < len {
        let end = start.saturating_add(partition_size).min(len);
        partitions.push(PartitionBoundary {
            index: partitions.len(),
            start,
            end,
        });
        start = end;
    }
    partitions
}

/// Counters describing one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub partitions: u64,
    /// Signature matches examined by trial decoding.
    pub candidates: u64,
    /// Candidates that failed to decode.
    pub rejected: u64,
    /// Speculative members dropped at settlement because they overlapped the chain.
    pub discarded: u64,
    /// Members decoded serially at settlement to close a gap in the chain.
    pub resynced: u64,
    pub members: u64,
}

/// Positions published by partitions so later scans can skip covered bytes.
#[derive(Debug)]
struct ClaimTable {
    frontiers: Vec<AtomicUsize>,
    settled_end: AtomicUsize,
}

impl ClaimTable {
    fn new(partitions: usize) -> Self {
        Self {
            frontiers: (0..partitions).map(|_| AtomicUsize::new(0)).collect(),
            settled_end: AtomicUsize::new(0),
        }
    }

    fn claim(&self, index: usize, end: usize) {
        self.frontiers[index].fetch_max(end, Ordering::AcqRel);
    }

    /// Furthest offset known to be covered before partition `index` starts scanning.
    fn skip_hint(&self, index: usize) -> usize {
        let predecessor = index
            .checked_sub(1)
            .map(|prev| self.frontiers[prev].load(Ordering::Acquire))
            .unwrap_or(0);
        predecessor.max(self.settled_end.load(Ordering::Acquire))
    }
}

/// Locates gzip members inside a multi-member stream without an index.
///
/// Each partition is scanned independently for the member signature and
/// every match is trial-decoded; decoding checks the CRC32 and length
/// trailer, so matches inside compressed data are rejected. A match is only
/// accepted if it starts inside the partition, but the search window reaches
/// two bytes past the partition end so a signature split across the boundary
/// is still found by the partition owning its first byte.
///
/// Scanning is speculative. [`settle`](Self::settle) runs partitions in order
/// and keeps only members that continue the chain from the previous
/// partition's last member, decoding serially where speculation left a gap.
pub struct MemberBoundaryScanner<'a> {
    data: &'a [u8],
    partitions: Vec<PartitionBoundary>,
    finder: memmem::Finder<'static>,
    claims: ClaimTable,
    candidates: AtomicU64,
    rejected: AtomicU64,
    discarded: AtomicU64,
    resynced: AtomicU64,
    members: AtomicU64,
}

impl<'a> MemberBoundaryScanner<'a> {
    pub fn new(data: &'a [u8], partition_size: usize) -> Self {
        let partitions = partition_ranges(data.len(), partition_size);
        let claims = ClaimTable::new(partitions.len());
        Self {
            data,
            partitions,
            finder: memmem::Finder::new(&SIGNATURE),
            claims,
            candidates: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            resynced: AtomicU64::new(0),
            members: AtomicU64::new(0),
        }
    }

    pub fn partitions(&self) -> &[PartitionBoundary] {
        &self.partitions
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// End of the last member accepted by [`settle`](Self::settle).
    pub fn settled_end(&self) -> usize {
        self.claims.settled_end.load(Ordering::Acquire)
    }

    /// Finds and decodes every member that appears to start inside `part`.
    ///
    /// Safe to run for many partitions concurrently. The result is speculative
    /// until passed to [`settle`](Self::settle).
    pub fn scan_partition(&self, part: &PartitionBoundary) -> Vec<ScannedMember> {
        let window_end = (part.end + SIGNATURE.len() - 1).min(self.data.len());
        let mut cursor = part.start;
        let mut members = Vec::new();

        while cursor < part.end {
            let hint = self.claims.skip_hint(part.index);
            if hint > cursor {
                cursor = hint;
                if cursor >= part.end {
                    break;
                }
            }

            let Some(found) = self.finder.find(&self.data[cursor..window_end]) else {
                break;
            };
            let offset = cursor + found;
            self.candidates.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_counter(
                tags::METRIC_SCAN_CANDIDATE_COUNT,
                1,
                &[("subsystem", "scan"), ("op", "candidate")],
            );

            match try_decode_member(&self.data[offset..]) {
                Ok(decoded) => {
                    let end = offset + decoded.consumed;
                    tracing::trace!(partition = part.index, offset, end, "member candidate accepted");
                    self.claims.claim(part.index, end);
                    members.push(ScannedMember {
                        offset,
                        len: decoded.consumed,
                        payload: decoded.payload,
                    });
                    cursor = end;
                }
                Err(rejection) => {
                    tracing::trace!(
                        partition = part.index,
                        offset,
                        reason = %rejection.reason,
                        "member candidate rejected"
                    );
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    telemetry::increment_counter(
                        tags::METRIC_SCAN_REJECTED_COUNT,
                        1,
                        &[("subsystem", "scan"), ("op", "candidate"), ("result", "rejected")],
                    );
                    cursor = offset + SIGNATURE.len();
                }
            }
        }

        members
    }

    /// Reconciles speculative members of `part` with the settled chain.
    ///
    /// Must be called for partitions in index order, one at a time; the
    /// pipelines call it while holding the partition's write-gate turn.
    /// Returns the members to emit for this partition, in order.
    ///
    /// # Errors
    /// [`GzblockError::CorruptMember`] when the chain end inside this partition
    /// does not decode as a member.
    pub fn settle(
        &self,
        part: &PartitionBoundary,
        speculative: Vec<ScannedMember>,
    ) -> Result<Vec<ScannedMember>> {
        let len = self.data.len();
        let mut expected = self.settled_end();
        let mut settled = Vec::with_capacity(speculative.len());
        let mut speculative = speculative.into_iter().peekable();

        while expected < part.end && expected < len {
            while speculative.next_if(|member| member.offset < expected).is_some() {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_SCAN_DISCARDED_COUNT,
                    1,
                    &[("subsystem", "scan"), ("op", "settle"), ("result", "discarded")],
                );
            }

            if let Some(member) = speculative.next_if(|member| member.offset == expected) {
                expected = member.end();
                settled.push(member);
                continue;
            }

            let decoded = try_decode_member(&self.data[expected..]).map_err(|rejection| {
                GzblockError::CorruptMember {
                    offset: expected as u64,
                    reason: rejection.reason,
                }
            })?;
            tracing::debug!(
                partition = part.index,
                offset = expected,
                len = decoded.consumed,
                "resynchronised member chain"
            );
            self.resynced.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_counter(
                tags::METRIC_SCAN_RESYNC_COUNT,
                1,
                &[("subsystem", "scan"), ("op", "settle"), ("result", "resync")],
            );
            settled.push(ScannedMember {
                offset: expected,
                len: decoded.consumed,
                payload: decoded.payload,
            });
            expected += decoded.consumed;
        }

        let leftover = speculative.count() as u64;
        if leftover > 0 {
            self.discarded.fetch_add(leftover, Ordering::Relaxed);
        }
        self.members.fetch_add(settled.len() as u64, Ordering::Relaxed);
        self.claims.settled_end.store(expected, Ordering::Release);
        Ok(settled)
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            partitions: self.partitions.len() as u64,
            candidates: self.candidates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            resynced: self.resynced.load(Ordering::Relaxed),
            members: self.members.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::compress_member;

    /// Scans every partition before any of them settles, last partition
    /// first, so no scan benefits from a neighbour's claim. Returns the
    /// settled members of each partition.
    fn scan_without_hints(scanner: &MemberBoundaryScanner<'_>) -> Vec<Vec<ScannedMember>> {
        let parts = scanner.partitions().to_vec();
        let mut speculative: Vec<_> = parts
            .iter()
            .rev()
            .map(|part| scanner.scan_partition(part))
            .collect();
        speculative.reverse();
        parts
            .iter()
            .zip(speculative)
            .map(|(part, members)| scanner.settle(part, members).unwrap())
            .collect()
    }

    /// Stored members whose payload embeds complete gzip members and bare
    /// signatures followed by an invalid deflate stream.
    fn stream_with_embedded_members() -> (Vec<u8>, Vec<u8>, Vec<usize>) {
        let inner = compress_member(b"embedded member payload", 6).unwrap();
        let mut input = Vec::new();
        while input.len() < 10_000 {
            input.extend_from_slice(&inner);
            input.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x00, 0xff]);
            input.extend_from_slice(b"noise");
        }

        let mut stream = Vec::new();
        let mut offsets = Vec::new();
        for chunk in input.chunks(4096) {
            offsets.push(stream.len());
            stream.extend(compress_member(chunk, 0).unwrap());
        }
        (input, stream, offsets)
    }

    #[test]
    fn partitions_tile_the_input() {
        let parts = partition_ranges(10, 4);
        assert_eq!(
            parts,
            vec![
                PartitionBoundary { index: 0, start: 0, end: 4 },
                PartitionBoundary { index: 1, start: 4, end: 8 },
                PartitionBoundary { index: 2, start: 8, end: 10 },
            ]
        );
        assert!(partition_ranges(0, 4).is_empty());
    }

    #[test]
    fn embedded_members_are_discarded_at_settlement() {
        let (input, stream, offsets) = stream_with_embedded_members();
        // Every size is smaller than a member, so most partitions start
        // inside a stored payload.
        for partition_size in [64usize, 500, 1500] {
            let scanner = MemberBoundaryScanner::new(&stream, partition_size);
            let settled: Vec<ScannedMember> =
                scan_without_hints(&scanner).into_iter().flatten().collect();

            let chain: Vec<usize> = settled.iter().map(|member| member.offset).collect();
            assert_eq!(chain, offsets, "partition {partition_size}");
            let restored: Vec<u8> = settled.into_iter().flat_map(|member| member.payload).collect();
            assert_eq!(restored, input, "partition {partition_size}");
            assert_eq!(scanner.settled_end(), stream.len());

            let stats = scanner.stats();
            assert_eq!(stats.members, offsets.len() as u64);
            assert!(stats.rejected > 0, "partition {partition_size}: {stats:?}");
            assert!(stats.discarded > 0, "partition {partition_size}: {stats:?}");
            assert!(stats.candidates > stats.members, "partition {partition_size}: {stats:?}");
        }
    }

    #[test]
    fn rejected_candidate_resumes_past_the_signature() {
        let member = compress_member(b"the real member", 6).unwrap();
        let mut data = SIGNATURE.to_vec();
        data.extend_from_slice(&member);

        let scanner = MemberBoundaryScanner::new(&data, data.len());
        let found = scanner.scan_partition(&scanner.partitions()[0]);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, SIGNATURE.len());
        assert_eq!(found[0].payload, b"the real member");
        let stats = scanner.stats();
        assert_eq!((stats.candidates, stats.rejected), (2, 1));
    }

    #[test]
    fn partition_with_only_a_bogus_candidate_settles_empty() {
        let mut payload = vec![b'a'; 200];
        payload.extend_from_slice(&[0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
        payload.extend(vec![b'b'; 200]);
        let first = compress_member(&payload, 0).unwrap();
        let second = compress_member(b"tail member", 6).unwrap();
        let mut data = first.clone();
        data.extend_from_slice(&second);

        let bogus_at = memmem::find(&data[1..], &SIGNATURE).unwrap() + 1;
        assert!(bogus_at < first.len());
        let partition_size = 64;
        let bogus_part = bogus_at / partition_size;
        let tail_part = first.len() / partition_size;
        assert!(bogus_part < tail_part);

        let scanner = MemberBoundaryScanner::new(&data, partition_size);
        let bogus_scan = scanner.scan_partition(&scanner.partitions()[bogus_part]);
        assert!(bogus_scan.is_empty());
        assert_eq!(scanner.stats().rejected, 1);

        let scanner = MemberBoundaryScanner::new(&data, partition_size);
        let settled = scan_without_hints(&scanner);
        assert!(settled[bogus_part].is_empty());
        assert_eq!(settled[0].len(), 1);
        assert_eq!(settled[0][0].payload, payload);
        assert_eq!(settled[tail_part].len(), 1);
        assert_eq!(settled[tail_part][0].offset, first.len());
        assert_eq!(settled[tail_part][0].payload, b"tail member");

        let stats = scanner.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!((stats.members, stats.discarded, stats.resynced), (2, 0, 0));
        assert_eq!(scanner.settled_end(), data.len());
    }
}
