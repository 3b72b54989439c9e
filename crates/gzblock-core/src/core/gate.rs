use std::io::Write;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::GzblockError;
use crate::telemetry::{self, NoProgress, ProgressSink, tags};
use crate::types::{Result, duration_to_us};

/// Turn-taking monitor that serializes writes by sequence number.
///
/// Workers finish blocks in any order; each one waits here until the gate's
/// counter reaches its sequence, writes, and commits to pass the turn on.
/// Only the write itself is serialized. A failed gate releases every waiter
/// without writing.
pub struct OrderedWriteGate<W: Write> {
    state: Mutex<GateState<W>>,
    turn: Condvar,
    progress: Arc<dyn ProgressSink>,
}

struct GateState<W> {
    next: u64,
    total: Option<u64>,
    failed: bool,
    bytes_written: u64,
    writer: W,
}

/// What the gate saw over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSummary {
    /// Number of committed sequences.
    pub committed: u64,
    pub bytes_written: u64,
    pub failed: bool,
}

impl<W: Write> OrderedWriteGate<W> {
    pub fn new(writer: W) -> Self {
        Self::with_progress(writer, Arc::new(NoProgress))
    }

    pub fn with_progress(writer: W, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            state: Mutex::new(GateState {
                next: 0,
                total: None,
                failed: false,
                bytes_written: 0,
                writer,
            }),
            turn: Condvar::new(),
            progress,
        }
    }

    /// Records the number of sequences this run will commit, for progress reporting.
    pub fn set_total(&self, total: u64) {
        self.lock().total = Some(total);
    }

    /// Waits until `sequence` is next and returns the held turn.
    ///
    /// Returns `Ok(None)` when the gate failed before or during the wait, and
    /// [`GzblockError::InvalidBlockId`] when `sequence` was already committed.
    pub fn acquire_turn(&self, sequence: u64) -> Result<Option<GateTurn<'_, W>>> {
        let started_at = Instant::now();
        let mut state = self.lock();
        loop {
            if state.failed {
                return Ok(None);
            }
            if state.next == sequence {
                break;
            }
            if sequence < state.next {
                return Err(GzblockError::InvalidBlockId {
                    expected: state.next,
                    actual: sequence,
                });
            }
            state = self.turn.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        telemetry::record_histogram(
            tags::METRIC_GATE_WAIT_US,
            duration_to_us(started_at.elapsed()),
            &[("subsystem", "gate"), ("op", "acquire")],
        );
        Ok(Some(GateTurn { gate: self, state }))
    }

    /// Writes `bytes` for `sequence` once its turn arrives.
    ///
    /// The counter advances only when `is_final_chunk` is set, so a block may be
    /// flushed through several calls. Returns `Ok(false)` without writing when
    /// the gate has failed.
    pub fn write(&self, sequence: u64, bytes: &[u8], is_final_chunk: bool) -> Result<bool> {
        let Some(mut turn) = self.acquire_turn(sequence)? else {
            return Ok(false);
        };
        turn.write_chunk(bytes)?;
        if is_final_chunk {
            turn.commit();
        }
        Ok(true)
    }

    /// Marks the gate failed and releases every waiter. Idempotent.
    pub fn fail(&self) {
        self.lock().failed = true;
        self.turn.notify_all();
    }

    pub fn is_failed(&self) -> bool {
        self.lock().failed
    }

    /// Next sequence the gate will accept.
    pub fn next_sequence(&self) -> u64 {
        self.lock().next
    }

    /// Consumes the gate and returns the writer with a summary of the run.
    pub fn into_inner(self) -> (W, GateSummary) {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let summary = GateSummary {
            committed: state.next,
            bytes_written: state.bytes_written,
            failed: state.failed,
        };
        (state.writer, summary)
    }

    fn lock(&self) -> MutexGuard<'_, GateState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive write access for one sequence.
///
/// Dropping a turn without [`commit`](Self::commit) keeps the counter where it
/// is, so the same sequence can continue with another turn.
pub struct GateTurn<'g, W: Write> {
    gate: &'g OrderedWriteGate<W>,
    state: MutexGuard<'g, GateState<W>>,
}

impl<W: Write> GateTurn<'_, W> {
    pub fn sequence(&self) -> u64 {
        self.state.next
    }

    /// Appends `bytes` to the output. An I/O error fails the gate.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(error) = self.state.writer.write_all(bytes) {
            self.state.failed = true;
            self.gate.turn.notify_all();
            return Err(GzblockError::Io(error).with_context(format!(
                "writing output for block {}",
                self.state.next
            )));
        }
        self.state.bytes_written += bytes.len() as u64;
        telemetry::increment_counter(
            tags::METRIC_GATE_BYTES,
            bytes.len() as u64,
            &[("subsystem", "gate"), ("op", "write")],
        );
        Ok(())
    }

    /// Advances the counter, wakes waiters and reports progress.
    pub fn commit(mut self) {
        self.state.next += 1;
        let completed = self.state.next;
        let total = self.state.total;
        // Reported under the lock so ticks arrive in commit order.
        self.gate.progress.on_block_completed(completed, total);
        drop(self.state);

        self.gate.turn.notify_all();
        telemetry::increment_counter(
            tags::METRIC_GATE_BLOCK_COUNT,
            1,
            &[("subsystem", "gate"), ("op", "commit")],
        );
    }
}
