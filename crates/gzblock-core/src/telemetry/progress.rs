/// Receives a tick each time the write gate commits a block.
///
/// Calls arrive in commit order from whichever worker holds the gate, so an
/// implementation must be cheap and must not call back into the pipeline.
pub trait ProgressSink: Send + Sync {
    /// `completed` counts committed blocks (partitions on the scan path).
    /// `total` is `None` while the producer has not reached end of input.
    fn on_block_completed(&self, completed: u64, total: Option<u64>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_block_completed(&self, _completed: u64, _total: Option<u64>) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u64, Option<u64>) + Send + Sync,
{
    fn on_block_completed(&self, completed: u64, total: Option<u64>) {
        self(completed, total)
    }
}
