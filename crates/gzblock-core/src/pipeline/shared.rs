use std::io::Write;
use std::thread;

use crate::GzblockError;
use crate::compression::BlockTransform;
use crate::core::worker_pool::panic_message;
use crate::core::{
    BoundedBlockQueue, FailureSlot, GateSummary, OrderedWriteGate, PoolRuntimeSnapshot,
    WorkerPool,
};
use crate::types::{Block, Result};

/// State owned by one queued pipeline run and borrowed by all its threads.
pub(crate) struct PipelineShared<'env, W: Write> {
    pub(crate) queue: BoundedBlockQueue<Block<'env>>,
    pub(crate) gate: OrderedWriteGate<W>,
    pub(crate) failure: FailureSlot,
}

impl<'env, W: Write> PipelineShared<'env, W> {
    pub(crate) fn new(queue_capacity: usize, gate: OrderedWriteGate<W>) -> Self {
        Self {
            queue: BoundedBlockQueue::new(queue_capacity),
            gate,
            failure: FailureSlot::new(),
        }
    }

    /// Records `error` and releases every blocked producer, worker and writer.
    pub(crate) fn fail(&self, error: GzblockError) {
        self.failure.record(error);
        self.queue.close();
        self.gate.fail();
    }

    /// Returns the writer, or the first error recorded during the run.
    pub(crate) fn finish(self) -> Result<(W, GateSummary)> {
        if let Some(error) = self.failure.take() {
            return Err(error);
        }
        Ok(self.gate.into_inner())
    }
}

pub(crate) struct QueuedRun<R> {
    /// Producer result; `None` when the producer failed or panicked.
    pub(crate) produced: Option<R>,
    pub(crate) runtime: PoolRuntimeSnapshot,
}

/// Runs one producer thread feeding `pool` through the shared queue.
///
/// Workers apply `transform` to each block and write the result through the
/// gate under the block's sequence. Any failure is routed to
/// [`PipelineShared::fail`]; callers inspect it through
/// [`PipelineShared::finish`] once this returns, after every thread joined.
pub(crate) fn run_queued<'env, W, X, P, R>(
    shared: &PipelineShared<'env, W>,
    pool: &WorkerPool,
    transform: &X,
    produce: P,
) -> QueuedRun<R>
where
    W: Write + Send,
    X: BlockTransform,
    P: FnOnce(&BoundedBlockQueue<Block<'env>>) -> Result<R> + Send,
    R: Send,
{
    thread::scope(|scope| {
        let producer = thread::Builder::new()
            .name(format!("gzblock-{}-reader", transform.kind()))
            .spawn_scoped(scope, move || {
                let result = produce(&shared.queue);
                shared.queue.close();
                match result {
                    Ok(value) => Some(value),
                    Err(error) => {
                        shared.fail(error);
                        None
                    }
                }
            });
        let producer = match producer {
            Ok(handle) => Some(handle),
            Err(error) => {
                shared.fail(GzblockError::Io(error).with_context("spawning reader thread"));
                None
            }
        };

        let runtime = pool.run(
            transform.kind(),
            |_| {
                if shared.failure.is_failed() {
                    return None;
                }
                shared.queue.dequeue()
            },
            |_, block: Block<'env>| {
                let sequence = block.sequence;
                let output = transform.apply(&block)?;
                drop(block);
                if !shared.gate.write(sequence, &output, true)? {
                    tracing::trace!(sequence, "gate closed, dropping block");
                }
                Ok(())
            },
            |error| shared.fail(error),
        );

        let produced = producer.and_then(|handle| match handle.join() {
            Ok(produced) => produced,
            Err(payload) => {
                shared.fail(GzblockError::Other(anyhow::anyhow!(
                    "reader thread panicked: {}",
                    panic_message(payload.as_ref())
                )));
                None
            }
        });

        QueuedRun { produced, runtime }
    })
}
