use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use serde::Serialize;

use crate::telemetry;
use crate::telemetry::tags;
use crate::types::duration_to_us;

/// A pool of reusable block buffers.
///
/// The splitter draws one buffer per block and the buffer comes back when the
/// worker that compressed the block drops it, so a long run settles at roughly
/// `queue capacity + workers` live buffers instead of one allocation per block.
///
/// # Example
/// ```
/// use gzblock_core::BufferPool;
///
/// let pool = BufferPool::new(4096, 8);
/// let buffer = pool.acquire();
/// assert!(buffer.capacity() >= 4096);
/// drop(buffer); // returns to the pool
/// assert_eq!(pool.metrics().created, 1);
/// ```
#[derive(Debug)]
pub struct BufferPool {
    recycler: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    default_capacity: usize,
    max_buffers: usize,
    metrics: Arc<PoolMetricsInner>,
}

impl BufferPool {
    /// Creates a pool handing out buffers of `default_capacity` bytes and
    /// retaining at most `max_buffers` of them for reuse.
    pub fn new(default_capacity: usize, max_buffers: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        let (tx, rx) = bounded(max_buffers);
        Self {
            recycler: tx,
            receiver: rx,
            default_capacity,
            max_buffers,
            metrics: Arc::new(PoolMetricsInner::default()),
        }
    }

    /// Acquires an empty buffer, recycling a returned one when available.
    pub fn acquire(&self) -> PooledBuffer {
        let started_at = Instant::now();
        let buffer = match self.receiver.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT,
                    1,
                    &[("subsystem", "buffer"), ("op", "acquire"), ("result", "recycled")],
                );
                buffer
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT,
                    1,
                    &[("subsystem", "buffer"), ("op", "acquire"), ("result", "created")],
                );
                Vec::with_capacity(self.default_capacity)
            }
        };
        telemetry::record_histogram(
            tags::METRIC_BUFFER_ACQUIRE_LATENCY_US,
            duration_to_us(started_at.elapsed()),
            &[("subsystem", "buffer"), ("op", "acquire")],
        );

        PooledBuffer::new(buffer, self.recycler.clone(), Arc::clone(&self.metrics))
    }

    /// Returns a snapshot of the current pool metrics.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }
}

/// A snapshot of buffer pool metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolMetricsSnapshot {
    /// Number of buffers created by the pool
    pub created: usize,
    /// Number of buffers successfully recycled
    pub recycled: usize,
    /// Number of buffers dropped (pool full)
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

/// A buffer allocated from a [`BufferPool`].
///
/// Returned to the pool on drop. Derefs to the underlying `Vec<u8>`.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    recycler: Sender<Vec<u8>>,
    metrics: Arc<PoolMetricsInner>,
}

impl PooledBuffer {
    fn new(buffer: Vec<u8>, recycler: Sender<Vec<u8>>, metrics: Arc<PoolMetricsInner>) -> Self {
        Self {
            buffer,
            recycler,
            metrics,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        match self.recycler.try_send(buffer) {
            Ok(()) => telemetry::increment_counter(
                tags::METRIC_BUFFER_RECYCLE_OK_COUNT,
                1,
                &[("subsystem", "buffer"), ("op", "recycle"), ("result", "recycled")],
            ),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_RECYCLE_DROPPED_COUNT,
                    1,
                    &[("subsystem", "buffer"), ("op", "recycle"), ("result", "dropped")],
                );
            }
        }
    }
}
