use gzblock_core::BufferPool;

#[test]
fn recycles_returned_buffers() {
    let pool = BufferPool::new(1024, 2);

    let mut first = pool.acquire();
    first.extend_from_slice(b"payload");
    drop(first);

    let second = pool.acquire();
    assert!(second.is_empty(), "recycled buffers come back cleared");
    assert!(second.capacity() >= 1024);

    let metrics = pool.metrics();
    assert_eq!(metrics.created, 1);
    assert_eq!(metrics.recycled, 1);
}

#[test]
fn drops_buffers_beyond_the_retention_limit() {
    let pool = BufferPool::new(64, 2);
    let buffers: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
    drop(buffers);

    let metrics = pool.metrics();
    assert_eq!(metrics.created, 4);
    assert_eq!(metrics.dropped, 2);
    assert_eq!(pool.max_buffers(), 2);
}
