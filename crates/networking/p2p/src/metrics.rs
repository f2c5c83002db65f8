use std::sync::atomic::{AtomicU64, Ordering};

/// Counters the pipeline updates as it runs. Mirrors the shape of the
/// teacher's `ethrex-metrics` static counters, but as a small trait so an
/// embedder without a metrics backend can plug in a no-op and pay nothing.
pub trait Metrics: Send + Sync {
    fn headers_downloaded(&self, count: u64);
    fn blocks_downloaded(&self, count: u64);
    fn peer_dropped(&self);
    fn header_queue_depth(&self, depth: u64);
    fn block_queue_depth(&self, depth: u64);
}

/// Default metrics sink: counts everything in-process, reads back for
/// tests and for embedders who just want a cheap `Display`-able snapshot.
#[derive(Default)]
pub struct AtomicMetrics {
    pub headers_downloaded: AtomicU64,
    pub blocks_downloaded: AtomicU64,
    pub peers_dropped: AtomicU64,
    pub header_queue_depth: AtomicU64,
    pub block_queue_depth: AtomicU64,
}

impl Metrics for AtomicMetrics {
    fn headers_downloaded(&self, count: u64) {
        self.headers_downloaded.fetch_add(count, Ordering::Relaxed);
    }

    fn blocks_downloaded(&self, count: u64) {
        self.blocks_downloaded.fetch_add(count, Ordering::Relaxed);
    }

    fn peer_dropped(&self) {
        self.peers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn header_queue_depth(&self, depth: u64) {
        self.header_queue_depth.store(depth, Ordering::Relaxed);
    }

    fn block_queue_depth(&self, depth: u64) {
        self.block_queue_depth.store(depth, Ordering::Relaxed);
    }
}

/// Metrics sink that discards everything.
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn headers_downloaded(&self, _count: u64) {}
    fn blocks_downloaded(&self, _count: u64) {}
    fn peer_dropped(&self) {}
    fn header_queue_depth(&self, _depth: u64) {}
    fn block_queue_depth(&self, _depth: u64) {}
}
