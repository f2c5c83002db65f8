use std::time::Duration;

use crate::request::MAX_IN_REQUEST;

/// Tunables for the download pipeline. All defaults match §6 of the design.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Cap on headers per `GetBlockHeaders`-style request.
    pub max_in_request: u32,
    /// Cap on total pending (unemitted) headers before `request_headers`
    /// throttles to an empty list.
    pub header_queue_limit: u64,
    /// Cap on blocks in flight / buffered awaiting emission.
    pub block_queue_limit: u64,
    /// Upper bound passed to `request_blocks` before sharding.
    pub bulk_body_request_cap: u32,
    /// Per-iteration dispatch budget multiplier cap for the body loop.
    pub body_dispatch_multiplier_cap: u32,
    /// Header loop latch timeout while still catching up.
    pub header_latch_timeout: Duration,
    /// Header loop latch timeout once caught up to the network (steady
    /// state polls much more slowly).
    pub header_latch_timeout_post_sync: Duration,
    /// Body loop latch timeout.
    pub body_latch_timeout: Duration,
    /// Headers requested per header-loop dispatch round.
    pub headers_per_request: u32,
    /// Max concurrent header requests per header-loop iteration.
    pub max_header_requests_per_iteration: usize,
    /// Threshold (in headers in a single shard) for the body loop's
    /// fresh-tip optimisation.
    pub fresh_tip_shard_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_in_request: MAX_IN_REQUEST,
            header_queue_limit: 10_000,
            block_queue_limit: 2_000,
            bulk_body_request_cap: 16_384,
            body_dispatch_multiplier_cap: 32,
            header_latch_timeout: Duration::from_millis(500),
            header_latch_timeout_post_sync: Duration::from_secs(10),
            body_latch_timeout: Duration::from_millis(200),
            headers_per_request: MAX_IN_REQUEST,
            max_header_requests_per_iteration: 128,
            fresh_tip_shard_threshold: 3,
        }
    }
}

impl PipelineConfig {
    pub fn with_header_queue_limit(mut self, limit: u64) -> Self {
        self.header_queue_limit = limit;
        self
    }

    pub fn with_block_queue_limit(mut self, limit: u64) -> Self {
        self.block_queue_limit = limit;
        self
    }

    pub fn with_header_latch_timeout(mut self, timeout: Duration) -> Self {
        self.header_latch_timeout = timeout;
        self
    }

    pub fn with_body_latch_timeout(mut self, timeout: Duration) -> Self {
        self.body_latch_timeout = timeout;
        self
    }
}
