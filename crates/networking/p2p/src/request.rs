use ethereum_types::H256;

use crate::wrapper::HeaderWrapper;

/// Upper bound on the number of items any single wire request may cover.
pub const MAX_IN_REQUEST: u32 = 192;

/// A request for a contiguous (or skip-list) run of headers.
///
/// Exactly one of `Range` / `Skip` is ever constructed — the invariant is
/// enforced by the enum shape rather than by runtime checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadersRequest {
    Range {
        start_number: u64,
        count: u32,
        reverse: bool,
    },
    Skip {
        anchor_hash: H256,
        count: u32,
        step: u32,
        reverse: bool,
    },
}

impl HeadersRequest {
    pub fn range(start_number: u64, count: u32, reverse: bool) -> Self {
        debug_assert!(count > 0 && count <= MAX_IN_REQUEST);
        HeadersRequest::Range {
            start_number,
            count: count.min(MAX_IN_REQUEST),
            reverse,
        }
    }

    pub fn skip(anchor_hash: H256, count: u32, step: u32, reverse: bool) -> Self {
        debug_assert!(count > 0 && count <= MAX_IN_REQUEST);
        HeadersRequest::Skip {
            anchor_hash,
            count: count.min(MAX_IN_REQUEST),
            step: step.max(1),
            reverse,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            HeadersRequest::Range { count, .. } => *count,
            HeadersRequest::Skip { count, .. } => *count,
        }
    }
}

/// An ordered, non-empty list of headers for which bodies are missing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlocksRequest {
    pub headers: Vec<HeaderWrapper>,
}

impl BlocksRequest {
    pub fn new(headers: Vec<HeaderWrapper>) -> Self {
        Self { headers }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Splits into order-preserving shards of at most `max_in_request`
    /// entries each. An empty request splits into an empty shard list.
    pub fn split(self, max_in_request: usize) -> Vec<BlocksRequest> {
        debug_assert!(max_in_request > 0);
        self.headers
            .chunks(max_in_request.max(1))
            .map(|chunk| BlocksRequest::new(chunk.to_vec()))
            .collect()
    }
}
