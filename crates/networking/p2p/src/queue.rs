//! The reassembly queue: the single piece of shared mutable state between
//! the header loop and the body loop.
//!
//! Internally it tracks a **tip** (the highest header whose entire ancestry
//! back to genesis is present) plus a set of **islands** — headers received
//! out of order that have not yet been linked to the tip — keyed by height.
//! Because every range this queue itself issues is contiguous, islands
//! collide at a height only when two peers answer the same gap differently
//! (a fork, or one of them lying); `add_headers` keeps whichever candidate
//! actually chains to the current tip and drops the rest once the tip
//! reaches that height.

use std::collections::{BTreeMap, HashSet, VecDeque};

use bdp_primitives::{Block, BlockHeader, BlockNumber};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::{
    error::SyncQueueError,
    request::{BlocksRequest, HeadersRequest},
    wrapper::HeaderWrapper,
};

/// Candidate header buffered at a height not yet confirmed part of the main
/// chain.
type Islands = FxHashMap<BlockNumber, Vec<HeaderWrapper>>;

pub struct SyncQueue {
    /// Highest header whose full ancestry is present; heights 0..=tip.number
    /// have already been emitted (or are in `known_headers` awaiting body).
    tip: BlockHeader,
    /// Height we are trying to reach. `tip.number >= target_height` means
    /// the header chain is complete.
    target_height: BlockNumber,

    islands: Islands,
    in_flight_headers: HashSet<BlockNumber>,
    /// Monotonic cursor: the next height not yet covered by an island or an
    /// in-flight request. Only ever moves forward.
    next_unrequested: BlockNumber,

    /// Headers already linked to the tip but whose body has not yet been
    /// emitted, in ascending height order. Retains the original peer
    /// attribution for the body loop's fresh-tip optimisation.
    known_headers: BTreeMap<BlockNumber, HeaderWrapper>,
    body_in_flight: HashSet<BlockNumber>,
    bodies_ready: FxHashMap<BlockNumber, Block>,
    /// Highest height whose block has been emitted.
    block_tip_number: BlockNumber,

    bodies_enabled: bool,
}

impl SyncQueue {
    /// `genesis` anchors height 0 (or whatever the local chain's current
    /// head is); `target_height` is the height we are trying to reach.
    pub fn new(local_head: BlockHeader, target_height: BlockNumber, bodies_enabled: bool) -> Self {
        let block_tip_number = local_head.number;
        let next_unrequested = local_head.number + 1;
        SyncQueue {
            tip: local_head,
            target_height,
            islands: Islands::default(),
            in_flight_headers: HashSet::new(),
            next_unrequested,
            known_headers: BTreeMap::new(),
            body_in_flight: HashSet::new(),
            bodies_ready: FxHashMap::default(),
            block_tip_number,
            bodies_enabled,
        }
    }

    pub fn tip_number(&self) -> BlockNumber {
        self.tip.number
    }

    pub fn block_tip_number(&self) -> BlockNumber {
        self.block_tip_number
    }

    pub fn is_headers_complete(&self) -> bool {
        self.tip.number >= self.target_height
    }

    pub fn is_blocks_complete(&self) -> bool {
        !self.bodies_enabled || self.block_tip_number >= self.target_height
    }

    /// Number of headers buffered but not yet emitted downstream: islands
    /// plus headers parked awaiting a body.
    pub fn pending_header_count(&self) -> u64 {
        (self.islands.values().map(|v| v.len()).sum::<usize>() + self.known_headers.len()) as u64
    }

    /// Returns up to `max_requests` gap-filling requests, each covering at
    /// most `max_per_request` headers. `None` means the header chain is
    /// complete; `Some(vec![])` means no work is issuable right now.
    pub fn request_headers(
        &mut self,
        max_per_request: u32,
        max_requests: usize,
        total_pending: u64,
    ) -> Option<Vec<HeadersRequest>> {
        if self.is_headers_complete() {
            return None;
        }
        if self.pending_header_count() >= total_pending {
            trace!(pending = self.pending_header_count(), total_pending, "header queue full, throttling");
            return Some(Vec::new());
        }

        let mut requests = Vec::new();
        let mut cursor = self.next_unrequested;

        while requests.len() < max_requests && cursor <= self.target_height {
            while cursor <= self.target_height
                && (self.islands.contains_key(&cursor) || self.in_flight_headers.contains(&cursor))
            {
                cursor += 1;
            }
            if cursor > self.target_height {
                break;
            }
            let remaining = self.target_height - cursor + 1;
            let count = max_per_request.min(remaining.min(u64::from(u32::MAX)) as u32).max(1);
            requests.push(HeadersRequest::range(cursor, count, false));
            for h in cursor..cursor + u64::from(count) {
                self.in_flight_headers.insert(h);
            }
            cursor += u64::from(count);
        }
        self.next_unrequested = cursor;
        Some(requests)
    }

    /// Absorbs a batch of headers from a single response. On success,
    /// returns the (possibly empty) prefix that is now contiguous with the
    /// tip. On a structural violation, the whole batch is rejected and the
    /// heights it covered are freed to be re-requested.
    pub fn add_headers(
        &mut self,
        headers: Vec<HeaderWrapper>,
    ) -> Result<Vec<HeaderWrapper>, SyncQueueError> {
        if headers.is_empty() {
            return Err(SyncQueueError::EmptyBatch);
        }

        // Release the in-flight reservation for every height in this batch
        // regardless of outcome, so a rejected batch gets re-requested
        // rather than stuck forever.
        for h in &headers {
            self.in_flight_headers.remove(&h.header.number);
        }

        validate_batch_contiguity(&headers)?;

        for wrapper in headers {
            let height = wrapper.header.number;
            if height <= self.tip.number {
                // Stale duplicate of already-finalized history; ignore.
                continue;
            }
            self.islands.entry(height).or_default().push(wrapper);
        }

        Ok(self.extend_tip_from_islands())
    }

    /// Walks forward from the current tip through `islands`, promoting any
    /// candidate whose parent hash matches, discarding siblings at that
    /// height once one candidate wins.
    fn extend_tip_from_islands(&mut self) -> Vec<HeaderWrapper> {
        let mut emitted = Vec::new();
        loop {
            let next_height = self.tip.number + 1;
            let Some(candidates) = self.islands.remove(&next_height) else {
                break;
            };
            let tip_hash = self.tip.hash();
            let winner = candidates
                .into_iter()
                .find(|w| w.header.parent_hash == tip_hash);
            match winner {
                Some(wrapper) => {
                    self.tip = wrapper.header.clone();
                    if self.bodies_enabled {
                        self.known_headers.insert(next_height, wrapper.clone());
                    }
                    emitted.push(wrapper);
                }
                None => {
                    // None of the buffered candidates at this height chain
                    // to our tip: nothing new to extend with yet. Put
                    // nothing back — they were already proven unreachable
                    // from the tip and are discarded per the tie-breaking
                    // rule.
                    break;
                }
            }
        }
        if !emitted.is_empty() {
            debug!(
                from = emitted.first().map(|w| w.header.number).unwrap_or_default(),
                to = emitted.last().map(|w| w.header.number).unwrap_or_default(),
                "header tip advanced"
            );
        }
        emitted
    }

    /// Returns a request covering up to `max` headers whose bodies are not
    /// yet held. Callers shard it with `BlocksRequest::split`.
    pub fn request_blocks(&mut self, max: usize) -> BlocksRequest {
        if !self.bodies_enabled {
            return BlocksRequest::default();
        }
        let mut headers = Vec::new();
        for (&height, wrapper) in self.known_headers.range(self.block_tip_number + 1..) {
            if headers.len() >= max {
                break;
            }
            if self.body_in_flight.contains(&height) || self.bodies_ready.contains_key(&height) {
                continue;
            }
            self.body_in_flight.insert(height);
            headers.push(wrapper.clone());
        }
        BlocksRequest::new(headers)
    }

    /// Releases a body-request reservation without marking anything
    /// received — used when a shard is abandoned (no peer available, or
    /// the dispatch itself never went out).
    pub fn release_body_request(&mut self, request: &BlocksRequest) {
        for wrapper in &request.headers {
            self.body_in_flight.remove(&wrapper.header.number);
        }
    }

    /// Releases a header-request reservation without marking anything
    /// received — used on transport failure, an empty/rejected response or
    /// a queue-level rejection, so the covered heights get re-requested
    /// instead of sitting in `in_flight_headers` below `next_unrequested`
    /// forever.
    pub fn release_header_request(&mut self, request: &HeadersRequest) {
        match *request {
            HeadersRequest::Range { start_number, count, .. } => {
                for h in start_number..start_number + u64::from(count) {
                    self.in_flight_headers.remove(&h);
                }
                self.next_unrequested = self.next_unrequested.min(start_number);
            }
            HeadersRequest::Skip { .. } => {
                // Heights covered by a skip-list request aren't reserved in
                // `in_flight_headers` — they're resolved against the anchor
                // hash at response time, not against a known height range up
                // front — so there is nothing to free here.
            }
        }
    }

    /// Absorbs a batch of blocks, returning the newly-contiguous prefix.
    pub fn add_blocks(&mut self, blocks: Vec<Block>) -> Result<Vec<Block>, SyncQueueError> {
        if blocks.is_empty() {
            return Err(SyncQueueError::EmptyBatch);
        }
        for block in &blocks {
            let height = block.number();
            match self.known_headers.get(&height) {
                Some(wrapper) if wrapper.header.hash() == block.hash() => {}
                _ => return Err(SyncQueueError::UnrequestedBlock(block.hash())),
            }
        }
        for block in blocks {
            let height = block.number();
            self.body_in_flight.remove(&height);
            self.bodies_ready.insert(height, block);
        }
        Ok(self.extend_block_tip())
    }

    fn extend_block_tip(&mut self) -> Vec<Block> {
        let mut emitted = Vec::new();
        loop {
            let next_height = self.block_tip_number + 1;
            let Some(block) = self.bodies_ready.remove(&next_height) else {
                break;
            };
            self.known_headers.remove(&next_height);
            self.block_tip_number = next_height;
            emitted.push(block);
        }
        if !emitted.is_empty() {
            debug!(
                from = emitted.first().map(|b| b.number()).unwrap_or_default(),
                to = emitted.last().map(|b| b.number()).unwrap_or_default(),
                "block tip advanced"
            );
        }
        emitted
    }

    /// Headers resident but awaiting body, oldest first — used for the
    /// body loop's fresh-tip optimisation (peek without consuming).
    pub fn known_headers_front(&self, max: usize) -> VecDeque<HeaderWrapper> {
        self.known_headers
            .range(self.block_tip_number + 1..)
            .take(max)
            .map(|(_, w)| w.clone())
            .collect()
    }

    /// Heights up to `target_height` have all had a header request issued
    /// (or already arrived) — nothing new left to ask for, only in-flight
    /// tails to wait out.
    pub fn all_headers_requested(&self) -> bool {
        self.next_unrequested > self.target_height
    }

    pub fn tip_hash(&self) -> bdp_primitives::H256 {
        self.tip.hash()
    }
}

fn validate_batch_contiguity(headers: &[HeaderWrapper]) -> Result<(), SyncQueueError> {
    let mut sorted = headers.to_vec();
    sorted.sort_by_key(|w| w.header.number);
    for pair in sorted.windows(2) {
        let (a, b) = (&pair[0].header, &pair[1].header);
        if b.number != a.number + 1 {
            warn!(a = a.number, b = b.number, "non-contiguous header heights in batch");
            return Err(SyncQueueError::NonContiguousHeights(b.number));
        }
        if b.parent_hash != a.hash() {
            warn!(height = b.number, "header parent hash mismatch within batch");
            return Err(SyncQueueError::ParentMismatch {
                height: b.number,
                expected: a.hash(),
                got: b.parent_hash,
            });
        }
    }
    Ok(())
}
