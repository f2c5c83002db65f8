use ethereum_types::H256;

/// Errors surfaced by [`crate::queue::SyncQueue`] when absorbing peer
/// responses. Every variant here is, per the error handling design, a
/// *validation failure*: the caller drops the offending peer and discards
/// the batch, it never propagates further.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncQueueError {
    #[error("empty batch")]
    EmptyBatch,
    #[error("headers not contiguous: height {0} does not follow the previous height by 1 (or by the request's step)")]
    NonContiguousHeights(u64),
    #[error("header at height {height} has parent {got:?}, expected {expected:?}")]
    ParentMismatch {
        height: u64,
        expected: H256,
        got: H256,
    },
    #[error("received block {0:?} with no matching pending header")]
    UnrequestedBlock(H256),
    #[error("received headers for a range that was never requested")]
    UnrequestedRange,
}

/// Errors from a single request/response round-trip with a peer. These are
/// *transport failures*: the pool is told to drop or penalize the peer and
/// the request is reissued on the next loop iteration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerTransportError {
    #[error("peer connection closed before responding")]
    Disconnected,
    #[error("peer did not respond within the request timeout")]
    Timeout,
    #[error("peer returned a malformed response")]
    MalformedResponse,
}

/// Top-level pipeline errors. Per the design, these never arise from normal
/// peer misbehaviour (that is absorbed silently, see the taxonomy above) —
/// only from setup mistakes or the embedder's own sinks misbehaving.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("both the header loop and the body loop are disabled; nothing to run")]
    NothingToRun,
    #[error("pipeline was already started")]
    AlreadyStarted,
    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),
}
