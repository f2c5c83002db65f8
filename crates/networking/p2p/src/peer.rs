use std::sync::Arc;

use async_trait::async_trait;
use bdp_primitives::{Block, BlockHeader};
use ethereum_types::H256;
use futures::future::BoxFuture;

use crate::{error::PeerTransportError, request::HeadersRequest, wrapper::HeaderWrapper};

/// Opaque peer identity. A real transport keys this off the peer's public
/// key or session id; to this crate it is just a value we can hash,
/// compare, and hand back to the pool later.
pub type PeerId = H256;

type HeadersFuture = BoxFuture<'static, Result<Vec<BlockHeader>, PeerTransportError>>;
type BodiesFuture = BoxFuture<'static, Result<Vec<Block>, PeerTransportError>>;

/// A single remote peer's send surface.
///
/// `send_get_block_headers` / `send_get_block_bodies` return `None`
/// *immediately* when the peer can no longer carry the request at all
/// (connection already torn down) — the spec's "nullable future". A
/// `Some(future)` is a request that was actually sent; the future resolves
/// later, independently of the call that dispatched it, which is what lets
/// the loops move on to the next peer without blocking on this one.
pub trait PeerHandle: Send + Sync {
    fn node_id(&self) -> PeerId;

    fn send_get_block_headers(&self, request: HeadersRequest) -> Option<HeadersFuture>;

    fn send_get_block_bodies(&self, headers: &[HeaderWrapper]) -> Option<BodiesFuture>;

    /// Sever the connection. The pool is expected to observe this and stop
    /// returning the peer from `any_idle`/`by_node_id`.
    fn drop_connection(&self);
}

/// The externally-maintained pool of peers this subsystem draws from.
///
/// "Idle" means not currently servicing a request dispatched by this
/// subsystem; the pool, not the pipeline, is the authority on peer
/// lifecycle (connect/disconnect churn happens independently of sync).
#[async_trait]
pub trait PeerPool: Send + Sync {
    type Handle: PeerHandle + 'static;

    /// Returns an idle peer and marks it busy, or `None` if every known
    /// peer is currently servicing a request (or there are no peers at
    /// all).
    async fn any_idle(&self) -> Option<Arc<Self::Handle>>;

    /// Looks up a specific peer regardless of its idle/busy state. Used by
    /// the body loop's fresh-tip optimisation to re-target the peer that
    /// originally delivered a header.
    async fn by_node_id(&self, id: PeerId) -> Option<Arc<Self::Handle>>;

    /// Marks a peer idle again after a dispatch completes, successfully or
    /// not (short of a hard drop).
    async fn release(&self, id: PeerId);

    /// Soft failure: the peer timed out or sent an empty/unusable response.
    /// It stays in the pool but may be deprioritized by peer-selection
    /// policy.
    async fn record_failure(&self, id: PeerId);

    /// The peer answered correctly and promptly.
    async fn record_success(&self, id: PeerId);

    /// Hard failure: the peer sent structurally invalid or malicious data.
    /// Sever it and remove it from the pool permanently.
    async fn drop_peer(&self, id: PeerId);

    /// Releases this subsystem's hold on the pool once its loops have
    /// stopped. A pool shared with other subsystems is typically a no-op
    /// here (the default); one owned exclusively by the pipeline overrides
    /// it to actually tear the transport down.
    async fn close(&self) {}
}
