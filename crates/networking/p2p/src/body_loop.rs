use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    config::PipelineConfig,
    error::PeerTransportError,
    latch::CountdownLatch,
    metrics::Metrics,
    peer::{PeerHandle, PeerPool},
    queue::SyncQueue,
    request::BlocksRequest,
    sinks::PipelineSinks,
    wrapper::BlockWrapper,
};

type DispatchTriple<P> = (
    Arc<<P as PeerPool>::Handle>,
    BlocksRequest,
    futures::future::BoxFuture<'static, Result<Vec<bdp_primitives::Block>, PeerTransportError>>,
);

/// Runs the body-retrieval cycle until `cancel` fires or both the header
/// chain and the block chain are complete.
///
/// `headers_download_complete` is shared with the header loop: this loop
/// only treats itself as finished once that flag is set *and*
/// `queue.is_blocks_complete()` agrees, since in-flight body requests can
/// still be outstanding after the header side has nothing left to hand out.
#[allow(clippy::too_many_arguments)]
pub async fn run_body_loop<P, M, S>(
    pool: Arc<P>,
    queue: Arc<Mutex<SyncQueue>>,
    metrics: Arc<M>,
    sinks: Arc<S>,
    config: PipelineConfig,
    cancel: CancellationToken,
    headers_download_complete: Arc<AtomicBool>,
) where
    P: PeerPool + 'static,
    M: Metrics + 'static,
    S: PipelineSinks + 'static,
{
    loop {
        if cancel.is_cancelled() {
            debug!("body loop interrupted, exiting cleanly");
            return;
        }

        {
            let q = queue.lock().await;
            if q.is_blocks_complete() && headers_download_complete.load(Ordering::Acquire) {
                debug!("block chain complete");
                sinks.finish_download();
                return;
            }
        }

        let free = sinks.block_queue_free_size();
        if free <= u64::from(config.max_in_request) {
            trace!(free, "block queue saturated, throttling body loop");
            CountdownLatch::new(1).wait(config.body_latch_timeout).await;
            continue;
        }

        let multiplier = (free / u64::from(config.max_in_request))
            .min(u64::from(config.body_dispatch_multiplier_cap))
            .max(1);
        let max_blocks = (u64::from(config.max_in_request) * multiplier)
            .min(u64::from(config.bulk_body_request_cap)) as usize;

        let request = {
            let mut q = queue.lock().await;
            q.request_blocks(max_blocks)
        };
        if request.is_empty() {
            let front = queue.lock().await.known_headers_front(3);
            trace!(
                pending = ?front.iter().map(|w| w.header.number).collect::<Vec<_>>(),
                "no bodies to request this round"
            );
            CountdownLatch::new(1).wait(config.body_latch_timeout).await;
            continue;
        }

        let shards = request.split(config.max_in_request as usize);
        let mut triples: Vec<DispatchTriple<P>> = Vec::with_capacity(shards.len());

        for shard in shards {
            if cancel.is_cancelled() {
                return;
            }
            if let Some(triple) =
                dispatch_shard(&pool, &queue, &metrics, shard, config.fresh_tip_shard_threshold)
                    .await
            {
                triples.push(triple);
            }
        }

        // The latch is sized only once we know how many shards actually went
        // out this round, mirroring the header loop's two-phase approach.
        let dispatched = triples.len();
        let latch = Arc::new(CountdownLatch::new(if dispatched == 0 {
            0
        } else {
            dispatched.saturating_sub(2).max(1)
        }));
        for (peer, shard, outcome) in triples {
            spawn_completion(
                pool.clone(),
                queue.clone(),
                metrics.clone(),
                sinks.clone(),
                latch.clone(),
                peer,
                shard,
                outcome,
            );
        }

        trace!(dispatched, "body loop waiting on latch");
        latch.wait(config.body_latch_timeout).await;
    }
}

/// Picks a peer for `shard` and sends the request, releasing the shard's
/// reservation in `queue` if no send ever went out.
///
/// A shard at or below `fresh_tip_shard_threshold` in size is first offered
/// to the peer that originally delivered its headers, since that peer is
/// the one most likely to already hold the corresponding bodies.
async fn dispatch_shard<P, M>(
    pool: &Arc<P>,
    queue: &Arc<Mutex<SyncQueue>>,
    metrics: &Arc<M>,
    shard: BlocksRequest,
    fresh_tip_shard_threshold: usize,
) -> Option<DispatchTriple<P>>
where
    P: PeerPool + 'static,
    M: Metrics + 'static,
{
    let fresh_tip_peer_id = if shard.len() <= fresh_tip_shard_threshold {
        shard.headers.first().map(|h| h.peer_id)
    } else {
        None
    };

    let peer = match fresh_tip_peer_id {
        Some(id) => match pool.by_node_id(id).await {
            Some(peer) => Some(peer),
            None => pool.any_idle().await,
        },
        None => pool.any_idle().await,
    };

    let Some(peer) = peer else {
        let mut q = queue.lock().await;
        q.release_body_request(&shard);
        return None;
    };

    match peer.send_get_block_bodies(&shard.headers) {
        None => {
            pool.drop_peer(peer.node_id()).await;
            metrics.peer_dropped();
            let mut q = queue.lock().await;
            q.release_body_request(&shard);
            None
        }
        Some(outcome) => Some((peer, shard, outcome)),
    }
}

fn spawn_completion<P, M, S>(
    pool: Arc<P>,
    queue: Arc<Mutex<SyncQueue>>,
    metrics: Arc<M>,
    sinks: Arc<S>,
    latch: Arc<CountdownLatch>,
    peer: Arc<P::Handle>,
    shard: BlocksRequest,
    outcome: impl std::future::Future<Output = Result<Vec<bdp_primitives::Block>, PeerTransportError>>
        + Send
        + 'static,
) where
    P: PeerPool + 'static,
    M: Metrics + 'static,
    S: PipelineSinks + 'static,
{
    tokio::spawn(async move {
        let peer_id = peer.node_id();
        match outcome.await {
            Err(err) => {
                warn!(?err, %peer_id, "transport failure fetching bodies");
                pool.drop_peer(peer_id).await;
                metrics.peer_dropped();
                let mut q = queue.lock().await;
                q.release_body_request(&shard);
            }
            Ok(blocks) => {
                if blocks.len() != shard.len() {
                    warn!(
                        %peer_id,
                        expected = shard.len(),
                        got = blocks.len(),
                        "body response did not match requested shard, dropping peer"
                    );
                    pool.drop_peer(peer_id).await;
                    metrics.peer_dropped();
                    let mut q = queue.lock().await;
                    q.release_body_request(&shard);
                } else {
                    let add_result = {
                        let mut q = queue.lock().await;
                        q.add_blocks(blocks)
                    };
                    match add_result {
                        Ok(newly_contiguous) => {
                            if !newly_contiguous.is_empty() {
                                metrics.blocks_downloaded(newly_contiguous.len() as u64);
                                let wrapped: Vec<BlockWrapper> = newly_contiguous
                                    .into_iter()
                                    .map(|b| BlockWrapper::new(b, peer_id))
                                    .collect();
                                sinks.push_blocks(wrapped);
                            }
                            pool.record_success(peer_id).await;
                            pool.release(peer_id).await;
                        }
                        Err(err) => {
                            warn!(?err, %peer_id, "queue rejected block batch, dropping peer");
                            pool.drop_peer(peer_id).await;
                            metrics.peer_dropped();
                            let mut q = queue.lock().await;
                            q.release_body_request(&shard);
                        }
                    }
                }
            }
        }
        latch.count_down();
    });
}
