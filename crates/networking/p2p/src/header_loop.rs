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
    request::HeadersRequest,
    sinks::PipelineSinks,
    validator::HeaderValidator,
    wrapper::HeaderWrapper,
};

/// Runs the header-retrieval cycle described in the design until `cancel`
/// fires or the header chain is proven complete.
///
/// `bodies_enabled` controls whether reaching the end of the header chain
/// also finishes the whole download (headers-only / light-sync mode) or
/// merely flips `headers_download_complete` and lets the body loop drive
/// completion from there.
#[allow(clippy::too_many_arguments)]
pub async fn run_header_loop<P, V, M, S>(
    pool: Arc<P>,
    queue: Arc<Mutex<SyncQueue>>,
    validator: Arc<V>,
    metrics: Arc<M>,
    sinks: Arc<S>,
    config: PipelineConfig,
    cancel: CancellationToken,
    bodies_enabled: bool,
    headers_download_complete: Arc<AtomicBool>,
) where
    P: PeerPool + 'static,
    V: HeaderValidator + 'static,
    M: Metrics + 'static,
    S: PipelineSinks + 'static,
{
    let mut pending: Vec<HeadersRequest> = Vec::new();

    loop {
        if cancel.is_cancelled() {
            debug!("header loop interrupted, exiting cleanly");
            return;
        }

        if pending.is_empty() {
            let request_result = {
                let mut q = queue.lock().await;
                q.request_headers(
                    config.headers_per_request,
                    config.max_header_requests_per_iteration,
                    config.header_queue_limit,
                )
            };
            match request_result {
                None => {
                    let tip_hash = queue.lock().await.tip_hash();
                    debug!(?tip_hash, "header chain complete");
                    headers_download_complete.store(true, Ordering::Release);
                    if !bodies_enabled {
                        sinks.finish_download();
                    }
                    return;
                }
                Some(requests) => pending = requests,
            }
        }

        let mut still_pending = Vec::with_capacity(pending.len());
        let mut dispatches = Vec::new();

        for request in pending.drain(..) {
            if cancel.is_cancelled() {
                return;
            }
            let Some(peer) = pool.any_idle().await else {
                still_pending.push(request);
                break;
            };
            let peer_id = peer.node_id();
            match peer.send_get_block_headers(request.clone()) {
                None => {
                    // Peer can no longer carry the request at all.
                    pool.drop_peer(peer_id).await;
                    metrics.peer_dropped();
                    still_pending.push(request);
                }
                Some(outcome) => dispatches.push((peer, request, outcome)),
            }
        }
        pending = still_pending;

        // The latch is sized only once we know how many requests actually
        // went out this round, per the design's "/2" pacing rationale.
        let dispatched = dispatches.len();
        let latch = Arc::new(CountdownLatch::new(if dispatched == 0 {
            0
        } else {
            (dispatched / 2).max(1)
        }));
        for (peer, request, outcome) in dispatches {
            spawn_completion(
                pool.clone(),
                queue.clone(),
                validator.clone(),
                metrics.clone(),
                sinks.clone(),
                latch.clone(),
                peer,
                request,
                outcome,
            );
        }

        let timeout = if queue.lock().await.all_headers_requested() {
            config.header_latch_timeout_post_sync
        } else {
            config.header_latch_timeout
        };
        trace!(dispatched, ?timeout, "header loop waiting on latch");
        latch.wait(timeout).await;
    }
}

fn spawn_completion<P, V, M, S>(
    pool: Arc<P>,
    queue: Arc<Mutex<SyncQueue>>,
    validator: Arc<V>,
    metrics: Arc<M>,
    sinks: Arc<S>,
    latch: Arc<CountdownLatch>,
    peer: Arc<P::Handle>,
    request: HeadersRequest,
    outcome: impl std::future::Future<Output = Result<Vec<bdp_primitives::BlockHeader>, PeerTransportError>>
        + Send
        + 'static,
) where
    P: PeerPool + 'static,
    V: HeaderValidator + 'static,
    M: Metrics + 'static,
    S: PipelineSinks + 'static,
{
    tokio::spawn(async move {
        let peer_id = peer.node_id();
        match outcome.await {
            Err(err) => {
                warn!(?err, %peer_id, "transport failure fetching headers");
                pool.drop_peer(peer_id).await;
                metrics.peer_dropped();
                queue.lock().await.release_header_request(&request);
            }
            Ok(headers) => {
                let wrapped: Vec<HeaderWrapper> = headers
                    .into_iter()
                    .map(|h| HeaderWrapper::new(h, peer_id))
                    .collect();

                if wrapped.is_empty() {
                    // Empty isn't necessarily malicious — the peer may just
                    // be out of sync or have nothing left to offer. Keep it
                    // in the pool but deprioritize it.
                    warn!(%peer_id, "empty header response, recording soft failure");
                    pool.record_failure(peer_id).await;
                    pool.release(peer_id).await;
                    queue.lock().await.release_header_request(&request);
                    latch.count_down();
                    return;
                }

                let mut invalid = false;
                for w in &wrapped {
                    if let Err(err) = validator.validate(&w.header) {
                        warn!(?err, %peer_id, "header failed validation, dropping peer");
                        invalid = true;
                        break;
                    }
                }

                if invalid {
                    pool.drop_peer(peer_id).await;
                    metrics.peer_dropped();
                    queue.lock().await.release_header_request(&request);
                } else {
                    let add_result = {
                        let mut q = queue.lock().await;
                        q.add_headers(wrapped)
                    };
                    match add_result {
                        Ok(newly_contiguous) => {
                            if !newly_contiguous.is_empty() {
                                metrics.headers_downloaded(newly_contiguous.len() as u64);
                                sinks.push_headers(newly_contiguous);
                            }
                            pool.record_success(peer_id).await;
                            pool.release(peer_id).await;
                        }
                        Err(err) => {
                            warn!(?err, %peer_id, "queue rejected header batch, dropping peer");
                            pool.drop_peer(peer_id).await;
                            metrics.peer_dropped();
                            queue.lock().await.release_header_request(&request);
                        }
                    }
                }
            }
        }
        latch.count_down();
    });
}
