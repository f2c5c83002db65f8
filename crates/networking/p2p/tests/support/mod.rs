//! Hand-rolled in-memory peer network for the integration tests. No mocking
//! framework, per the project's ambient test-tooling conventions: a handful
//! of fields and two trait impls are enough to script every scenario below.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use bdp_download::error::PeerTransportError;
use bdp_download::peer::{PeerHandle, PeerId, PeerPool};
use bdp_download::request::HeadersRequest;
use bdp_download::sinks::PipelineSinks;
use bdp_download::wrapper::{BlockWrapper, HeaderWrapper};
use bdp_primitives::{Block, BlockBody, BlockHeader};
use futures::future::BoxFuture;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

/// Installs a `tracing` subscriber once per test binary, honouring
/// `RUST_LOG` the same way the teacher's own integration tests do. Safe to
/// call from every test: `try_init` silently no-ops past the first caller.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A linear chain every mock peer serves from, optionally corrupted.
pub struct MockChain {
    pub headers: Vec<BlockHeader>,
}

impl MockChain {
    pub fn linear(len: u64) -> Arc<MockChain> {
        let mut headers = vec![BlockHeader::genesis()];
        for i in 0..len {
            let parent = headers.last().expect("non-empty");
            headers.push(parent.child(i as u8));
        }
        Arc::new(MockChain { headers })
    }

    pub fn block_at(&self, height: u64) -> Block {
        Block {
            header: self.headers[height as usize].clone(),
            body: BlockBody::default(),
        }
    }
}

pub struct MockPeer {
    id: PeerId,
    chain: Arc<MockChain>,
    disconnected: AtomicBool,
    /// When set, every header response has its parent hash at the given
    /// height corrupted once.
    malicious: bool,
}

impl MockPeer {
    pub fn honest(id: PeerId, chain: Arc<MockChain>) -> Arc<MockPeer> {
        Arc::new(MockPeer {
            id,
            chain,
            disconnected: AtomicBool::new(false),
            malicious: false,
        })
    }

    pub fn malicious(id: PeerId, chain: Arc<MockChain>) -> Arc<MockPeer> {
        Arc::new(MockPeer {
            id,
            chain,
            disconnected: AtomicBool::new(false),
            malicious: true,
        })
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}

impl PeerHandle for MockPeer {
    fn node_id(&self) -> PeerId {
        self.id
    }

    fn send_get_block_headers(
        &self,
        request: HeadersRequest,
    ) -> Option<BoxFuture<'static, Result<Vec<BlockHeader>, PeerTransportError>>> {
        if self.is_disconnected() {
            return None;
        }
        let chain = self.chain.clone();
        let malicious = self.malicious;
        Some(Box::pin(async move {
            let mut headers = match request {
                HeadersRequest::Range {
                    start_number,
                    count,
                    ..
                } => {
                    let end = (start_number + u64::from(count)).min(chain.headers.len() as u64);
                    if start_number >= end {
                        Vec::new()
                    } else {
                        chain.headers[start_number as usize..end as usize].to_vec()
                    }
                }
                HeadersRequest::Skip {
                    anchor_hash,
                    count,
                    step,
                    ..
                } => {
                    let Some(anchor) = chain.headers.iter().find(|h| h.hash() == anchor_hash)
                    else {
                        return Err(PeerTransportError::MalformedResponse);
                    };
                    let mut out = Vec::new();
                    let mut height = anchor.number;
                    for _ in 0..count {
                        let Some(header) = chain.headers.get(height as usize) else {
                            break;
                        };
                        out.push(header.clone());
                        let Some(next) = height.checked_add(u64::from(step)) else {
                            break;
                        };
                        height = next;
                    }
                    out
                }
            };
            if malicious {
                if let Some(first) = headers.first_mut() {
                    first.parent_hash = bdp_primitives::H256::repeat_byte(0xAA);
                }
            }
            Ok(headers)
        }))
    }

    fn send_get_block_bodies(
        &self,
        headers: &[HeaderWrapper],
    ) -> Option<BoxFuture<'static, Result<Vec<Block>, PeerTransportError>>> {
        if self.is_disconnected() {
            return None;
        }
        let chain = self.chain.clone();
        let heights: Vec<u64> = headers.iter().map(|w| w.header.number).collect();
        Some(Box::pin(async move {
            Ok(heights.into_iter().map(|h| chain.block_at(h)).collect())
        }))
    }

    fn drop_connection(&self) {
        self.disconnected.store(true, Ordering::Release);
    }
}

#[derive(Default)]
pub struct MockPeerPool {
    peers: Mutex<HashMap<PeerId, Arc<MockPeer>>>,
    idle: Mutex<HashSet<PeerId>>,
}

impl MockPeerPool {
    pub async fn add(&self, peer: Arc<MockPeer>) {
        let id = peer.node_id();
        self.peers.lock().await.insert(id, peer);
        self.idle.lock().await.insert(id);
    }

    pub async fn remaining(&self) -> usize {
        self.peers.lock().await.len()
    }
}

#[async_trait]
impl PeerPool for MockPeerPool {
    type Handle = MockPeer;

    async fn any_idle(&self) -> Option<Arc<MockPeer>> {
        let mut idle = self.idle.lock().await;
        let id = *idle.iter().next()?;
        idle.remove(&id);
        self.peers.lock().await.get(&id).cloned()
    }

    async fn by_node_id(&self, id: PeerId) -> Option<Arc<MockPeer>> {
        let peer = self.peers.lock().await.get(&id).cloned()?;
        self.idle.lock().await.remove(&id);
        Some(peer)
    }

    async fn release(&self, id: PeerId) {
        if self.peers.lock().await.contains_key(&id) {
            self.idle.lock().await.insert(id);
        }
    }

    async fn record_failure(&self, _id: PeerId) {}

    async fn record_success(&self, _id: PeerId) {}

    async fn drop_peer(&self, id: PeerId) {
        if let Some(peer) = self.peers.lock().await.remove(&id) {
            peer.drop_connection();
        }
        self.idle.lock().await.remove(&id);
    }
}

/// Collects whatever the pipeline pushes, for test assertions. `free_size`
/// is settable from the test to script backpressure.
#[derive(Default)]
pub struct TestSinks {
    pub headers: StdMutex<Vec<HeaderWrapper>>,
    pub blocks: StdMutex<Vec<BlockWrapper>>,
    pub finished: AtomicBool,
    free_size: AtomicI64,
}

impl TestSinks {
    pub fn new(free_size: i64) -> Arc<TestSinks> {
        Arc::new(TestSinks {
            headers: StdMutex::new(Vec::new()),
            blocks: StdMutex::new(Vec::new()),
            finished: AtomicBool::new(false),
            free_size: AtomicI64::new(free_size),
        })
    }

    pub fn set_free_size(&self, value: i64) {
        self.free_size.store(value, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl PipelineSinks for TestSinks {
    fn push_headers(&self, headers: Vec<HeaderWrapper>) {
        self.headers.lock().expect("lock").extend(headers);
    }

    fn push_blocks(&self, blocks: Vec<BlockWrapper>) {
        self.blocks.lock().expect("lock").extend(blocks);
    }

    fn block_queue_free_size(&self) -> u64 {
        self.free_size.load(Ordering::Acquire).max(0) as u64
    }

    fn finish_download(&self) {
        self.finished.store(true, Ordering::Release);
    }
}
