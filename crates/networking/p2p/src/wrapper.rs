use bdp_primitives::{Block, BlockHeader};

use crate::peer::PeerId;

/// A header annotated with the peer it was received from, so a validation
/// failure downstream can be attributed back to the peer that sent it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderWrapper {
    pub header: BlockHeader,
    pub peer_id: PeerId,
}

impl HeaderWrapper {
    pub fn new(header: BlockHeader, peer_id: PeerId) -> Self {
        Self { header, peer_id }
    }
}

/// Symmetric wrapper for a fully-assembled block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockWrapper {
    pub block: Block,
    pub peer_id: PeerId,
}

impl BlockWrapper {
    pub fn new(block: Block, peer_id: PeerId) -> Self {
        Self { block, peer_id }
    }
}
