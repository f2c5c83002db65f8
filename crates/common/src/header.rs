use ethereum_types::H256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Block height. Monotonic, gapless along any single chain.
pub type BlockNumber = u64;

/// A block header.
///
/// The download pipeline only cares about three things on a header: its
/// parent link, its height, and its own hash. Every other field is along
/// for the ride so that a `Block` built from this header is something a
/// real importer would accept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub number: BlockNumber,
    pub timestamp: u64,
    pub state_root: H256,
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// Keccak-256 over a canonical field encoding. Not a wire format: the
    /// pipeline never serializes this for transport, only uses it as a
    /// stable key.
    pub fn hash(&self) -> H256 {
        let mut hasher = Keccak256::new();
        hasher.update(self.parent_hash.as_bytes());
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.state_root.as_bytes());
        hasher.update(&self.extra_data);
        H256::from_slice(&hasher.finalize())
    }

    pub fn genesis() -> Self {
        BlockHeader {
            parent_hash: H256::zero(),
            number: 0,
            timestamp: 0,
            state_root: H256::zero(),
            extra_data: Vec::new(),
        }
    }

    /// Builds the header that would chain directly after `self`, i.e. the
    /// header at `self.number + 1` whose `parent_hash` is `self.hash()`.
    ///
    /// Used throughout tests to build synthetic chains; `salt` lets callers
    /// mint distinct forks/islands at the same height.
    pub fn child(&self, salt: u8) -> Self {
        BlockHeader {
            parent_hash: self.hash(),
            number: self.number + 1,
            timestamp: self.timestamp + 1,
            state_root: H256::zero(),
            extra_data: vec![salt],
        }
    }
}
