use ethereum_types::H256;
use serde::{Deserialize, Serialize};

use crate::header::BlockHeader;

/// Opaque payload carried by a block. Verified against its header by the
/// importer, not by this subsystem; we only need it to be keyable and
/// cheap to move around.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    pub transactions: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }
}
