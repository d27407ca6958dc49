//! Immutable, content-addressed units of chain history

use crate::delta::Delta;
use crate::error::Result;
use crate::hash::{self, HashValue};
use crate::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Block payload: a genesis block carries the full table state (there is
/// nothing earlier to diff against), every later block carries a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlockPayload {
    State(State),
    Delta(Delta),
}

impl BlockPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BlockPayload::State(_) => "state",
            BlockPayload::Delta(_) => "delta",
        }
    }
}

/// One block in the chain. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the previous block, or the genesis sentinel.
    pub parent: HashValue,
    /// When the block was committed. Stored for the age-based truncation
    /// rule and `log` output; not part of the content hash.
    pub created: DateTime<Utc>,
    pub payload: BlockPayload,
}

impl Block {
    /// Content hash over the parent hash and the canonical payload
    /// encoding. The `created` timestamp is excluded so identical
    /// payload+parent always hash identically.
    pub fn content_hash(&self) -> Result<HashValue> {
        let payload_bytes = serde_json::to_vec(&self.payload)?;
        Ok(hash::block_hash(&self.parent, &payload_bytes))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Names of the tables this block touches.
    pub fn table_names(&self) -> Vec<&str> {
        match &self.payload {
            BlockPayload::State(state) => state.tables.keys().map(String::as_str).collect(),
            BlockPayload::Delta(delta) => {
                delta.tables.iter().map(|t| t.table.as_str()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::GENESIS_HASH;

    fn empty_delta_block(parent: &str) -> Block {
        Block {
            parent: parent.to_string(),
            created: Utc::now(),
            payload: BlockPayload::Delta(Delta { tables: vec![] }),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let block = empty_delta_block(GENESIS_HASH);
        let encoded = block.encode().unwrap();
        let decoded = Block::decode(&encoded).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_hash_ignores_timestamp() {
        let mut a = empty_delta_block(GENESIS_HASH);
        let mut b = empty_delta_block(GENESIS_HASH);
        a.created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        b.created = DateTime::from_timestamp(1_800_000_000, 0).unwrap();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn test_hash_depends_on_parent() {
        let a = empty_delta_block(GENESIS_HASH);
        let b = empty_delta_block(&"a".repeat(64));
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }
}
