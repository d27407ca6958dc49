//! Durable, content-addressed block storage and chain traversal

use crate::block::{Block, BlockPayload};
use crate::error::{Result, TabchainError};
use crate::hash::{GENESIS_HASH, HashValue};
use crate::workspace::ChainWorkspace;
use chrono::Utc;

/// Block store over a chain workspace.
#[derive(Debug)]
pub struct BlockStore<'a> {
    workspace: &'a ChainWorkspace,
}

impl<'a> BlockStore<'a> {
    pub fn new(workspace: &'a ChainWorkspace) -> Self {
        Self { workspace }
    }

    /// Current HEAD hash; the genesis sentinel if the chain is empty.
    pub fn head_hash(&self) -> Result<HashValue> {
        self.workspace.head()
    }

    /// Commit a payload as a new block on top of HEAD.
    ///
    /// An empty delta is a no-op: nothing is written and `None` comes
    /// back. Otherwise the block file is written first and HEAD advances
    /// only afterwards, so a crash in between leaves the previous HEAD
    /// intact.
    pub fn commit(&self, payload: BlockPayload) -> Result<Option<HashValue>> {
        if let BlockPayload::Delta(delta) = &payload {
            if delta.is_empty() {
                log::info!("No changes detected, nothing to commit");
                return Ok(None);
            }
        }

        let parent = self.head_hash()?;
        let block = Block {
            parent,
            created: Utc::now(),
            payload,
        };

        let hash = block.content_hash()?;
        let encoded = block.encode()?;
        self.workspace.write_block(&hash, &encoded)?;
        self.workspace.set_head(&hash)?;

        log::info!("Created block '{:.7}...'", hash);
        Ok(Some(hash))
    }

    /// Load a block by its full hash.
    pub fn get(&self, hash: &str) -> Result<Block> {
        let data = self.workspace.read_block(hash)?;
        Block::decode(&data)
    }

    /// Walk parent links from `from` toward genesis.
    ///
    /// Yields `(hash, block)` pairs, newest first. A missing starting
    /// block surfaces as `BlockNotFound`; a missing parent further down
    /// surfaces as `ChainBroken`.
    pub fn ancestors(&self, from: &str) -> Ancestors<'_> {
        Ancestors {
            store: self,
            current: from.to_string(),
            child: None,
            done: false,
        }
    }

    /// Resolve a hash prefix against the retained block files, accepting
    /// the genesis sentinel as well. The prefix must match exactly one
    /// block.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<HashValue> {
        if prefix.is_empty() {
            return Err(TabchainError::block_not_found(prefix));
        }
        if GENESIS_HASH.starts_with(prefix) {
            return Ok(GENESIS_HASH.to_string());
        }

        let matches: Vec<HashValue> = self
            .workspace
            .block_hashes_on_disk()?
            .into_iter()
            .filter(|h| h.starts_with(prefix))
            .collect();

        match matches.len() {
            0 => Err(TabchainError::block_not_found(prefix)),
            1 => Ok(matches.into_iter().next().unwrap()),
            n => Err(TabchainError::AmbiguousRef {
                prefix: prefix.to_string(),
                matches: n,
            }),
        }
    }
}

/// Backward iterator over the chain, from a starting hash to genesis.
pub struct Ancestors<'a> {
    store: &'a BlockStore<'a>,
    current: HashValue,
    child: Option<HashValue>,
    done: bool,
}

impl Iterator for Ancestors<'_> {
    type Item = Result<(HashValue, Block)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.current == GENESIS_HASH {
            return None;
        }

        match self.store.get(&self.current) {
            Ok(block) => {
                let hash = std::mem::replace(&mut self.current, block.parent.clone());
                self.child = Some(hash.clone());
                Some(Ok((hash, block)))
            }
            Err(TabchainError::BlockNotFound { hash }) => {
                self.done = true;
                match self.child.take() {
                    Some(child) => Some(Err(TabchainError::ChainBroken {
                        hash: child,
                        parent: hash,
                    })),
                    None => Some(Err(TabchainError::BlockNotFound { hash })),
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
