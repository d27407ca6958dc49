//! The engine handle: one commit/patch/report surface per working directory

use crate::block::BlockPayload;
use crate::codec;
use crate::config::Config;
use crate::delta::Delta;
use crate::error::{Result, TabchainError};
use crate::hash::{GENESIS_HASH, HashValue};
use crate::patch::Patch;
use crate::sql;
use crate::state::State;
use crate::store::BlockStore;
use crate::truncate;
use crate::workspace::ChainWorkspace;
use std::path::Path;

/// Handle over one working directory. All operations go through here;
/// there is no process-wide state.
///
/// The chain is single-writer: the caller must ensure at most one commit
/// runs against a working directory at a time.
#[derive(Debug)]
pub struct Engine {
    pub config: Config,
    pub workspace: ChainWorkspace,
}

impl Engine {
    /// Parse the configuration in `work_dir` and open an engine over it.
    pub fn open(work_dir: &Path) -> Result<Self> {
        let config = Config::load(work_dir)?;
        let workspace = ChainWorkspace::new(work_dir);
        Ok(Self { config, workspace })
    }

    /// Run one commit cycle: read the CSV sources, diff against the last
    /// committed state, and append a block when anything changed.
    ///
    /// Returns the new block hash, or `None` when the sources match the
    /// previous state exactly. The very first commit is genesis and
    /// carries the full snapshot.
    pub fn create_block(&self) -> Result<Option<HashValue>> {
        let previous = State::load(&self.workspace)?;
        let current = State::read_sources(&self.config)?;

        let payload = match &previous {
            None => BlockPayload::State(current.clone()),
            Some(prev) => BlockPayload::Delta(Delta::compute(prev, &current)),
        };

        let store = BlockStore::new(&self.workspace);
        let Some(hash) = store.commit(payload)? else {
            return Ok(None);
        };
        current.save(&self.workspace)?;

        truncate::run(&self.config, &self.workspace)?;

        Ok(Some(hash))
    }

    /// Build and encode a patch from `last_known` (exclusive) to HEAD.
    ///
    /// With no `last_known`, the REPORTED pointer is used, or genesis if
    /// the consumer has never acknowledged anything.
    pub fn create_patch(&self, last_known: Option<&str>) -> Result<Vec<u8>> {
        let stop = match last_known {
            Some(hash) => hash.to_string(),
            None => self
                .workspace
                .reported()?
                .unwrap_or_else(|| GENESIS_HASH.to_string()),
        };

        let store = BlockStore::new(&self.workspace);
        let patch = Patch::create(&store, &self.workspace, &stop)?;
        codec::encode_patch(&self.config, &patch)
    }

    /// Decode a patch buffer and translate it to transactional SQL.
    ///
    /// Returns `None` when the patch carries no actionable changes.
    pub fn patch_to_sql(&self, data: &[u8]) -> Result<Option<String>> {
        let patch = codec::decode_patch(data)?;
        sql::patch_to_sql(&self.config, &patch)
    }

    /// Signal that a patch was handed downstream. The buffer is consumed
    /// regardless of outcome. With `reported` set, the patch's head hash
    /// is acknowledged, unlocking truncation of everything older.
    pub fn patch_applied(&self, data: Vec<u8>, reported: bool) -> Result<HashValue> {
        let patch = codec::decode_patch(&data)?;
        drop(data);

        if reported {
            self.ensure_reachable(&patch.head_hash)?;
            self.workspace.set_reported(&patch.head_hash)?;
        }

        Ok(patch.head_hash)
    }

    /// Verify that `hash` is HEAD or one of its ancestors, so REPORTED
    /// never points outside the chain.
    fn ensure_reachable(&self, hash: &str) -> Result<()> {
        let store = BlockStore::new(&self.workspace);
        let head = store.head_hash()?;
        if head == hash {
            return Ok(());
        }

        for item in store.ancestors(&head) {
            let (current, _) = item.map_err(|_| TabchainError::block_not_found(hash))?;
            if current == hash {
                return Ok(());
            }
        }
        Err(TabchainError::block_not_found(hash))
    }
}
