//! Patch construction: merging a span of the chain into one payload

use crate::block::BlockPayload;
use crate::delta::Delta;
use crate::error::{Result, TabchainError};
use crate::hash::{GENESIS_HASH, HashValue};
use crate::state::State;
use crate::store::BlockStore;
use crate::workspace::ChainWorkspace;
use crate::FORMAT_VERSION;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Merged payload of a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PatchPayload {
    /// Consolidated changes since `start_hash`.
    Delta(Delta),
    /// Full resync: the complete current state.
    State(State),
}

/// Everything that changed between `start_hash` (exclusive) and
/// `head_hash` (inclusive), encoded for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Patch format version, checked on decode.
    pub version: u32,
    /// The caller's last-known hash this patch starts after.
    pub start_hash: HashValue,
    /// HEAD at the time the patch was built.
    pub head_hash: HashValue,
    /// Number of blocks merged into the payload.
    pub num_blocks: u32,
    /// `None` when nothing changed in the requested span.
    pub payload: Option<PatchPayload>,
}

impl Patch {
    /// Build a patch covering `last_known` (exclusive) up to HEAD.
    ///
    /// `last_known` must be a full hash or the genesis sentinel. When it
    /// no longer resolves inside the retained chain, the patch degrades
    /// to a full-state resync rather than failing.
    pub fn create(
        store: &BlockStore<'_>,
        workspace: &ChainWorkspace,
        last_known: &str,
    ) -> Result<Patch> {
        let head_hash = store.head_hash()?;
        if head_hash == GENESIS_HASH {
            return Err(TabchainError::UnresolvableRange);
        }

        if head_hash == last_known {
            log::info!("Consumer is already at head, patch is empty");
            return Ok(Patch {
                version: FORMAT_VERSION,
                start_hash: last_known.to_string(),
                head_hash,
                num_blocks: 0,
                payload: None,
            });
        }

        match consolidate(store, workspace, &head_hash, last_known) {
            Ok((num_blocks, payload)) => Ok(Patch {
                version: FORMAT_VERSION,
                start_hash: last_known.to_string(),
                head_hash,
                num_blocks,
                payload,
            }),
            Err(e) => {
                log::warn!("Consolidation failed, falling back to full state: {}", e);
                let state = State::load(workspace)?.ok_or_else(|| {
                    TabchainError::decode(
                        "consolidation failed and no STATE artifact exists for fallback",
                    )
                })?;
                Ok(Patch {
                    version: FORMAT_VERSION,
                    start_hash: GENESIS_HASH.to_string(),
                    head_hash,
                    num_blocks: 0,
                    payload: Some(PatchPayload::State(state)),
                })
            }
        }
    }
}

/// Walk the chain from HEAD back to `stop` (exclusive) and fold the
/// collected deltas oldest-first. Reaching genesis with `stop` set to
/// the genesis sentinel collapses to the full current state.
fn consolidate(
    store: &BlockStore<'_>,
    workspace: &ChainWorkspace,
    head_hash: &str,
    stop: &str,
) -> Result<(u32, Option<PatchPayload>)> {
    let mut collected = Vec::new();
    let mut reached_stop = false;

    for item in store.ancestors(head_hash) {
        let (hash, block) = item?;
        let parent = block.parent.clone();
        collected.push((hash, block));
        if parent == stop {
            reached_stop = true;
            break;
        }
    }

    if !reached_stop {
        // The walk ended at genesis without passing the stop hash, so the
        // stop is not in the retained chain.
        return Err(TabchainError::block_not_found(stop));
    }

    let num_blocks = collected.len() as u32;

    if stop == GENESIS_HASH {
        // The span covers the whole chain; the genesis snapshot plus every
        // delta collapses to the current state by construction.
        let state = State::load(workspace)?.ok_or_else(|| {
            TabchainError::decode("chain has blocks but no STATE artifact")
        })?;
        return Ok((num_blocks, Some(PatchPayload::State(state))));
    }

    let mut merged: Option<Delta> = None;
    for (hash, block) in collected.into_iter().rev() {
        match block.payload {
            BlockPayload::Delta(delta) => {
                merged = Some(match merged {
                    Some(acc) => acc.merge(delta),
                    None => delta,
                });
            }
            BlockPayload::State(_) => {
                // A snapshot block inside a delta span means the chain
                // does not line up with the request.
                return Err(TabchainError::decode(format!(
                    "unexpected snapshot block '{:.7}...' inside patch span",
                    hash
                )));
            }
        }
    }

    match merged {
        Some(delta) if !delta.is_empty() => Ok((num_blocks, Some(PatchPayload::Delta(delta)))),
        _ => Ok((num_blocks, None)),
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "patch {:.7}..{:.7} ({} block(s))",
            self.start_hash, self.head_hash, self.num_blocks
        )?;
        match &self.payload {
            None => write!(f, ": no changes"),
            Some(PatchPayload::State(state)) => {
                write!(f, ": full resync of {} table(s)", state.tables.len())
            }
            Some(PatchPayload::Delta(delta)) => {
                let total: usize = delta.tables.iter().map(|t| t.entries.len()).sum();
                write!(
                    f,
                    ": {} change(s) across {} table(s)",
                    total,
                    delta.tables.len()
                )
            }
        }
    }
}
