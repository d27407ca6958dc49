//! History truncation: dropping blocks no future patch request can need

use crate::config::Config;
use crate::error::Result;
use crate::hash::{GENESIS_HASH, HashValue};
use crate::store::BlockStore;
use crate::workspace::ChainWorkspace;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

struct ChainEntry {
    hash: HashValue,
    created: DateTime<Utc>,
}

/// Remove blocks that no future patch request can reach.
///
/// Runs after every successful commit. Blocks strictly older than
/// REPORTED are always removable; the optional `max_blocks` and
/// `max_age_secs` bounds can remove more (a consumer that falls behind
/// them degrades to a full-state resync). HEAD is never removed, and
/// with no REPORTED pointer and no configured bounds the whole chain is
/// retained.
pub fn run(config: &Config, workspace: &ChainWorkspace) -> Result<()> {
    let store = BlockStore::new(workspace);
    let head_hash = store.head_hash()?;

    // Walk HEAD toward genesis, collecting the ordered chain and the
    // reachable set. A missing block means an earlier truncation already
    // cut the chain there.
    let mut chain = Vec::new();
    let mut reachable = HashSet::new();

    let mut current = head_hash;
    while current != GENESIS_HASH {
        let block = match store.get(&current) {
            Ok(b) => b,
            Err(_) => {
                log::debug!(
                    "Block '{:.7}...' not found (previously truncated), stopping chain walk",
                    current
                );
                break;
            }
        };
        reachable.insert(current.clone());
        let parent = block.parent.clone();
        chain.push(ChainEntry {
            hash: current,
            created: block.created,
        });
        current = parent;
    }

    // Orphan sweep: block files on disk that nothing reachable points to.
    for hash in workspace.block_hashes_on_disk()? {
        if !reachable.contains(&hash) {
            log::info!("Removing orphaned block '{:.7}...'", hash);
            workspace.remove_block(&hash)?;
        }
    }

    if chain.is_empty() {
        return Ok(());
    }

    let reported_pos = match workspace.reported()? {
        Some(ref hash) => chain.iter().position(|e| e.hash == *hash),
        None => None,
    };

    let truncate_config = config.truncate.as_ref();
    let max_blocks = truncate_config.and_then(|t| t.max_blocks).map(|m| m as usize);
    let max_age_cutoff = truncate_config
        .and_then(|t| t.max_age_secs)
        .map(|secs| Utc::now() - Duration::seconds(secs as i64));

    // Chain index 0 is HEAD; larger indices are older blocks.
    let mut removed = 0u32;
    for (i, entry) in chain.iter().enumerate() {
        if i == 0 {
            continue; // Never delete HEAD.
        }

        let should_remove = reported_pos.is_some_and(|pos| i > pos)
            || max_blocks.is_some_and(|max| i >= max)
            || max_age_cutoff.is_some_and(|cutoff| entry.created < cutoff);

        if should_remove {
            log::info!("Truncating block '{:.7}...'", entry.hash);
            workspace.remove_block(&entry.hash)?;
            removed += 1;
        }
    }

    if removed > 0 {
        log::info!("Truncated {} block(s)", removed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockPayload;
    use crate::config::TruncateConfig;
    use crate::delta::{Delta, DeltaEntry, RowChange, TableDelta};
    use crate::state::State;
    use indexmap::IndexMap;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn config(truncate: Option<TruncateConfig>) -> Config {
        Config {
            work_dir: std::path::PathBuf::new(),
            tables: IndexMap::new(),
            compression: true,
            compression_level: 3,
            truncate,
        }
    }

    fn build_chain(ws: &ChainWorkspace, blocks: usize) -> Vec<HashValue> {
        let store = BlockStore::new(ws);
        let mut hashes = vec![store
            .commit(BlockPayload::State(State {
                tables: BTreeMap::new(),
            }))
            .unwrap()
            .unwrap()];
        for i in 1..blocks {
            let payload = BlockPayload::Delta(Delta {
                tables: vec![TableDelta {
                    table: "t".to_string(),
                    entries: vec![DeltaEntry {
                        key: vec![i.to_string()],
                        change: RowChange::Insert {
                            row: vec!["x".to_string()],
                        },
                    }],
                }],
            });
            hashes.push(store.commit(payload).unwrap().unwrap());
        }
        hashes
    }

    #[test]
    fn test_no_reported_retains_everything() {
        let temp = TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        let hashes = build_chain(&ws, 4);

        run(&config(None), &ws).unwrap();

        for hash in &hashes {
            assert!(ws.block_exists(hash), "block {} should be retained", hash);
        }
    }

    #[test]
    fn test_blocks_older_than_reported_are_removed() {
        let temp = TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        let hashes = build_chain(&ws, 4);
        ws.set_reported(&hashes[2]).unwrap();

        run(&config(None), &ws).unwrap();

        // hashes[0..2] are older than REPORTED; the rest stay.
        assert!(!ws.block_exists(&hashes[0]));
        assert!(!ws.block_exists(&hashes[1]));
        assert!(ws.block_exists(&hashes[2]));
        assert!(ws.block_exists(&hashes[3]));
    }

    #[test]
    fn test_head_survives_even_when_reported() {
        let temp = TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        let hashes = build_chain(&ws, 2);
        ws.set_reported(&hashes[1]).unwrap();

        run(&config(None), &ws).unwrap();
        assert!(ws.block_exists(&hashes[1]));
        assert!(!ws.block_exists(&hashes[0]));
    }

    #[test]
    fn test_max_blocks_bound() {
        let temp = TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        let hashes = build_chain(&ws, 5);

        let cfg = config(Some(TruncateConfig {
            max_blocks: Some(2),
            max_age_secs: None,
        }));
        run(&cfg, &ws).unwrap();

        assert!(ws.block_exists(&hashes[4]));
        assert!(ws.block_exists(&hashes[3]));
        assert!(!ws.block_exists(&hashes[2]));
        assert!(!ws.block_exists(&hashes[1]));
        assert!(!ws.block_exists(&hashes[0]));
    }

    #[test]
    fn test_max_age_bound_spares_recent_blocks() {
        let temp = TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        let hashes = build_chain(&ws, 3);

        let cfg = config(Some(TruncateConfig {
            max_blocks: None,
            max_age_secs: Some(3600),
        }));
        run(&cfg, &ws).unwrap();

        // All blocks were just created, none is past the age cutoff.
        for hash in &hashes {
            assert!(ws.block_exists(hash));
        }
    }

    #[test]
    fn test_orphan_blocks_are_swept() {
        let temp = TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        let hashes = build_chain(&ws, 2);

        let orphan = "b".repeat(64);
        ws.write_block(&orphan, b"{}").unwrap();

        run(&config(None), &ws).unwrap();

        assert!(!ws.block_exists(&orphan));
        for hash in &hashes {
            assert!(ws.block_exists(hash));
        }
    }

    #[test]
    fn test_second_run_stops_at_previous_cut() {
        let temp = TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        let hashes = build_chain(&ws, 4);
        ws.set_reported(&hashes[3]).unwrap();

        run(&config(None), &ws).unwrap();
        // Chain now cut below HEAD; a second run must not fail.
        run(&config(None), &ws).unwrap();
        assert!(ws.block_exists(&hashes[3]));
    }
}
