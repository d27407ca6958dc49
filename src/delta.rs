//! Row-level deltas between two table states, and the merge algebra
//! used when collapsing a range of blocks into one patch

use crate::state::{RowKey, RowValue, State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Net change for one primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RowChange {
    Insert { row: RowValue },
    Update { old: RowValue, new: RowValue },
    Delete { old: RowValue },
}

/// One (primary key, change) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub key: RowKey,
    pub change: RowChange,
}

/// All changes for one table, sorted by primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDelta {
    pub table: String,
    pub entries: Vec<DeltaEntry>,
}

/// Changes across all tables, sorted by table name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub tables: Vec<TableDelta>,
}

impl Delta {
    /// Diff two states into a delta.
    ///
    /// Entries come out sorted by table name and primary key, so the same
    /// pair of states always produces a byte-identical encoding.
    pub fn compute(previous: &State, current: &State) -> Delta {
        let mut tables = Vec::new();

        for (name, curr_table) in &current.tables {
            let mut entries = Vec::new();

            match previous.tables.get(name) {
                Some(prev_table) => {
                    for (key, value) in &curr_table.rows {
                        match prev_table.rows.get(key) {
                            None => entries.push(DeltaEntry {
                                key: key.clone(),
                                change: RowChange::Insert { row: value.clone() },
                            }),
                            Some(prev_value) if prev_value != value => {
                                entries.push(DeltaEntry {
                                    key: key.clone(),
                                    change: RowChange::Update {
                                        old: prev_value.clone(),
                                        new: value.clone(),
                                    },
                                })
                            }
                            Some(_) => {}
                        }
                    }
                    for (key, prev_value) in &prev_table.rows {
                        if !curr_table.rows.contains_key(key) {
                            entries.push(DeltaEntry {
                                key: key.clone(),
                                change: RowChange::Delete {
                                    old: prev_value.clone(),
                                },
                            });
                        }
                    }
                }
                None => {
                    // Newly tracked table: every row is an insert.
                    for (key, value) in &curr_table.rows {
                        entries.push(DeltaEntry {
                            key: key.clone(),
                            change: RowChange::Insert { row: value.clone() },
                        });
                    }
                }
            }

            entries.sort_by(|a, b| a.key.cmp(&b.key));
            if !entries.is_empty() {
                tables.push(TableDelta {
                    table: name.clone(),
                    entries,
                });
            }
        }

        // Tables dropped from the config: every remembered row is a delete.
        for (name, prev_table) in &previous.tables {
            if !current.tables.contains_key(name) {
                let entries = prev_table
                    .rows
                    .iter()
                    .map(|(key, value)| DeltaEntry {
                        key: key.clone(),
                        change: RowChange::Delete { old: value.clone() },
                    })
                    .collect();
                tables.push(TableDelta {
                    table: name.clone(),
                    entries,
                });
            }
        }

        tables.sort_by(|a, b| a.table.cmp(&b.table));
        Delta { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.entries.is_empty())
    }

    /// Fold a chronologically newer delta into this one, per table and
    /// per primary key.
    pub fn merge(self, newer: Delta) -> Delta {
        let mut merged: BTreeMap<String, BTreeMap<RowKey, RowChange>> = self
            .tables
            .into_iter()
            .map(|t| (t.table, entries_to_map(t.entries)))
            .collect();

        for newer_table in newer.tables {
            let table_map = merged.entry(newer_table.table).or_default();
            for entry in newer_table.entries {
                apply_change(table_map, entry.key, entry.change);
            }
        }

        let tables = merged
            .into_iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(table, entries)| TableDelta {
                table,
                entries: map_to_entries(entries),
            })
            .collect();
        Delta { tables }
    }
}

fn entries_to_map(entries: Vec<DeltaEntry>) -> BTreeMap<RowKey, RowChange> {
    entries.into_iter().map(|e| (e.key, e.change)).collect()
}

fn map_to_entries(map: BTreeMap<RowKey, RowChange>) -> Vec<DeltaEntry> {
    map.into_iter()
        .map(|(key, change)| DeltaEntry { key, change })
        .collect()
}

/// Merge one newer change on top of whatever the map already holds for
/// the key. The net result reflects what the consumer, who has seen
/// neither change, would observe.
fn apply_change(map: &mut BTreeMap<RowKey, RowChange>, key: RowKey, newer: RowChange) {
    use RowChange::*;

    let merged = match (map.remove(&key), newer) {
        (None, newer) => Some(newer),

        // The row appeared and then changed: still a fresh insert.
        (Some(Insert { .. }), Update { new, .. }) => Some(Insert { row: new }),
        // The row appeared and then disappeared: never existed downstream.
        (Some(Insert { .. }), Delete { .. }) => None,

        (Some(Update { old, .. }), Update { new, .. }) => {
            if old == new {
                None
            } else {
                Some(Update { old, new })
            }
        }
        (Some(Update { old, .. }), Delete { .. }) => Some(Delete { old }),

        // Delete followed by re-insert nets to an update from the
        // pre-delete row, or cancels when the row came back unchanged.
        (Some(Delete { old }), Insert { row }) => {
            if old == row {
                None
            } else {
                Some(Update { old, new: row })
            }
        }

        // Remaining pairs cannot arise from well-formed consecutive
        // diffs; keep the newer change so the stream stays applicable.
        (Some(older), newer) => {
            log::warn!(
                "Unexpected change sequence for key {:?}: {:?} then {:?}",
                key,
                older,
                newer
            );
            Some(newer)
        }
    };

    if let Some(change) = merged {
        map.insert(key, change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Table;

    fn state(rows: &[(&str, &str)]) -> State {
        let table = Table {
            fields: vec!["id".to_string(), "val".to_string()],
            rows: rows
                .iter()
                .map(|(k, v)| (vec![k.to_string()], vec![v.to_string()]))
                .collect(),
        };
        let mut tables = std::collections::BTreeMap::new();
        tables.insert("t".to_string(), table);
        State { tables }
    }

    fn key(k: &str) -> RowKey {
        vec![k.to_string()]
    }

    fn find<'a>(delta: &'a Delta, k: &str) -> Option<&'a RowChange> {
        delta.tables.iter().flat_map(|t| &t.entries).find_map(|e| {
            if e.key == key(k) {
                Some(&e.change)
            } else {
                None
            }
        })
    }

    #[test]
    fn test_compute_insert_update_delete() {
        let previous = state(&[("1", "a"), ("2", "b")]);
        let current = state(&[("1", "a"), ("2", "c"), ("3", "d")]);

        let delta = Delta::compute(&previous, &current);
        assert_eq!(delta.tables.len(), 1);
        assert_eq!(delta.tables[0].entries.len(), 2);
        assert_eq!(
            find(&delta, "2"),
            Some(&RowChange::Update {
                old: vec!["b".to_string()],
                new: vec!["c".to_string()],
            })
        );
        assert_eq!(
            find(&delta, "3"),
            Some(&RowChange::Insert {
                row: vec!["d".to_string()],
            })
        );

        let reverse = Delta::compute(&current, &previous);
        assert_eq!(
            find(&reverse, "3"),
            Some(&RowChange::Delete {
                old: vec!["d".to_string()],
            })
        );
    }

    #[test]
    fn test_compute_identical_states_is_empty() {
        let a = state(&[("1", "a")]);
        let delta = Delta::compute(&a, &a.clone());
        assert!(delta.is_empty());
    }

    #[test]
    fn test_compute_is_deterministic() {
        let previous = state(&[("3", "x"), ("1", "y")]);
        let current = state(&[("2", "n"), ("1", "z")]);

        let first = serde_json::to_vec(&Delta::compute(&previous, &current)).unwrap();
        let second = serde_json::to_vec(&Delta::compute(&previous, &current)).unwrap();
        assert_eq!(first, second);

        // Entries sorted by key.
        let delta = Delta::compute(&previous, &current);
        let keys: Vec<_> = delta.tables[0].entries.iter().map(|e| &e.key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    fn single(change: RowChange) -> Delta {
        Delta {
            tables: vec![TableDelta {
                table: "t".to_string(),
                entries: vec![DeltaEntry {
                    key: key("1"),
                    change,
                }],
            }],
        }
    }

    #[test]
    fn test_merge_insert_then_update_is_insert() {
        let older = single(RowChange::Insert {
            row: vec!["a".to_string()],
        });
        let newer = single(RowChange::Update {
            old: vec!["a".to_string()],
            new: vec!["b".to_string()],
        });
        let merged = older.merge(newer);
        assert_eq!(
            find(&merged, "1"),
            Some(&RowChange::Insert {
                row: vec!["b".to_string()],
            })
        );
    }

    #[test]
    fn test_merge_insert_then_delete_cancels() {
        let older = single(RowChange::Insert {
            row: vec!["a".to_string()],
        });
        let newer = single(RowChange::Delete {
            old: vec!["a".to_string()],
        });
        assert!(older.merge(newer).is_empty());
    }

    #[test]
    fn test_merge_update_then_update_collapses() {
        let older = single(RowChange::Update {
            old: vec!["a".to_string()],
            new: vec!["b".to_string()],
        });
        let newer = single(RowChange::Update {
            old: vec!["b".to_string()],
            new: vec!["c".to_string()],
        });
        let merged = older.merge(newer);
        assert_eq!(
            find(&merged, "1"),
            Some(&RowChange::Update {
                old: vec!["a".to_string()],
                new: vec!["c".to_string()],
            })
        );
    }

    #[test]
    fn test_merge_update_then_reverting_update_cancels() {
        let older = single(RowChange::Update {
            old: vec!["a".to_string()],
            new: vec!["b".to_string()],
        });
        let newer = single(RowChange::Update {
            old: vec!["b".to_string()],
            new: vec!["a".to_string()],
        });
        assert!(older.merge(newer).is_empty());
    }

    #[test]
    fn test_merge_update_then_delete_is_delete_of_original() {
        let older = single(RowChange::Update {
            old: vec!["a".to_string()],
            new: vec!["b".to_string()],
        });
        let newer = single(RowChange::Delete {
            old: vec!["b".to_string()],
        });
        let merged = older.merge(newer);
        assert_eq!(
            find(&merged, "1"),
            Some(&RowChange::Delete {
                old: vec!["a".to_string()],
            })
        );
    }

    #[test]
    fn test_merge_delete_then_insert_is_update() {
        let older = single(RowChange::Delete {
            old: vec!["a".to_string()],
        });
        let newer = single(RowChange::Insert {
            row: vec!["b".to_string()],
        });
        let merged = older.merge(newer);
        assert_eq!(
            find(&merged, "1"),
            Some(&RowChange::Update {
                old: vec!["a".to_string()],
                new: vec!["b".to_string()],
            })
        );
    }

    #[test]
    fn test_merge_delete_then_identical_insert_cancels() {
        let older = single(RowChange::Delete {
            old: vec!["a".to_string()],
        });
        let newer = single(RowChange::Insert {
            row: vec!["a".to_string()],
        });
        assert!(older.merge(newer).is_empty());
    }

    #[test]
    fn test_merge_disjoint_tables() {
        let mut older = single(RowChange::Insert {
            row: vec!["a".to_string()],
        });
        older.tables[0].table = "x".to_string();
        let newer = single(RowChange::Insert {
            row: vec!["b".to_string()],
        });
        let merged = older.merge(newer);
        assert_eq!(merged.tables.len(), 2);
        assert_eq!(merged.tables[0].table, "t");
        assert_eq!(merged.tables[1].table, "x");
    }

    #[test]
    fn test_merge_is_associative_over_three_deltas() {
        let a = single(RowChange::Insert {
            row: vec!["1".to_string()],
        });
        let b = single(RowChange::Update {
            old: vec!["1".to_string()],
            new: vec!["2".to_string()],
        });
        let c = single(RowChange::Update {
            old: vec!["2".to_string()],
            new: vec!["3".to_string()],
        });

        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        assert_eq!(left, right);
    }
}
