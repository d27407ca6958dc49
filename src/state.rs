//! Materialized table state: the engine's view of the downstream database

use crate::config::Config;
use crate::error::Result;
use crate::snapshot;
use crate::workspace::{ChainWorkspace, STATE_FILE};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Composite primary-key value of one row.
pub type RowKey = Vec<String>;
/// Subsidiary (non-key) column values of one row.
pub type RowValue = Vec<String>;

/// One tracked table: column names plus rows keyed by primary key.
///
/// Fields are ordered primary-key columns first, then subsidiary columns,
/// matching the key/value split of `rows`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TableRepr", into = "TableRepr")]
pub struct Table {
    pub fields: Vec<String>,
    pub rows: BTreeMap<RowKey, RowValue>,
}

/// Serialized form of a table: rows as an ordered list, since JSON maps
/// cannot carry composite keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableRepr {
    fields: Vec<String>,
    rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableRow {
    key: RowKey,
    value: RowValue,
}

impl From<TableRepr> for Table {
    fn from(repr: TableRepr) -> Self {
        let rows = repr
            .rows
            .into_iter()
            .map(|row| (row.key, row.value))
            .collect();
        Table {
            fields: repr.fields,
            rows,
        }
    }
}

impl From<Table> for TableRepr {
    fn from(table: Table) -> Self {
        let rows = table
            .rows
            .into_iter()
            .map(|(key, value)| TableRow { key, value })
            .collect();
        TableRepr {
            fields: table.fields,
            rows,
        }
    }
}

/// Snapshot of all tracked tables at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub tables: BTreeMap<String, Table>,
}

impl State {
    /// Load the last committed state, or `None` before the first commit.
    pub fn load(workspace: &ChainWorkspace) -> Result<Option<Self>> {
        let Some(data) = workspace.load(STATE_FILE)? else {
            log::info!("No previous state found");
            return Ok(None);
        };
        let state: State = serde_json::from_slice(&data)?;
        log::info!("Loaded previous state with {} tables", state.tables.len());
        Ok(Some(state))
    }

    /// Read every configured CSV source into a fresh state.
    pub fn read_sources(config: &Config) -> Result<Self> {
        let entries: Vec<_> = config.tables.iter().collect();
        let tables = entries
            .par_iter()
            .map(|(name, table_config)| {
                let table = snapshot::read_table(&config.work_dir, name, table_config)?;
                Ok((name.to_string(), table))
            })
            .collect::<Result<BTreeMap<String, Table>>>()?;

        let state = State { tables };
        log::info!("Read current state from {} tables", state.tables.len());
        Ok(state)
    }

    /// Persist as the STATE artifact.
    pub fn save(&self, workspace: &ChainWorkspace) -> Result<()> {
        let data = serde_json::to_vec(self)?;
        workspace.store(STATE_FILE, &data)?;
        log::info!("Updated previous state ({} tables)", self.tables.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn table(fields: &[&str], rows: &[(&[&str], &[&str])]) -> Table {
        Table {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|(k, v)| {
                    (
                        k.iter().map(|s| s.to_string()).collect(),
                        v.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "t".to_string(),
            table(&["id", "val"], &[(&["1"], &["a"]), (&["2"], &["b"])]),
        );
        let state = State { tables };

        let json = serde_json::to_vec(&state).unwrap();
        let decoded: State = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_state_encoding_is_deterministic() {
        let build = || {
            let mut tables = BTreeMap::new();
            tables.insert(
                "b".to_string(),
                table(&["id", "x"], &[(&["2"], &["y"]), (&["1"], &["z"])]),
            );
            tables.insert("a".to_string(), table(&["id"], &[(&["9"], &[])]));
            State { tables }
        };
        let first = serde_json::to_vec(&build()).unwrap();
        let second = serde_json::to_vec(&build()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_absent_state() {
        let temp = tempfile::TempDir::new().unwrap();
        let ws = ChainWorkspace::new(temp.path());
        assert!(State::load(&ws).unwrap().is_none());
    }
}
