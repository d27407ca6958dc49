//! CSV snapshot reading

use crate::config::TableConfig;
use crate::error::{Result, TabchainError};
use crate::state::Table;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Read one CSV source into a `Table`.
///
/// Rows are split into primary-key and subsidiary values per the table
/// config; a duplicate primary key within the snapshot is a hard error,
/// since it would make the diff ambiguous.
pub fn read_table(work_dir: &Path, name: &str, config: &TableConfig) -> Result<Table> {
    let path = work_dir.join(&config.source);
    let file = File::open(&path).map_err(|e| {
        TabchainError::source_read(format!(
            "table '{}': failed to open '{}': {}",
            name,
            path.display(),
            e
        ))
    })?;
    let reader = csv::ReaderBuilder::new()
        .has_headers(config.header)
        .from_reader(file);

    log::debug!("Parsing CSV source '{}'", path.display());
    let table = parse_csv(name, config, reader)?;
    log::info!("Loaded table '{}' with {} rows", name, table.rows.len());
    Ok(table)
}

fn parse_csv(name: &str, config: &TableConfig, reader: csv::Reader<File>) -> Result<Table> {
    let field_names = config.field_names();
    let primary_key = config.primary_key();

    let primary_indices: Vec<usize> = primary_key
        .iter()
        .filter_map(|pk| field_names.iter().position(|f| f == pk))
        .collect();
    let subsidiary_indices: Vec<usize> = (0..field_names.len())
        .filter(|i| !primary_indices.contains(i))
        .collect();

    // Order fields with primary-key columns first, then subsidiary columns,
    // matching the key/value split of the row map.
    let fields: Vec<String> = primary_indices
        .iter()
        .chain(subsidiary_indices.iter())
        .map(|&i| field_names[i].to_string())
        .collect();

    let mut rows = BTreeMap::new();

    for (line, record) in reader.into_records().enumerate() {
        let record = record.map_err(|e| {
            TabchainError::source_read(format!("table '{}': malformed CSV: {}", name, e))
        })?;

        if record.len() != field_names.len() {
            return Err(TabchainError::source_read(format!(
                "table '{}', row {}: expected {} columns, got {}",
                name,
                line + 1,
                field_names.len(),
                record.len()
            )));
        }

        let key: Vec<String> = primary_indices
            .iter()
            .filter_map(|&i| record.get(i).map(String::from))
            .collect();
        let value: Vec<String> = subsidiary_indices
            .iter()
            .filter_map(|&i| record.get(i).map(String::from))
            .collect();

        if rows.insert(key.clone(), value).is_some() {
            return Err(TabchainError::source_read(format!(
                "table '{}': duplicate primary key {:?}",
                name, key
            )));
        }
    }

    Ok(Table { fields, rows })
}
