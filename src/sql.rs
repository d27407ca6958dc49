//! Translation of decoded patches into transactional SQL

use crate::config::Config;
use crate::delta::{RowChange, TableDelta};
use crate::error::{Result, TabchainError};
use crate::patch::{Patch, PatchPayload};
use crate::state::{State, Table};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;

/// SQL type mapping for rendering CSV values as SQL literals.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlType {
    Text,
    Integer,
    Float,
    Boolean,
    Binary,
    Date(String),
    Time(String),
    DateTime(String),
}

impl SqlType {
    pub fn from_config(type_str: &str, format: Option<&str>) -> std::result::Result<Self, String> {
        match type_str.to_uppercase().as_str() {
            "TEXT" => Ok(SqlType::Text),
            "INTEGER" => Ok(SqlType::Integer),
            "FLOAT" => Ok(SqlType::Float),
            "BOOLEAN" => Ok(SqlType::Boolean),
            "BINARY" => Ok(SqlType::Binary),
            "DATE" => Ok(SqlType::Date(format.unwrap_or("%Y-%m-%d").to_string())),
            "TIME" => Ok(SqlType::Time(format.unwrap_or("%H:%M:%S").to_string())),
            "DATETIME" => Ok(SqlType::DateTime(
                format.unwrap_or("%Y-%m-%d %H:%M:%S").to_string(),
            )),
            other => Err(format!(
                "unknown field type '{}'; valid types are: TEXT, INTEGER, FLOAT, BOOLEAN, BINARY, DATE, TIME, DATETIME",
                other
            )),
        }
    }
}

/// Schema for one table, resolved from config: fields ordered primary
/// key first, each with its SQL type.
struct TableSchema {
    table_name: String,
    fields: Vec<(String, SqlType)>,
    /// The first `num_pk` entries of `fields` are the primary key.
    num_pk: usize,
}

impl TableSchema {
    fn resolve(config: &Config, table_name: &str) -> Result<Self> {
        let tc = config.tables.get(table_name).ok_or_else(|| {
            TabchainError::sql(format!("table '{}' not found in config", table_name))
        })?;

        let pk = tc.primary_key();
        let pk_set: HashSet<&str> = pk.iter().copied().collect();

        let mut fields = Vec::new();
        for name in &pk {
            fields.push(resolve_field(tc, name)?);
        }
        for field in &tc.fields {
            if !pk_set.contains(field.name.as_str()) {
                fields.push(resolve_field(tc, &field.name)?);
            }
        }

        Ok(TableSchema {
            table_name: table_name.to_string(),
            num_pk: pk.len(),
            fields,
        })
    }

    fn pk_types(&self) -> &[(String, SqlType)] {
        &self.fields[..self.num_pk]
    }

    fn sub_types(&self) -> &[(String, SqlType)] {
        &self.fields[self.num_pk..]
    }
}

fn resolve_field(tc: &crate::config::TableConfig, name: &str) -> Result<(String, SqlType)> {
    let field = tc
        .fields
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| TabchainError::sql(format!("field '{}' not found in config", name)))?;
    let sql_type = SqlType::from_config(&field.field_type, field.format.as_deref())
        .map_err(|e| TabchainError::sql(format!("field '{}': {}", name, e)))?;
    Ok((name.to_string(), sql_type))
}

/// Double-quote a SQL identifier, escaping embedded double quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as a SQL literal based on its type.
pub fn quote_literal(s: &str, sql_type: &SqlType) -> Result<String> {
    match sql_type {
        SqlType::Text => Ok(format!("'{}'", s.replace('\'', "''"))),
        SqlType::Integer => {
            s.parse::<i64>()
                .map_err(|_| TabchainError::sql(format!("invalid integer value: '{}'", s)))?;
            Ok(s.to_string())
        }
        SqlType::Float => {
            s.parse::<f64>()
                .map_err(|_| TabchainError::sql(format!("invalid float value: '{}'", s)))?;
            Ok(s.to_string())
        }
        SqlType::Boolean => match s.to_lowercase().as_str() {
            "true" | "1" | "t" | "yes" => Ok("TRUE".to_string()),
            "false" | "0" | "f" | "no" => Ok("FALSE".to_string()),
            _ => Err(TabchainError::sql(format!("invalid boolean value: '{}'", s))),
        },
        SqlType::Binary => {
            if s.len() % 2 != 0 {
                return Err(TabchainError::sql(format!(
                    "invalid hex: odd length ({})",
                    s.len()
                )));
            }
            if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(TabchainError::sql("invalid hex: contains non-hex characters"));
            }
            Ok(format!("'\\x{}'", s))
        }
        SqlType::Date(fmt) => {
            NaiveDate::parse_from_str(s, fmt).map_err(|e| {
                TabchainError::sql(format!("invalid date '{}' for format '{}': {}", s, fmt, e))
            })?;
            Ok(format!("'{}'", s.replace('\'', "''")))
        }
        SqlType::Time(fmt) => {
            NaiveTime::parse_from_str(s, fmt).map_err(|e| {
                TabchainError::sql(format!("invalid time '{}' for format '{}': {}", s, fmt, e))
            })?;
            Ok(format!("'{}'", s.replace('\'', "''")))
        }
        SqlType::DateTime(fmt) => {
            if NaiveDateTime::parse_from_str(s, fmt).is_ok() {
                return Ok(format!("'{}'", s.replace('\'', "''")));
            }
            if let Ok(epoch) = s.parse::<i64>() {
                if DateTime::from_timestamp(epoch, 0).is_some() {
                    return Ok(format!("'{}'", s.replace('\'', "''")));
                }
            }
            Err(TabchainError::sql(format!(
                "invalid datetime '{}' for format '{}': could not parse as datetime or unix epoch",
                s, fmt
            )))
        }
    }
}

/// Render key + value slices into SQL literals, in schema field order.
fn format_row(key: &[String], value: &[String], schema: &TableSchema) -> Result<Vec<String>> {
    let pk_types = schema.pk_types();
    let sub_types = schema.sub_types();

    if key.len() != pk_types.len() {
        return Err(TabchainError::sql(format!(
            "table '{}': PK field count mismatch: got {} values, expected {}",
            schema.table_name,
            key.len(),
            pk_types.len()
        )));
    }
    if value.len() != sub_types.len() {
        return Err(TabchainError::sql(format!(
            "table '{}': subsidiary field count mismatch: got {} values, expected {}",
            schema.table_name,
            value.len(),
            sub_types.len()
        )));
    }

    let mut literals = Vec::with_capacity(key.len() + value.len());
    for (val, (name, sql_type)) in key.iter().zip(pk_types).chain(value.iter().zip(sub_types)) {
        let lit = quote_literal(val, sql_type)
            .map_err(|e| TabchainError::sql(format!("field '{}': {}", name, e)))?;
        literals.push(lit);
    }
    Ok(literals)
}

/// WHERE clause over the primary key.
fn pk_predicate(key: &[String], schema: &TableSchema) -> Result<String> {
    let parts: Vec<String> = key
        .iter()
        .zip(schema.pk_types())
        .map(|(val, (name, sql_type))| {
            let lit = quote_literal(val, sql_type)
                .map_err(|e| TabchainError::sql(format!("field '{}': {}", name, e)))?;
            Ok(format!("{} = {}", quote_ident(name), lit))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(" AND "))
}

fn insert_statement(
    table: &str,
    columns: &str,
    key: &[String],
    value: &[String],
    schema: &TableSchema,
) -> Result<String> {
    let literals = format_row(key, value, schema)?;
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({});\n",
        table,
        columns,
        literals.join(", ")
    ))
}

fn column_list(schema: &TableSchema) -> String {
    schema
        .fields
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Statements for one table's delta, in entry (primary key) order.
fn delta_to_sql(config: &Config, delta: &TableDelta, out: &mut String) -> Result<()> {
    let schema = TableSchema::resolve(config, &delta.table)?;
    let table = quote_ident(&schema.table_name);
    let columns = column_list(&schema);

    for entry in &delta.entries {
        match &entry.change {
            RowChange::Delete { .. } => {
                out.push_str(&format!(
                    "DELETE FROM {} WHERE {};\n",
                    table,
                    pk_predicate(&entry.key, &schema)?
                ));
            }
            RowChange::Insert { row } => {
                out.push_str(&insert_statement(&table, &columns, &entry.key, row, &schema)?);
            }
            RowChange::Update { old, new } => {
                let sub_types = schema.sub_types();
                if old.len() != sub_types.len() || new.len() != sub_types.len() {
                    return Err(TabchainError::sql(format!(
                        "table '{}': update field count mismatch",
                        schema.table_name
                    )));
                }

                let set_parts: Vec<String> = sub_types
                    .iter()
                    .zip(old.iter().zip(new.iter()))
                    .filter(|(_, (o, n))| o != n)
                    .map(|((name, sql_type), (_, n))| {
                        let lit = quote_literal(n, sql_type)
                            .map_err(|e| TabchainError::sql(format!("field '{}': {}", name, e)))?;
                        Ok(format!("{} = {}", quote_ident(name), lit))
                    })
                    .collect::<Result<Vec<_>>>()?;

                if set_parts.is_empty() {
                    continue;
                }

                out.push_str(&format!(
                    "UPDATE {} SET {} WHERE {};\n",
                    table,
                    set_parts.join(", "),
                    pk_predicate(&entry.key, &schema)?
                ));
            }
        }
    }

    Ok(())
}

/// Statements for a full-state payload: TRUNCATE then one INSERT per row.
fn state_to_sql(config: &Config, state: &State, out: &mut String) -> Result<()> {
    for (table_name, table) in &state.tables {
        let schema = TableSchema::resolve(config, table_name)?;
        let quoted_table = quote_ident(table_name);

        out.push_str(&format!("TRUNCATE {};\n", quoted_table));
        append_table_inserts(table, &quoted_table, &schema, out)?;
    }
    Ok(())
}

fn append_table_inserts(
    table: &Table,
    quoted_table: &str,
    schema: &TableSchema,
    out: &mut String,
) -> Result<()> {
    if table.rows.is_empty() {
        return Ok(());
    }
    let columns = column_list(schema);
    for (key, value) in &table.rows {
        out.push_str(&insert_statement(quoted_table, &columns, key, value, schema)?);
    }
    Ok(())
}

/// Convert a decoded patch to SQL wrapped in BEGIN/COMMIT.
///
/// Returns `None` when the patch carries no actionable changes.
pub fn patch_to_sql(config: &Config, patch: &Patch) -> Result<Option<String>> {
    log::info!("Converting {} to SQL", patch);

    match &patch.payload {
        Some(PatchPayload::Delta(delta)) => {
            let mut sql = String::from("BEGIN;\n");
            for table_delta in &delta.tables {
                delta_to_sql(config, table_delta, &mut sql)?;
            }
            sql.push_str("COMMIT;\n");
            Ok(Some(sql))
        }
        Some(PatchPayload::State(state)) => {
            let mut sql = String::from("BEGIN;\n");
            state_to_sql(config, state, &mut sql)?;
            sql.push_str("COMMIT;\n");
            Ok(Some(sql))
        }
        None => {
            log::info!("Patch has no payload, nothing to convert");
            Ok(None)
        }
    }
}
