//! Working-directory configuration

use crate::error::{Result, TabchainError};
use crate::sql::SqlType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file inside the working directory.
pub const CONFIG_FILE: &str = "config.json";

/// Configuration for one tracked working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Working directory this config was loaded from.
    #[serde(skip)]
    pub work_dir: PathBuf,

    /// Tracked tables, in file order.
    pub tables: IndexMap<String, TableConfig>,

    /// Whether patch buffers are zstd-compressed.
    #[serde(default = "default_compression")]
    pub compression: bool,

    /// Zstd compression level for patch buffers.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Optional history bounds applied on top of the REPORTED rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate: Option<TruncateConfig>,
}

/// Configuration for a single tracked table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// CSV source path, relative to the working directory.
    pub source: String,

    /// Whether the CSV source carries a header row.
    #[serde(default = "default_header")]
    pub header: bool,

    /// Columns in CSV order.
    pub fields: Vec<FieldConfig>,
}

/// Configuration for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    /// SQL type name (TEXT, INTEGER, FLOAT, BOOLEAN, BINARY, DATE, TIME, DATETIME).
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,

    /// Optional chrono format string for date/time types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, rename = "primary-key")]
    pub primary_key: bool,
}

/// History bounds beyond the REPORTED pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateConfig {
    /// Maximum number of retained blocks, HEAD included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blocks: Option<u32>,

    /// Maximum block age in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,
}

fn default_compression() -> bool {
    true
}

fn default_compression_level() -> i32 {
    3
}

fn default_header() -> bool {
    true
}

fn default_field_type() -> String {
    "TEXT".to_string()
}

impl TableConfig {
    /// Names of the primary-key columns, in field order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// All column names, in field order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

impl Config {
    /// Load and validate `config.json` from a working directory.
    pub fn load(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join(CONFIG_FILE);
        log::debug!("Parsing config from '{}'", path.display());

        let content = fs::read_to_string(&path).map_err(|e| {
            TabchainError::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| TabchainError::config(format!("failed to parse config: {}", e)))?;
        config.work_dir = work_dir.to_path_buf();
        config.validate()?;

        log::info!("Initialized config with {} tables", config.tables.len());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(TabchainError::config("no tables configured"));
        }

        for (name, table) in &self.tables {
            if table.fields.is_empty() {
                return Err(TabchainError::config(format!(
                    "table '{}' has no fields",
                    name
                )));
            }
            if table.primary_key().is_empty() {
                return Err(TabchainError::config(format!(
                    "table '{}' has no primary key column",
                    name
                )));
            }

            let mut seen = std::collections::HashSet::new();
            for field in &table.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(TabchainError::config(format!(
                        "table '{}' declares field '{}' more than once",
                        name, field.name
                    )));
                }
                SqlType::from_config(&field.field_type, field.format.as_deref()).map_err(|e| {
                    TabchainError::config(format!("table '{}', field '{}': {}", name, field.name, e))
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        fs::write(dir.join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn test_load_minimal_config() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"{
                "tables": {
                    "t": {
                        "source": "t.csv",
                        "fields": [
                            {"name": "id", "type": "INTEGER", "primary-key": true},
                            {"name": "val"}
                        ]
                    }
                }
            }"#,
        );

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.tables.len(), 1);
        assert!(config.compression);
        assert_eq!(config.compression_level, 3);

        let table = &config.tables["t"];
        assert!(table.header);
        assert_eq!(table.primary_key(), vec!["id"]);
        assert_eq!(table.field_names(), vec!["id", "val"]);
        assert_eq!(table.fields[1].field_type, "TEXT");
    }

    #[test]
    fn test_missing_config_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(temp.path());
        assert!(matches!(result, Err(TabchainError::Config { .. })));
    }

    #[test]
    fn test_table_without_primary_key_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"{"tables": {"t": {"source": "t.csv", "fields": [{"name": "id"}]}}}"#,
        );
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn test_unknown_field_type_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"{
                "tables": {
                    "t": {
                        "source": "t.csv",
                        "fields": [{"name": "id", "type": "VARCHAR", "primary-key": true}]
                    }
                }
            }"#,
        );
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"{
                "tables": {
                    "t": {
                        "source": "t.csv",
                        "fields": [
                            {"name": "id", "primary-key": true},
                            {"name": "id"}
                        ]
                    }
                }
            }"#,
        );
        assert!(Config::load(temp.path()).is_err());
    }
}
