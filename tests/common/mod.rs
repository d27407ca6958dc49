//! Common test utilities and helpers

use std::fs;
use std::path::Path;
use tabchain::{Engine, Result};
use tempfile::TempDir;

/// Test fixture managing a temporary working directory with a single
/// configured table backed by `items.csv`.
pub struct TestFixture {
    pub temp_dir: TempDir,
}

impl TestFixture {
    /// Create a working directory with a default config and initial rows.
    pub fn new(rows: &[(&str, &str, &str)]) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        fs::write(
            temp_dir.path().join("config.json"),
            r#"{
                "tables": {
                    "items": {
                        "source": "items.csv",
                        "fields": [
                            {"name": "id", "type": "INTEGER", "primary-key": true},
                            {"name": "name"},
                            {"name": "price", "type": "FLOAT"}
                        ]
                    }
                },
                "compression": true
            }"#,
        )?;
        let fixture = Self { temp_dir };
        fixture.write_rows(rows)?;
        Ok(fixture)
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Overwrite the CSV source with the given rows.
    pub fn write_rows(&self, rows: &[(&str, &str, &str)]) -> Result<()> {
        let mut content = String::from("id,name,price\n");
        for (id, name, price) in rows {
            content.push_str(&format!("{},{},{}\n", id, name, price));
        }
        fs::write(self.root().join("items.csv"), content)?;
        Ok(())
    }

    /// Replace the configuration wholesale.
    pub fn write_config(&self, json: &str) -> Result<()> {
        fs::write(self.root().join("config.json"), json)?;
        Ok(())
    }

    /// Open a fresh engine over the fixture directory.
    pub fn engine(&self) -> Result<Engine> {
        Engine::open(self.root())
    }
}
