//! Working-directory layout and crash-safe artifact persistence

use crate::error::{Result, TabchainError};
use crate::hash::{self, GENESIS_HASH, HashValue};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File holding the hash of the newest block.
pub const HEAD_FILE: &str = "HEAD";
/// File holding the last materialized table state.
pub const STATE_FILE: &str = "STATE";
/// File holding the newest hash acknowledged by the downstream consumer.
pub const REPORTED_FILE: &str = "REPORTED";
/// File the CLI writes encoded patches to.
pub const PATCH_FILE: &str = "PATCH";
/// Subdirectory holding content-addressed block files.
pub const BLOCKS_DIR: &str = "blocks";

/// Manages the tabchain working directory.
#[derive(Debug, Clone)]
pub struct ChainWorkspace {
    /// The working directory (where config.json lives).
    pub work_dir: PathBuf,
    /// blocks/ directory path.
    pub blocks_dir: PathBuf,
}

impl ChainWorkspace {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            blocks_dir: work_dir.join(BLOCKS_DIR),
        }
    }

    /// Create the working directory layout if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.blocks_dir)?;
        Ok(())
    }

    /// Write an artifact atomically: write a temp sibling, then rename it
    /// into place so a crash mid-write never exposes a partial file.
    pub fn store(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.work_dir.join(name);
        atomic_write(&path, data)?;
        log::debug!("Stored {} bytes to '{}'", data.len(), path.display());
        Ok(())
    }

    /// Load an artifact, or `None` if it does not exist yet.
    pub fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.work_dir.join(name);
        if !path.exists() {
            log::debug!("File '{}' does not exist", path.display());
            return Ok(None);
        }
        let data = fs::read(&path)?;
        log::debug!("Loaded {} bytes from '{}'", data.len(), path.display());
        Ok(Some(data))
    }

    /// Current HEAD hash; the genesis sentinel if the chain is empty.
    pub fn head(&self) -> Result<HashValue> {
        let hash = match self.load(HEAD_FILE)? {
            Some(data) => String::from_utf8(data)
                .map_err(|e| TabchainError::decode(format!("HEAD is not valid UTF-8: {}", e)))?
                .trim()
                .to_string(),
            None => GENESIS_HASH.to_string(),
        };
        log::debug!("Current head is '{:.7}...'", hash);
        Ok(hash)
    }

    pub fn set_head(&self, hash: &str) -> Result<()> {
        self.store(HEAD_FILE, hash.as_bytes())?;
        log::info!("Updated head to '{:.7}...'", hash);
        Ok(())
    }

    /// Last acknowledged hash, absent until the first successful report.
    pub fn reported(&self) -> Result<Option<HashValue>> {
        match self.load(REPORTED_FILE)? {
            Some(data) => {
                let hash = String::from_utf8(data)
                    .map_err(|e| {
                        TabchainError::decode(format!("REPORTED is not valid UTF-8: {}", e))
                    })?
                    .trim()
                    .to_string();
                log::debug!("Reported hash is '{:.7}...'", hash);
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    pub fn set_reported(&self, hash: &str) -> Result<()> {
        self.store(REPORTED_FILE, hash.as_bytes())?;
        log::info!("Updated reported to '{:.7}...'", hash);
        Ok(())
    }

    pub fn block_path(&self, hash: &str) -> PathBuf {
        self.blocks_dir.join(hash)
    }

    pub fn write_block(&self, hash: &str, data: &[u8]) -> Result<()> {
        self.ensure_dirs()?;
        atomic_write(&self.block_path(hash), data)?;
        log::debug!("Wrote block '{:.7}...' ({} bytes)", hash, data.len());
        Ok(())
    }

    pub fn read_block(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.block_path(hash);
        if !path.exists() {
            return Err(TabchainError::block_not_found(hash));
        }
        Ok(fs::read(&path)?)
    }

    pub fn remove_block(&self, hash: &str) -> Result<()> {
        fs::remove_file(self.block_path(hash))?;
        Ok(())
    }

    pub fn block_exists(&self, hash: &str) -> bool {
        self.block_path(hash).exists()
    }

    /// Hashes of every block file on disk, unordered.
    pub fn block_hashes_on_disk(&self) -> Result<Vec<HashValue>> {
        let mut hashes = Vec::new();
        if !self.blocks_dir.exists() {
            return Ok(hashes);
        }
        for entry in WalkDir::new(&self.blocks_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                TabchainError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
                }))
            })?;
            if let Some(name) = entry.file_name().to_str() {
                if hash::is_hash(name) {
                    hashes.push(name.to_string());
                }
            }
        }
        Ok(hashes)
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
