//! Error types for tabchain operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TabchainError>;

#[derive(Error, Debug)]
pub enum TabchainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Source read error: {message}")]
    SourceRead { message: String },

    #[error("Block not found: {hash}")]
    BlockNotFound { hash: String },

    #[error("Chain broken: block '{hash}' references missing parent '{parent}'")]
    ChainBroken { hash: String, parent: String },

    #[error("Ambiguous block reference '{prefix}' ({matches} matches)")]
    AmbiguousRef { prefix: String, matches: usize },

    #[error("Cannot build a patch: the chain is empty")]
    UnresolvableRange,

    #[error("Unsupported patch format version: {version}")]
    UnsupportedFormat { version: u32 },

    #[error("Patch decode error: {message}")]
    Decode { message: String },

    #[error("SQL translation error: {message}")]
    Sql { message: String },
}

impl TabchainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn source_read(msg: impl Into<String>) -> Self {
        Self::SourceRead {
            message: msg.into(),
        }
    }

    pub fn block_not_found(hash: impl Into<String>) -> Self {
        Self::BlockNotFound { hash: hash.into() }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn sql(msg: impl Into<String>) -> Self {
        Self::Sql {
            message: msg.into(),
        }
    }
}
