//! Change-data-capture over CSV snapshots.
//!
//! Each run of the commit cycle reads the configured CSV sources, diffs
//! them against the last committed state, and appends a content-addressed
//! block to an append-only chain on disk. Downstream consumers pull
//! patches (merged diffs over a chain span), translate them to SQL, and
//! acknowledge what they applied so history behind them can be reclaimed.

pub mod block;
pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod hash;
pub mod patch;
pub mod snapshot;
pub mod sql;
pub mod state;
pub mod store;
pub mod truncate;
pub mod workspace;

/// Version tag carried by every encoded patch. Decoders reject buffers
/// produced by a different format generation.
pub const FORMAT_VERSION: u32 = 1;

pub use config::Config;
pub use engine::Engine;
pub use error::{Result, TabchainError};
pub use hash::{GENESIS_HASH, HashValue};
pub use patch::Patch;
