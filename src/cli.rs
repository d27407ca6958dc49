//! Command-line interface for tabchain

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tabchain")]
#[command(about = "Change-data-capture over CSV snapshots")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Working directory holding config.json and the chain
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scaffold a working directory with a sample configuration
    Init {
        /// Overwrite an existing config.json
        #[arg(long)]
        force: bool,
    },

    /// Read the CSV sources and commit a block if anything changed
    Commit,

    /// List the chain from HEAD down
    Log {
        /// Limit how many blocks to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show one block in detail
    Show {
        /// Block hash (a unique prefix is enough), defaults to HEAD
        block: Option<String>,
    },

    /// Work with encoded patch files
    Patch {
        #[command(subcommand)]
        command: PatchCommands,
    },
}

#[derive(Subcommand)]
pub enum PatchCommands {
    /// Build a patch from the last reported block (or a given one) to HEAD
    Create {
        /// Build from this block instead of the REPORTED pointer
        #[arg(long)]
        from: Option<String>,

        /// Write the patch here instead of the default patch file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a patch file and print its summary
    Show {
        /// Patch file to read, defaults to the working directory's patch file
        file: Option<PathBuf>,
    },

    /// Translate a patch file to SQL on stdout
    Sql {
        /// Patch file to read, defaults to the working directory's patch file
        file: Option<PathBuf>,
    },

    /// Acknowledge a patch file as handed downstream
    Applied {
        /// Patch file to read, defaults to the working directory's patch file
        file: Option<PathBuf>,

        /// Advance the REPORTED pointer, unlocking truncation
        #[arg(long)]
        reported: bool,
    },
}
