//! Command implementations for the tabchain CLI

use crate::cli::{Commands, PatchCommands};
use crate::codec;
use crate::engine::Engine;
use crate::error::{Result, TabchainError};
use crate::hash::GENESIS_HASH;
use crate::store::BlockStore;
use crate::workspace::PATCH_FILE;
use std::fs;
use std::path::{Path, PathBuf};

const SAMPLE_CONFIG: &str = r#"{
    "tables": {
        "employees": {
            "source": "employees.csv",
            "fields": [
                {"name": "id", "type": "INTEGER", "primary-key": true},
                {"name": "name"},
                {"name": "department"},
                {"name": "hired", "type": "DATE"}
            ]
        }
    },
    "compression": true,
    "truncate": {
        "max_blocks": 100
    }
}
"#;

const SAMPLE_CSV: &str = "id,name,department,hired\n\
    1,Alice,Engineering,2021-03-01\n\
    2,Bob,Sales,2022-07-15\n";

/// Execute a parsed command against the working directory.
pub fn execute_command(command: Commands, directory: Option<&Path>) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let work_dir = directory.unwrap_or(&current_dir);

    match command {
        Commands::Init { force } => init_command(work_dir, force),
        Commands::Commit => commit_command(work_dir),
        Commands::Log { limit } => log_command(work_dir, limit),
        Commands::Show { block } => show_command(work_dir, block.as_deref()),
        Commands::Patch { command } => match command {
            PatchCommands::Create { from, output } => {
                patch_create_command(work_dir, from.as_deref(), output.as_deref())
            }
            PatchCommands::Show { file } => patch_show_command(work_dir, file.as_deref()),
            PatchCommands::Sql { file } => patch_sql_command(work_dir, file.as_deref()),
            PatchCommands::Applied { file, reported } => {
                patch_applied_command(work_dir, file.as_deref(), reported)
            }
        },
    }
}

/// Scaffold a config and a sample CSV source so `commit` works right away.
fn init_command(work_dir: &Path, force: bool) -> Result<()> {
    fs::create_dir_all(work_dir)?;

    let config_path = work_dir.join(crate::config::CONFIG_FILE);
    if config_path.exists() && !force {
        return Err(TabchainError::config(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )));
    }
    fs::write(&config_path, SAMPLE_CONFIG)?;

    let csv_path = work_dir.join("employees.csv");
    if !csv_path.exists() {
        fs::write(&csv_path, SAMPLE_CSV)?;
    }

    println!("Initialized tabchain working directory at {}", work_dir.display());
    println!("Edit {} and run `tabchain commit`", config_path.display());
    Ok(())
}

fn commit_command(work_dir: &Path) -> Result<()> {
    let engine = Engine::open(work_dir)?;
    match engine.create_block()? {
        Some(hash) => println!("Committed block {}", hash),
        None => println!("No changes, nothing committed"),
    }
    Ok(())
}

fn log_command(work_dir: &Path, limit: Option<usize>) -> Result<()> {
    let engine = Engine::open(work_dir)?;
    let store = BlockStore::new(&engine.workspace);

    let head = store.head_hash()?;
    if head == GENESIS_HASH {
        println!("Empty chain");
        return Ok(());
    }

    let reported = engine.workspace.reported()?;
    let limit = limit.unwrap_or(usize::MAX);

    for (i, item) in store.ancestors(&head).enumerate() {
        if i >= limit {
            break;
        }
        let (hash, block) = match item {
            Ok(entry) => entry,
            // Older history is reclaimed once acknowledged; the walk
            // simply ends where the chain does.
            Err(TabchainError::ChainBroken { .. }) => break,
            Err(e) => return Err(e),
        };

        let mut markers = Vec::new();
        if hash == head {
            markers.push("HEAD");
        }
        if reported.as_deref() == Some(hash.as_str()) {
            markers.push("REPORTED");
        }
        let marker = if markers.is_empty() {
            String::new()
        } else {
            format!(" ({})", markers.join(", "))
        };

        println!(
            "{}  {}  {}  [{}]{}",
            &hash[..12],
            block.created.format("%Y-%m-%d %H:%M:%S"),
            block.payload.kind_name(),
            block.table_names().join(", "),
            marker
        );
    }
    Ok(())
}

fn show_command(work_dir: &Path, block_ref: Option<&str>) -> Result<()> {
    let engine = Engine::open(work_dir)?;
    let store = BlockStore::new(&engine.workspace);

    let hash = match block_ref {
        Some(prefix) => store.resolve_prefix(prefix)?,
        None => store.head_hash()?,
    };
    if hash == GENESIS_HASH {
        println!("Empty chain");
        return Ok(());
    }

    let block = store.get(&hash)?;
    println!("block   {}", hash);
    println!("parent  {}", block.parent);
    println!("created {}", block.created.to_rfc3339());
    println!("kind    {}", block.payload.kind_name());
    println!();
    println!("{}", serde_json::to_string_pretty(&block.payload)?);
    Ok(())
}

fn patch_create_command(
    work_dir: &Path,
    from: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let engine = Engine::open(work_dir)?;

    let from = match from {
        Some(prefix) => {
            let store = BlockStore::new(&engine.workspace);
            Some(store.resolve_prefix(prefix)?)
        }
        None => None,
    };

    let data = engine.create_patch(from.as_deref())?;
    let path = patch_path(work_dir, output);
    fs::write(&path, &data)?;
    println!("Wrote {} byte patch to {}", data.len(), path.display());
    Ok(())
}

fn patch_show_command(work_dir: &Path, file: Option<&Path>) -> Result<()> {
    let data = fs::read(patch_path(work_dir, file))?;
    let patch = codec::decode_patch(&data)?;
    println!("{}", patch);
    Ok(())
}

fn patch_sql_command(work_dir: &Path, file: Option<&Path>) -> Result<()> {
    let engine = Engine::open(work_dir)?;
    let data = fs::read(patch_path(work_dir, file))?;
    match engine.patch_to_sql(&data)? {
        Some(sql) => print!("{}", sql),
        None => eprintln!("Patch carries no changes"),
    }
    Ok(())
}

fn patch_applied_command(work_dir: &Path, file: Option<&Path>, reported: bool) -> Result<()> {
    let engine = Engine::open(work_dir)?;
    let data = fs::read(patch_path(work_dir, file))?;
    let head = engine.patch_applied(data, reported)?;
    if reported {
        println!("Reported up to block {}", head);
    } else {
        println!("Patch head {}", head);
    }
    Ok(())
}

fn patch_path(work_dir: &Path, file: Option<&Path>) -> PathBuf {
    match file {
        Some(path) => path.to_path_buf(),
        None => work_dir.join(PATCH_FILE),
    }
}
