//! Main entry point for the tabchain CLI

use clap::Parser;
use tabchain::cli::Cli;
use tabchain::commands::execute_command;

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    if let Err(e) = execute_command(cli.command, cli.directory.as_deref()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
