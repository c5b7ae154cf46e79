//! DeepZoom CLI - Command-line interface
//!
//! Thin front end over the deepzoom library: plan a viewport, fetch its
//! tiles from a URL template, and manage the configuration file.

mod commands;
mod error;
mod template;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use commands::plan::PlanArgs;

#[derive(Parser)]
#[command(name = "deepzoom")]
#[command(version, about = "Tile acquisition and caching for deep-zoom viewers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the tiles a viewport needs and report telemetry
    Fetch(FetchArgs),

    /// Show the levels and tiles a viewport would request
    Plan(PlanArgs),

    /// Manage ~/.deepzoom/config.ini
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
