//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show` and `config path`.

use clap::Subcommand;
use deepzoom::config::{config_file_path, format_size, ConfigFile};

use super::common::{load_config, log_directory};
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => run_init(force),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Path => run_path(),
    }
}

fn run_init(force: bool) -> Result<(), CliError> {
    let path = config_file_path();
    if path.exists() && !force {
        println!("Configuration already exists at {}", path.display());
        println!("Use --force to overwrite it with defaults.");
        return Ok(());
    }
    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn run_show() -> Result<(), CliError> {
    let config = load_config(None)?;
    for line in describe(&config) {
        println!("{}", line);
    }
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

/// Effective settings as printable lines, one section at a time.
fn describe(config: &ConfigFile) -> Vec<String> {
    let d = &config.download;
    let c = &config.cache;
    let mut lines = vec![
        "[download]".to_string(),
        format!("  max_concurrent         = {}", d.max_concurrent),
        format!("  timeout                = {}s", d.timeout_secs),
        format!("  retry_delay_ms         = {}", d.retry_delay_ms),
        format!("  max_attempts           = {}", d.max_attempts),
        format!("  cache_policy           = {}", d.cache_policy),
        format!("  user_agent             = {}", d.user_agent),
        String::new(),
        "[cache]".to_string(),
        format!("  max_size               = {}", format_size(c.max_cache_size)),
        format!("  min_tiles              = {}", c.min_tile_policy),
        format!(
            "  max_evictions_per_pass = {}",
            if c.max_evictions_per_pass == 0 {
                "unbounded".to_string()
            } else {
                c.max_evictions_per_pass.to_string()
            }
        ),
        format!("  storage                = {}", c.storage_enabled),
        format!("  storage_size           = {}", format_size(c.storage_size)),
        String::new(),
        "[auth]".to_string(),
    ];

    match &config.auth.username {
        Some(user) => lines.push(format!("  username               = {}", user)),
        None => lines.push("  username               = (not set)".to_string()),
    }
    lines.push(format!(
        "  password               = {}",
        if config.auth.password.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    ));

    lines.push(String::new());
    lines.push("[logging]".to_string());
    lines.push(match &config.logging.directory {
        Some(dir) => format!("  directory              = {}", dir.display()),
        None => format!(
            "  directory              = (console only; file logs would go to {})",
            log_directory(config).display()
        ),
    });
    lines.push(format!("  file                   = {}", config.logging.file));
    lines.push(format!("  level                  = {}", config.logging.level));
    lines
}
