//! Fetch command - download every primary-tier tile for one viewport.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use deepzoom::cache::{CacheStorage, MemoryCacheStorage};
use deepzoom::config::{format_size, ConfigFile, SourceConfig};
use deepzoom::dispatcher::DownloadDispatcher;
use deepzoom::provider::{HttpClient, ReqwestClient};
use deepzoom::scheduler::plan;
use deepzoom::{TileAddress, TileSource};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::common::{load_config, start_logging, ViewportArgs};
use crate::error::CliError;
use crate::template::TemplateProvider;

/// How often progress is re-counted when no tile arrives.
const PROGRESS_TICK: Duration = Duration::from_millis(250);

/// Arguments for the fetch command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Tile URL with {z}, {x} and {y} placeholders
    #[arg(long)]
    pub url_template: String,

    #[command(flatten)]
    pub viewport: ViewportArgs,

    /// Seconds to wait for the tiles
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Source name used in logs and storage keys
    #[arg(long, default_value = "template")]
    pub name: String,

    /// Config file to use instead of ~/.deepzoom/config.ini
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

enum Outcome {
    Complete,
    TimedOut,
    Interrupted,
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    args.viewport.validate()?;
    let config = load_config(args.config.as_deref())?;
    let _logging = start_logging(&config, args.verbose)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(fetch(args, config))
}

async fn fetch(args: FetchArgs, config: ConfigFile) -> Result<(), CliError> {
    let viewport = args.viewport.snapshot();
    let max_level = args.viewport.max_level;
    let level_plan = plan(&viewport, max_level)
        .ok_or_else(|| CliError::Config("the viewport shows no part of the image".to_string()))?;
    let wanted: Vec<TileAddress> = level_plan.primary_addresses().collect();

    let provider = TemplateProvider::new(&args.name, &args.url_template)?;
    let download = config.download_config();
    let dispatcher = DownloadDispatcher::start(&download);
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(&download)?);
    let storage: Arc<dyn CacheStorage> =
        Arc::new(MemoryCacheStorage::new(config.cache.storage_size));

    let mut source_config = SourceConfig::new(&args.name, max_level)
        .with_tile_size(args.viewport.tile_size, args.viewport.tile_size)
        .with_max_attempts(download.max_attempts())
        .with_cache_policy(download.cache_policy())
        .with_cache(config.tile_cache_config());
    if let Some(credential) = config.credential() {
        source_config = source_config.with_credential(credential);
    }

    let source = TileSource::start(
        provider,
        source_config,
        Arc::clone(&dispatcher),
        http,
        Some(storage),
    )?;

    println!("DeepZoom Fetch v{}", deepzoom::VERSION);
    println!("=====================");
    println!();
    println!("Template:   {}", args.url_template);
    println!(
        "Level:      {} ({} primary tiles)",
        level_plan.current_level,
        wanted.len()
    );
    println!(
        "Downloads:  {} concurrent, {}s timeout",
        download.max_concurrent_downloads(),
        download.timeout().as_secs()
    );
    println!("Cache:      {}", format_size(source.max_cache_bytes()));
    println!();

    let interrupted = CancellationToken::new();
    let on_signal = interrupted.clone();
    ctrlc::set_handler(move || on_signal.cancel())
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let progress = ProgressBar::new(wanted.len() as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tiles {msg}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }

    let mut available = source.subscribe();
    source.process(viewport);
    info!(tiles = wanted.len(), level = level_plan.current_level, "Fetching viewport");

    let deadline = tokio::time::sleep(Duration::from_secs(args.timeout));
    tokio::pin!(deadline);

    let outcome = loop {
        let tally = tally_source(&source, &wanted);
        progress.set_position(tally.settled() as u64);
        progress.set_message(format!("({} downloading)", source.downloads_in_flight()));
        if tally.settled() == wanted.len() {
            break Outcome::Complete;
        }
        tokio::select! {
            _ = interrupted.cancelled() => break Outcome::Interrupted,
            _ = &mut deadline => break Outcome::TimedOut,
            changed = available.changed() => {
                if changed.is_err() {
                    break Outcome::TimedOut;
                }
            }
            _ = tokio::time::sleep(PROGRESS_TICK) => {}
        }
    };

    let tally = tally_source(&source, &wanted);
    match outcome {
        Outcome::Complete => progress.finish_with_message("done"),
        Outcome::TimedOut => progress.abandon_with_message("timed out"),
        Outcome::Interrupted => progress.abandon_with_message("interrupted"),
    }

    source.stop_download();
    dispatcher.shutdown();

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("{}", source.metrics());
    println!(
        "Cached:          {} tiles, {}",
        source.len(),
        format_size(source.cached_bytes())
    );
    if tally.dropped > 0 {
        println!("Missing:         {} tiles could not be fetched", tally.dropped);
    }

    match outcome {
        Outcome::Complete | Outcome::Interrupted => Ok(()),
        Outcome::TimedOut => {
            warn!(
                resolved = tally.resolved,
                total = wanted.len(),
                "Fetch timed out"
            );
            Err(CliError::Timeout {
                resolved: tally.resolved,
                total: wanted.len(),
            })
        }
    }
}

/// Where the wanted tiles stand.
#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    resolved: usize,
    /// Given up on: not found, failed or out of view.
    dropped: usize,
}

impl Tally {
    fn settled(&self) -> usize {
        self.resolved + self.dropped
    }
}

/// Counts wanted tiles from their table state: `None` when absent, else
/// whether the entry has resolved. Once a pass has inserted every wanted
/// address, an absent one has been given up on.
fn tally(states: impl IntoIterator<Item = Option<bool>>, pass_done: bool) -> Tally {
    let mut tally = Tally::default();
    for state in states {
        match state {
            Some(true) => tally.resolved += 1,
            Some(false) => {}
            None if pass_done => tally.dropped += 1,
            None => {}
        }
    }
    tally
}

fn tally_source(source: &TileSource, wanted: &[TileAddress]) -> Tally {
    let pass_done = source.metrics().passes > 0;
    tally(
        wanted
            .iter()
            .map(|address| source.tile(*address).map(|entry| entry.is_resolved())),
        pass_done,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_settles_before_the_first_pass() {
        let tally = tally([None, None, Some(false)], false);
        assert_eq!(tally.settled(), 0);
    }

    #[test]
    fn test_missing_tiles_count_as_dropped_after_a_pass() {
        // One resolved, one still pending, one removed after a 404.
        let tally = tally([Some(true), Some(false), None], true);
        assert_eq!(
            tally,
            Tally {
                resolved: 1,
                dropped: 1
            }
        );
        assert_eq!(tally.settled(), 2);
    }

    #[test]
    fn test_all_settled_with_a_not_found_tile() {
        let tally = tally([Some(true), Some(true), None], true);
        assert_eq!(tally.settled(), 3);
    }
}
