//! adrotor CLI
//!
//! Runs the rotator against headless slots, or inspects the ad endpoint and
//! the persisted history.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adrotor::{
    error::Result,
    host::{HeadlessHost, StaticProbe},
    models::Config,
    scheduler::{Rotator, RotatorDeps, RotatorSnapshot},
    services::{AnalyticsSink, Fetcher, HttpAdSource, HttpAnalytics, NoopAnalytics, Selector},
    storage::{LocalStorage, SessionStore, SharedHistory},
};
use clap::{Parser, Subcommand};

/// adrotor - Weighted Ad Rotation
#[derive(Parser, Debug)]
#[command(name = "adrotor", version, about = "Weighted, visibility-aware ad rotation")]
struct Cli {
    /// Path to storage directory containing config and history
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rotate ads through headless slots until Ctrl-C
    Run {
        /// Number of slots to rotate
        #[arg(long, default_value_t = 1)]
        slots: usize,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Seed for reproducible selection
        #[arg(long)]
        seed: Option<u64>,

        /// Simulated downlink in Mbps
        #[arg(long)]
        downlink: Option<f64>,
    },

    /// Fetch once, print the candidates and the pick
    Fetch {
        /// Override the requested ad count
        #[arg(long)]
        count: Option<u32>,
    },

    /// Show or clear the recently shown history
    History {
        #[arg(long)]
        clear: bool,
    },

    /// Validate configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_summary(snapshot: &RotatorSnapshot) {
    let mut ids: Vec<_> = snapshot.stats.keys().collect();
    ids.sort();

    log::info!("Recently shown: {}", snapshot.recent.join(", "));
    for id in ids {
        let stats = &snapshot.stats[id];
        log::info!(
            "  {}: {} impression(s), {} click(s)",
            id,
            stats.impressions,
            stats.clicks
        );
    }
    for slot in &snapshot.slots {
        log::info!(
            "  slot {}: {} showing {}",
            slot.id,
            slot.phase,
            slot.current_ad_id.as_deref().unwrap_or("nothing")
        );
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    init_logging(cli.verbose, &config.logging.level);

    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let store: Arc<dyn SessionStore> = Arc::new(LocalStorage::new(&cli.storage_dir));

    match cli.command {
        Command::Run {
            slots,
            duration,
            seed,
            downlink,
        } => {
            let analytics: Arc<dyn AnalyticsSink> = if config.analytics.enabled {
                Arc::new(HttpAnalytics::from_config(&config)?)
            } else {
                Arc::new(NoopAnalytics)
            };
            let deps = RotatorDeps {
                source: Arc::new(HttpAdSource::from_config(&config)?),
                analytics,
                store,
                probe: Arc::new(StaticProbe::new(downlink)),
                seed,
            };

            let rotator = Rotator::start(&config, &HeadlessHost::new(slots), deps).await?;
            match duration {
                Some(secs) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                        result = tokio::signal::ctrl_c() => result?,
                    }
                }
                None => tokio::signal::ctrl_c().await?,
            }

            let snapshot = rotator.snapshot().await;
            rotator.shutdown().await;
            print_summary(&snapshot);
        }

        Command::Fetch { count } => {
            let mut rotator_config = config.rotator.clone();
            if let Some(count) = count {
                rotator_config.request_count = count;
            }

            let source = Arc::new(HttpAdSource::from_config(&config)?);
            let ads = Fetcher::from_config(source, &rotator_config).fetch().await?;
            println!("{}", serde_json::to_string_pretty(&ads)?);

            let history = SharedHistory::load(
                store,
                rotator_config.storage_key.clone(),
                rotator_config.recently_shown_limit,
            )
            .await;
            let recent = history.snapshot().await;
            let selector = Selector::new(rotator_config.recent_penalty);
            if let Some(ad) = selector.pick(&ads, &recent, &mut rand::thread_rng()) {
                log::info!(
                    "Selected {} (effective weight {:.2})",
                    ad.id,
                    selector.effective_weight(ad, &recent)
                );
            }
        }

        Command::History { clear } => {
            let history = SharedHistory::load(
                store,
                config.rotator.storage_key.clone(),
                config.rotator.recently_shown_limit,
            )
            .await;

            if clear {
                history.clear().await;
                log::info!("History cleared");
            } else {
                let ids = history.snapshot().await;
                if ids.is_empty() {
                    log::info!("No ads shown yet.");
                }
                for (i, id) in ids.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, id);
                }
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK (endpoint {})", config.rotator.api);
        }
    }

    log::info!("Done!");

    Ok(())
}
