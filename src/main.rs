use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use feedcast::config::{load_feed_sources, Config, SinkConfig};
use feedcast::notify::{build_sinks, SinkOptions};
use feedcast::pipeline::{self, PipelineOptions, RunMode};
use feedcast::storage::HistoryStore;

#[derive(Parser, Debug)]
#[command(
    name = "feedcast",
    about = "Relay new RSS/Atom entries to Telegram and webhooks"
)]
struct Args {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, value_name = "FILE", default_value = "feedcast.toml")]
    config: PathBuf,

    /// Feed list, one URL per line (overrides `feeds_file`)
    #[arg(long, value_name = "FILE")]
    feeds: Option<PathBuf>,

    /// History JSON file (overrides `history_file`)
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Fetch and report new entries without delivering or saving history
    #[arg(long, conflicts_with = "mark_seen")]
    dry_run: bool,

    /// Record every current entry as delivered without sending anything
    #[arg(long)]
    mark_seen: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Credentials may come from a local .env during development
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(feeds) = args.feeds {
        config.feeds_file = feeds;
    }
    if let Some(history) = args.history {
        config.history_file = history;
    }

    let mode = match (args.dry_run, args.mark_seen) {
        (true, _) => RunMode::DryRun,
        (_, true) => RunMode::MarkSeen,
        _ => RunMode::Deliver,
    };

    // Setup: everything that can abort the run happens before any network call
    let sources = load_feed_sources(&config.feeds_file).context("Failed to load feed list")?;
    let sink_config = SinkConfig::from_env(&config).context("Invalid sink configuration")?;
    if sink_config.is_empty() && mode == RunMode::Deliver {
        tracing::warn!("No sinks enabled; new entries will be fetched but not delivered");
    }

    let store = HistoryStore::new(&config.history_file);
    let history = store
        .load()
        .context("Refusing to run with unreadable history (would re-deliver everything)")?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("feedcast/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let sinks = build_sinks(
        &sink_config,
        &client,
        &SinkOptions {
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            summary_max_chars: config.summary_max_chars,
            telegram_api_base: config.telegram_api_base.clone(),
        },
    );

    let options = PipelineOptions::from_config(&config, mode);
    pipeline::run(&client, &sources, &sinks, &store, history, &options)
        .await
        .context("Failed to save history")?;

    Ok(())
}
