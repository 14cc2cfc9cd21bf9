use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use epg_gateway::{
    config::Config, observability::GuideMetrics, repositories::MemoryGuideStore, services::SyncContext,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "epg-gateway")]
#[command(version)]
#[command(about = "Guide and channel synchronization for an IPTV virtual tuner")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// State file (overrides config file)
    #[arg(long, value_name = "FILE")]
    state_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh and schedule guide sources
    Sync {
        /// Guide source id or name; all sources when omitted
        #[arg(long)]
        source: Option<String>,
    },
    /// Rank a guide source's channels by name
    Match { source: String, name: String },
    /// Regions with discoverable lineups
    Coverage { source: String },
    /// Lineups available in a country and postal code
    Available {
        source: String,
        #[arg(long)]
        country: String,
        #[arg(long)]
        postal: String,
    },
    /// Channels of a provider lineup, without subscribing
    Preview { source: String, lineup: String },
    Subscribe { source: String, lineup: String },
    Unsubscribe { source: String, lineup: String },
    /// Print the published tuner lineup as JSON
    Lineup { lineup_id: Uuid },
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("epg_gateway={level}").into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn resolve_source(config: &Config, key: &str) -> Result<Uuid> {
    match config.find_guide_source(key) {
        Some(source) => Ok(source.source_id()),
        None => bail!("no guide source named '{key}' in the configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    if let Some(state_file) = cli.state_file {
        config.storage.state_file = state_file;
    }
    info!("epg-gateway v{} using {}", env!("CARGO_PKG_VERSION"), cli.config);

    let store = Arc::new(MemoryGuideStore::open(&config.storage.state_file).await?);
    let context = SyncContext::from_config(&config, store.clone(), GuideMetrics::new());
    context.register_guide_sources(&config.guide_sources).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Command::Sync { source } => {
            let results = match source {
                Some(key) => {
                    let id = resolve_source(&config, &key)?;
                    vec![(id, context.synchronize(id, &cancel).await)]
                }
                None => context.synchronize_all(&cancel).await?,
            };
            store.persist().await?;

            let mut failed = 0;
            for (id, result) in results {
                match result {
                    Ok(report) => println!(
                        "{}: {} channels, {} station days fetched, {} programmes upserted",
                        report.guide_source_name,
                        report.channels_scheduled,
                        report.stats.station_days_fetched,
                        report.programmes_upserted
                    ),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{id}: {e}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} guide source(s) failed to synchronize");
            }
        }
        Command::Match { source, name } => {
            let id = resolve_source(&config, &source)?;
            for channel in context.match_channels(id, &name).await? {
                println!("{}\t{}\t{}", channel.id, channel.number, channel.name);
            }
        }
        Command::Coverage { source } => {
            let id = resolve_source(&config, &source)?;
            for area in context.lineup_coverage(id).await? {
                println!("{}\t{}\t{}", area.region, area.short_name, area.country);
            }
        }
        Command::Available { source, country, postal } => {
            let id = resolve_source(&config, &source)?;
            for lineup in context.available_lineups(id, &country, &postal).await? {
                println!("{}\t{}\t{}\t{}", lineup.id, lineup.transport, lineup.location, lineup.name);
            }
        }
        Command::Preview { source, lineup } => {
            let id = resolve_source(&config, &source)?;
            for channel in context.preview_lineup_channels(id, &lineup).await? {
                println!("{}\t{}\t{}", channel.number, channel.call_sign, channel.name);
            }
        }
        Command::Subscribe { source, lineup } => {
            let id = resolve_source(&config, &source)?;
            if !context.subscribe_to_lineup(id, &lineup).await? {
                bail!("lineup {lineup} was not added");
            }
            println!("subscribed to {lineup}");
        }
        Command::Unsubscribe { source, lineup } => {
            let id = resolve_source(&config, &source)?;
            if !context.unsubscribe_from_lineup(id, &lineup).await? {
                bail!("lineup {lineup} was not removed");
            }
            println!("unsubscribed from {lineup}");
        }
        Command::Lineup { lineup_id } => {
            let composition = context.compose_lineup(lineup_id).await?;
            for failure in &composition.failures {
                warn!("Channel {} left out: {}", failure.channel_number, failure.error);
            }
            println!("{}", serde_json::to_string_pretty(&composition.entries)?);
        }
    }

    Ok(())
}
