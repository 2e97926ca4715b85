use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use zeroize::Zeroize;

use cykel_forecast::history::JsonFileHistory;
use cykel_forecast::storage;
use cykel_forecast::{ForecastConfig, ForecastService, PredictionCache};

#[derive(Debug, Parser)]
#[command(name = "cykel-forecast", version, about = "Forecast upcoming cycles from period history")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "CYKEL_CONFIG")]
    config: Option<PathBuf>,

    /// Passphrase for the encrypted file cache
    #[arg(long, env = "CYKEL_CACHE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the next-cycle forecast, or several cycles with --cycles
    Predict {
        /// JSON array of cycle records
        #[arg(long)]
        history: PathBuf,

        #[arg(long, default_value_t = 1)]
        cycles: u32,

        /// Reference date (defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Cache key owner (defaults to the nil UUID)
        #[arg(long)]
        user: Option<Uuid>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ForecastConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ForecastConfig::default(),
    };
    init_tracing(&config.log.level);

    let store = storage::open_store(&config.cache, cli.passphrase.as_deref());
    if let Some(ref mut p) = cli.passphrase {
        p.zeroize();
    }

    match cli.command {
        Command::Predict {
            history,
            cycles,
            today,
            user,
        } => {
            let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
            let user = user.unwrap_or(Uuid::nil());
            let source = Arc::new(JsonFileHistory::new(&history));
            let modified_at = source
                .modified_at()
                .with_context(|| format!("reading history file {}", history.display()))?;
            let service = ForecastService::new(source, PredictionCache::new(store), config.policy);
            service.history_changed_at(user, modified_at);

            let json = if cycles <= 1 {
                serde_json::to_string_pretty(&service.next_cycle(user, today)?)?
            } else {
                serde_json::to_string_pretty(&service.upcoming_cycles(user, cycles, today)?)?
            };
            println!("{json}");
        }
    }

    Ok(())
}
