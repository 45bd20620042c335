//! CLI entry point: publishes GTFS-Realtime trip updates or alerts for
//! trains reported by the PKP PLK operations API.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use rail_gtfs_rt::backoff::{Poller, PollerConfig};
use rail_gtfs_rt::fetch::BasicClient;
use rail_gtfs_rt::fetch::auth::ApiKey;
use rail_gtfs_rt::matcher::{PageOptions, fetch_alerts, fetch_delays};
use rail_gtfs_rt::output::OutputTarget;
use rail_gtfs_rt::schedule::{
    DEFAULT_DAY_OFFSET_PATTERN, DEFAULT_ORDER_COLUMN, DEFAULT_TRIP_KEY_PATTERN, IndexConfig,
    LiveKeyRule, ScheduleIndex,
};
use rail_gtfs_rt::source::{ApiConfig, DEFAULT_BASE_URL};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const API_KEY_VAR: &str = "PKP_PLK_APIKEY";

#[derive(Parser)]
#[command(name = "rail_gtfs_rt")]
#[command(about = "GTFS-Realtime feeds for PKP PLK trains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match live train operations into trip updates
    Delays {
        #[command(flatten)]
        run: RunArgs,

        /// GTFS-Realtime file to write
        #[arg(short, long, default_value = "polish_trains_delays.pb")]
        output: PathBuf,

        /// Trains requested per operations page (API limit: 5000)
        #[arg(long, default_value_t = 5000)]
        page_size: u32,

        /// Pages fetched before a cycle is considered incomplete
        #[arg(long, default_value_t = 10)]
        max_pages: u32,

        /// Pause between page requests, in milliseconds
        #[arg(long, default_value_t = 100)]
        fetch_spacing_ms: u64,
    },
    /// Match live disruptions into service alerts
    Alerts {
        #[command(flatten)]
        run: RunArgs,

        /// GTFS-Realtime file to write
        #[arg(short, long, default_value = "polish_trains_alerts.pb")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Static GTFS feed (zip archive or directory)
    #[arg(short, long, default_value = "polish_trains.zip")]
    gtfs: PathBuf,

    /// Also write the facts as JSON, next to OUTPUT with a .json extension
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Indent the JSON output
    #[arg(long, default_value_t = false)]
    readable: bool,

    /// Seconds between cycles; zero or less runs once
    #[arg(short, long, default_value_t = 30, allow_negative_numbers = true)]
    period: i64,

    /// Cap on the backoff exponent after consecutive upstream failures
    #[arg(long, default_value_t = 8)]
    max_backoff_exponent: u32,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Base URL of the operations API
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Timezone of live timestamps without an offset
    #[arg(long, default_value = "Europe/Warsaw")]
    timezone: String,

    /// Regex extracting `sid` and `oid` groups from trip_id
    #[arg(long, default_value = DEFAULT_TRIP_KEY_PATTERN)]
    trip_key_pattern: String,

    /// Read the live schedule id from this trips.txt column instead of trip_id
    #[arg(long, requires = "order_id_column")]
    schedule_id_column: Option<String>,

    /// Read the live order id from this trips.txt column instead of trip_id
    #[arg(long, requires = "schedule_id_column")]
    order_id_column: Option<String>,

    /// Regex extracting the `days` offset group from service_id
    #[arg(long, default_value = DEFAULT_DAY_OFFSET_PATTERN)]
    day_offset_pattern: String,

    /// stop_times.txt column with the live order number
    #[arg(long, default_value = DEFAULT_ORDER_COLUMN)]
    order_column: String,
}

impl RunArgs {
    fn index_config(&self) -> Result<IndexConfig> {
        let mut config = IndexConfig::new(
            &self.trip_key_pattern,
            &self.day_offset_pattern,
            &self.order_column,
        )
        .context("invalid schedule index pattern")?;

        if let (Some(schedule_id), Some(order_id)) =
            (&self.schedule_id_column, &self.order_id_column)
        {
            config.live_key = LiveKeyRule::Columns {
                schedule_id: schedule_id.clone(),
                order_id: order_id.clone(),
            };
        }
        Ok(config)
    }

    fn api_config(&self) -> Result<ApiConfig> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|e| anyhow!("invalid timezone {:?}: {e}", self.timezone))?;
        ApiConfig::new(&self.base_url, timezone)
    }

    fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            period: Duration::from_secs(u64::try_from(self.period).unwrap_or(0)),
            max_exponent: self.max_backoff_exponent,
        }
    }

    fn target(&self, output: PathBuf) -> OutputTarget {
        OutputTarget {
            path: output,
            json: self.json,
            readable: self.readable,
        }
    }

    fn client(&self) -> Result<ApiKey<BasicClient>> {
        let key =
            std::env::var(API_KEY_VAR).with_context(|| format!("{API_KEY_VAR} must be set"))?;
        let inner = BasicClient::with_timeout(Duration::from_secs(self.timeout))?;
        ApiKey::x_api_key(inner, &key)
    }

    fn load_index(&self) -> Result<ScheduleIndex> {
        let index = ScheduleIndex::from_path(&self.gtfs, &self.index_config()?)
            .with_context(|| format!("loading {}", self.gtfs.display()))?;
        info!(
            gtfs = %self.gtfs.display(),
            live_keys = index.len(),
            "Static schedule loaded"
        );
        Ok(index)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/rail_gtfs_rt.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("rail_gtfs_rt.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Delays {
            run,
            output,
            page_size,
            max_pages,
            fetch_spacing_ms,
        } => {
            let index = run.load_index()?;
            let api = run.api_config()?;
            let client = run.client()?;
            let target = run.target(output);
            let options = PageOptions {
                page_size,
                max_pages,
                fetch_spacing: Duration::from_millis(fetch_spacing_ms),
            };

            let (index, api, client, target, options) =
                (&index, &api, &client, &target, &options);
            Poller::new(run.poller_config())
                .run(move || async move {
                    let matched = fetch_delays(client, api, index, options).await?;
                    target.write(&matched.facts)?;
                    info!(
                        path = %target.path.display(),
                        facts = matched.facts.len(),
                        "Trip updates written"
                    );
                    anyhow::Ok(())
                })
                .await?;
        }
        Commands::Alerts { run, output } => {
            let index = run.load_index()?;
            let api = run.api_config()?;
            let client = run.client()?;
            let target = run.target(output);

            let (index, api, client, target) = (&index, &api, &client, &target);
            Poller::new(run.poller_config())
                .run(move || async move {
                    let matched = fetch_alerts(client, api, index).await?;
                    target.write(&matched.facts)?;
                    info!(
                        path = %target.path.display(),
                        facts = matched.facts.len(),
                        "Alerts written"
                    );
                    anyhow::Ok(())
                })
                .await?;
        }
    }

    Ok(())
}
