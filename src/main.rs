//! CLI entry point for the transit monitor.
//!
//! `serve` runs the API-key-hiding proxy together with the arrival board,
//! `watch` shows the board in a terminal through a running proxy, and
//! `normalize` reduces a single feed to its arrival list.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_monitor::{
    clock::{Clock, SystemClock},
    config::{Config, FeedSettings},
    fetch::{BasicClient, fetch_bytes},
    normalizer::normalize,
    orchestrator::{Orchestrator, OrchestratorSettings},
    output::{print_pretty, render_text},
    parser::parse_feed,
    presentation::LiveBoard,
    server,
    upstream::ProxyFeedSource,
};

#[derive(Parser)]
#[command(name = "transit_monitor")]
#[command(about = "Upcoming transit arrivals for a fixed list of stops", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the transit proxy and the arrival board web page
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Agency code for the board (overrides AGENCY)
        #[arg(short, long)]
        agency: Option<String>,

        /// Board refresh interval in milliseconds (overrides REFRESH_INTERVAL_MS)
        #[arg(short = 'r', long)]
        refresh_interval_ms: Option<u64>,
    },
    /// Show the arrival board in the terminal, fetching through a running proxy
    Watch {
        /// Base URL of the proxy
        #[arg(long, default_value = "http://localhost:3000")]
        proxy_url: String,

        /// Run a single arrival cycle and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Normalize one StopMonitoring feed from a file or URL and print it as JSON
    Normalize {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Only keep arrivals of this line
        #[arg(short, long)]
        line: Option<String>,

        /// Maximum number of arrivals (overrides MAX_ARRIVALS)
        #[arg(short, long)]
        max: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/transit_monitor.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_monitor.log"));

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
        Commands::Serve {
            port,
            agency,
            refresh_interval_ms,
        } => {
            let mut config = Config::from_env()?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(agency) = agency {
                config.agency = agency;
            }
            if let Some(ms) = refresh_interval_ms {
                config.refresh_interval = Duration::from_millis(ms);
            }
            info!(
                port = config.port,
                agency = %config.agency,
                stops = config.fetchable_stops().count(),
                "Starting transit monitor"
            );
            server::serve(config).await?;
        }
        Commands::Watch { proxy_url, once } => {
            watch(&Config::from_env()?, &proxy_url, once).await?;
        }
        Commands::Normalize { source, line, max } => {
            let settings = FeedSettings::from_env()?;
            let bytes = fetcher(&source).await?;
            let feed = parse_feed(&bytes)?;
            let now = SystemClock.now().with_timezone(&settings.display_tz);
            let arrivals = normalize(
                &feed,
                line.as_deref(),
                &now,
                max.unwrap_or(settings.max_arrivals),
            );
            info!(
                visits = feed.visits.len(),
                arrivals = arrivals.len(),
                "Feed normalized"
            );
            println!("{}", serde_json::to_string_pretty(&arrivals)?);
        }
    }

    Ok(())
}

/// Loads feed data from a local file path or fetches it over HTTP.
#[tracing::instrument(fields(source = %url))]
async fn fetcher(url: &str) -> Result<Vec<u8>> {
    let bytes = if url.starts_with("http") {
        let client = BasicClient::new();
        fetch_bytes(&client, url).await?
    } else {
        std::fs::read(url)?
    };
    Ok(bytes)
}

/// Prints the board after every arrival cycle until Ctrl-C.
#[tracing::instrument(skip(config))]
async fn watch(config: &Config, proxy_url: &str, once: bool) -> Result<()> {
    let board = Arc::new(LiveBoard::new(&config.stops));
    let orchestrator = Arc::new(Orchestrator::new(
        &config.stops,
        OrchestratorSettings {
            agency: config.agency.clone(),
            max_arrivals: config.max_arrivals,
            display_tz: config.display_tz,
        },
        Arc::new(ProxyFeedSource::new(BasicClient::new(), proxy_url)),
        Arc::new(SystemClock),
        board.clone(),
    ));

    let mut interval = tokio::time::interval(config.refresh_interval.max(Duration::from_secs(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
        }

        if let Some(stats) = orchestrator.refresh_all().await {
            if stats.failed > 0 {
                warn!(failed = stats.failed, "Some stops could not be loaded");
            }
        }
        let snapshot = board.snapshot();
        print_pretty(&snapshot);
        println!("{}", render_text(&snapshot));

        if once {
            break;
        }
    }

    Ok(())
}
