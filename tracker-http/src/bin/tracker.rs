//! Tracker CLI - collector checks and backup tooling
//!
//! Usage:
//!     tracker health --config tracker.json
//!     tracker convert tracker_backup.csv --format xapi
//!     tracker replay tracker_backup.csv --config tracker.json --token <user token>
//!
//! Log verbosity follows `RUST_LOG` (default `tracker=info`).

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_core::{
    serialize, Capabilities, FlushMode, SerializeContext, StorageType, TraceEvent, TraceFormat, Tracker,
    TrackerConfig, Validator,
};
use tracker_http::HttpTransport;

#[derive(Parser, Debug)]
#[command(name = "tracker")]
#[command(about = "Collector checks and trace backup tooling")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query the collector health endpoint
    Health {
        /// Tracker configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Re-encode a CSV backup file in another trace format
    Convert {
        /// Backup file written by the tracker
        input: PathBuf,

        /// csv, json, xapi or xml
        #[arg(short, long, default_value = "json")]
        format: TraceFormat,
    },

    /// Send the traces of a CSV backup file to the collector
    Replay {
        /// Backup file written by the tracker
        input: PathBuf,

        /// Tracker configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// User token for the connect handshake
        #[arg(long)]
        token: Option<String>,

        /// Overrides the configured tracking code
        #[arg(long)]
        tracking_code: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracker=info,tracker_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Health { config } => health(config.as_deref()),
        Command::Convert { input, format } => convert(&input, format),
        Command::Replay {
            input,
            config,
            token,
            tracking_code,
        } => replay(&input, config.as_deref(), token, tracking_code),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig, String> {
    match path {
        Some(p) => TrackerConfig::from_file(p)
            .map_err(|e| format!("Failed to load config '{}': {}", p.display(), e)),
        None => Ok(TrackerConfig::default()),
    }
}

/// Net storage with flushes on the calling thread, so a flush returns only
/// after its cycle ran
fn net_config(config: TrackerConfig) -> TrackerConfig {
    config
        .with_storage_type(StorageType::Net)
        .with_flush_mode(FlushMode::Synchronous)
}

fn net_tracker(config: TrackerConfig) -> Result<Tracker, String> {
    let config = net_config(config);
    let transport = HttpTransport::from_config(&config).map_err(|e| e.to_string())?;
    let caps = Capabilities::builder().transport(Arc::new(transport)).build();
    Tracker::new(config, caps).map_err(|e| e.to_string())
}

/// Reads a backup file, skipping blank lines
fn read_backup(path: &Path) -> Result<Vec<TraceEvent>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            TraceEvent::from_csv_line(line).map_err(|e| format!("line {}: {}", n + 1, e))
        })
        .collect()
}

fn health(config: Option<&Path>) -> Result<(), String> {
    let tracker = net_tracker(load_config(config)?)?;
    if !tracker.check_health() {
        return Err(format!(
            "collector at {} is not healthy",
            tracker.config().endpoint("health")
        ));
    }
    println!("{}", tracker.health().unwrap_or_else(|| "OK".to_string()));
    Ok(())
}

fn convert(input: &Path, format: TraceFormat) -> Result<(), String> {
    let events = read_backup(input)?;
    let text = serialize(
        &events,
        format,
        &SerializeContext::anonymous(),
        &Validator::lenient(),
    )
    .map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn replay(
    input: &Path,
    config: Option<&Path>,
    token: Option<String>,
    tracking_code: Option<String>,
) -> Result<(), String> {
    let events = read_backup(input)?;
    let config = load_config(config)?;
    let tracking_code = tracking_code.unwrap_or_else(|| config.tracking_code.clone());
    let tracker = net_tracker(config)?;

    match token {
        Some(token) => tracker.start_with_token(&token, &tracking_code),
        None => tracker.start_with_tracking_code(&tracking_code),
    }
    if !tracker.is_active() {
        return Err("collector handshake failed".to_string());
    }

    let total = events.len();
    for event in events {
        tracker.trace(event).map_err(|e| e.to_string())?;
    }
    while tracker.queue_len() > 0 {
        tracker.flush();
    }
    // Drain the backlog once more now that the queue is empty
    tracker.flush();

    let stats = tracker.stats();
    tracing::info!(
        total,
        pending = stats.pipeline.pending_batches,
        "Replay finished"
    );
    if stats.pipeline.pending_batches > 0 || stats.pipeline.unlogged_events > 0 {
        return Err(format!(
            "{} batches could not be delivered",
            stats.pipeline.pending_batches
        ));
    }
    println!("Replayed {} traces", total);
    Ok(())
}
