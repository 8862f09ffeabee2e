//! Index decision engine - entry point.
//!
//! `replay`: feed a JSON-lines file (or stdin) through the engine and print
//! engine events as JSON lines.
//! `stream`: read JSON lines from stdin continuously, evaluating on the
//! configured interval until EOF or Ctrl-C.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use idx_decision::{ConfigStore, StrategyConfig};
use idx_engine::{
    replay, spawn_instrument_task, AppConfig, ConfigWatcher, Engine, EngineEvent,
};
use idx_telemetry::{Metrics, SessionSummary};
use tokio::io::{AsyncBufReadExt, BufReader as AsyncBufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Replay,
    Stream,
}

/// Index derivative entry/exit decision engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via IDX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON-lines input file (stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Mode::Replay)]
    mode: Mode,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    idx_telemetry::init_logging()?;
    info!("Starting idx-engine v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::from_file(&config_path)?;

    let strategy_path = config.strategy_file();
    let strategy = StrategyConfig::from_file(&strategy_path)
        .with_context(|| format!("loading strategy {}", strategy_path.display()))?;
    let store = Arc::new(ConfigStore::new(strategy)?);
    let metrics = Arc::new(Metrics::new()?);
    info!(
        instrument = %config.instrument,
        strategy_version = store.version(),
        auto_open = config.auto_open,
        "Configuration loaded"
    );

    let started_at = Utc::now();
    let token = CancellationToken::new();

    let watcher_handle = config.reload_poll_interval().map(|interval| {
        ConfigWatcher::new(&strategy_path, Arc::clone(&store), Arc::clone(&metrics))
            .spawn(interval, token.clone())
    });

    match args.mode {
        Mode::Replay => {
            let engine = Engine::new(&config, Arc::clone(&store), Arc::clone(&metrics));
            let stdout = io::stdout();
            let stats = match &args.input {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("opening input {}", path.display()))?;
                    replay::run_replay(&engine, BufReader::new(file), stdout.lock())?
                }
                None => replay::run_replay(&engine, io::stdin().lock(), stdout.lock())?,
            };
            info!(?stats, "Replay complete");
        }
        Mode::Stream => {
            if args.input.is_some() {
                warn!("--input is ignored in stream mode, reading stdin");
            }
            run_stream(&config, Arc::clone(&store), Arc::clone(&metrics), token.clone()).await?;
        }
    }

    token.cancel();
    if let Some(handle) = watcher_handle {
        handle.await.ok();
    }

    SessionSummary::collect(&config.instrument, started_at, &metrics).log();
    Ok(())
}

async fn run_stream(
    config: &AppConfig,
    store: Arc<ConfigStore>,
    metrics: Arc<Metrics>,
    token: CancellationToken,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(config.event_channel_capacity);
    let (input_tx, input_rx) = mpsc::channel(config.input_channel_capacity);

    let engine = Arc::new(Engine::new(config, store, metrics).with_events(event_tx));
    let task = spawn_instrument_task(
        Arc::clone(&engine),
        input_rx,
        config.evaluation_interval(),
        token.clone(),
    );

    let printer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if writeln!(stdout, "{line}").is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to serialize engine event"),
            }
        }
    });

    let mut lines = AsyncBufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            next = lines.next_line() => {
                let Some(line) = next? else {
                    info!("Input closed");
                    break;
                };
                line_no += 1;
                match replay::parse_line(&line, line_no) {
                    Ok(Some(input)) => {
                        if input_tx.send(input).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Skipping malformed input line"),
                }
            }
        }
    }

    // Let queued inputs drain before stopping the task.
    drop(input_tx);
    task.await.ok();
    token.cancel();
    drop(engine);
    printer.await.ok();
    Ok(())
}
