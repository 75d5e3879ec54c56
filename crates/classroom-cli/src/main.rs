//! Classroom CLI
//!
//! Serves the classroom engine over HTTP, snapshotting the store to disk.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use classroom_engine::{create_router, AppState, Classroom, Config, MemoryStore, NodeStore};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Classroom - ordered course content and student progress
///
/// Keeps module and exercise chains for templates, teachers, courses and
/// students, replicating course content into each student's workspace.
#[derive(Parser, Debug)]
#[command(name = "classroom")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: classroom.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Store snapshot path (overrides dataFile from the config)
    #[arg(short, long, value_name = "FILE")]
    data: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Classroom starting");
    tracing::debug!(config = ?args.config, data = ?args.data, "Arguments");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Loads config and store, serves until Ctrl+C, then writes a final snapshot.
async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(data) = args.data {
        config.data_file = data;
    }
    config.validate()?;
    print_config(&config);

    let data_path = PathBuf::from(&config.data_file);
    let store = Arc::new(load_store(&data_path).await?);
    let classroom = Classroom::new(Arc::clone(&store) as Arc<dyn NodeStore>, config.clone());
    let stats = classroom.stats();
    println!(
        "Store loaded: {} modules, {} exercises, {} enrollments",
        stats.modules, stats.exercises, stats.enrollments
    );

    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;
    let router = create_router(AppState::new(config.clone(), classroom));

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(Duration::from_secs(config.snapshot_interval_secs));
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                println!();
                println!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = store.save(&data_path).await {
                    tracing::warn!(error = %e, path = %data_path.display(), "Periodic snapshot failed");
                }
            }
        }
    }

    server_handle.abort();
    store
        .save(&data_path)
        .await
        .with_context(|| format!("Failed to write final snapshot to '{}'", data_path.display()))?;
    tracing::info!(path = %data_path.display(), "Final snapshot written");
    println!("Store saved to {}", data_path.display());

    Ok(())
}

fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the snapshot at `path`, or starts empty when there is none.
async fn load_store(path: &Path) -> anyhow::Result<MemoryStore> {
    match MemoryStore::load(path).await {
        Ok(Some(store)) => {
            tracing::info!(path = %path.display(), "Loaded store snapshot");
            Ok(store)
        }
        Ok(None) => {
            tracing::info!(path = %path.display(), "No snapshot found, starting empty");
            Ok(MemoryStore::new())
        }
        Err(e) => Err(anyhow::anyhow!("{e}")),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Points per exercise: {}", config.points_per_exercise);
    println!("  Default max score: {}", config.default_max_score);
    println!("  Data file: {}", config.data_file);
    println!("  Snapshot interval: {}s", config.snapshot_interval_secs);
}
