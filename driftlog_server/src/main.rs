//! driftlog server
//!
//! Serves the start/stop/query API over a sled-backed sample store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use driftlog_core::{Retriever, SessionSupervisor, SimulationConfig, SledSampleStore};
use driftlog_env::{DriftContext, TokioContext};
use driftlog_server::{router, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Random-walk movement simulator with batched storage
#[derive(Parser, Debug)]
#[command(name = "driftlog")]
#[command(about = "Simulate entity movement and query the recorded history", long_about = None)]
struct Args {
    /// Path to the sled database directory
    #[arg(long, default_value = "./user_movement_db")]
    db_path: String,

    /// Address and port to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// Session length in seconds before generators stop on their own
    #[arg(long, default_value = "30")]
    duration_secs: u64,

    /// Samples buffered before a batch write
    #[arg(long, default_value = "100")]
    batch_size: usize,

    /// Longest wait before a partial batch is written (ms)
    #[arg(long, default_value = "100")]
    flush_interval_ms: u64,

    /// Time between generated samples (ms)
    #[arg(long, default_value = "1")]
    sample_interval_ms: u64,

    /// Largest displacement of one step
    #[arg(long, default_value = "0.004")]
    max_step: f64,

    /// Master seed for reproducible walks (0 = OS entropy)
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            batch_capacity: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            max_step_magnitude: self.max_step,
            session_duration: Duration::from_secs(self.duration_secs),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("driftlog v{}", env!("CARGO_PKG_VERSION"));

    let config = args.simulation_config();
    let store = Arc::new(
        SledSampleStore::open(&args.db_path)
            .with_context(|| format!("Failed to initialize database at {}", args.db_path))?,
    );
    info!("Database opened at {}", args.db_path);

    let context = Arc::new(TokioContext::seeded(args.seed));
    if context.seed() != 0 {
        info!("Using master seed {}", context.seed());
    }

    let supervisor = SessionSupervisor::new(context, store.clone(), config)
        .context("Invalid simulation settings")?;
    let state = AppState::new(supervisor.clone(), Retriever::new(store.clone()));

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;

    info!("Server listening on {}", args.addr);
    info!("Endpoints:");
    info!("  POST /start   - Body: {{\"user_ids\": [\"id1\", \"id2\"]}}");
    info!("  POST /stop");
    info!("  GET  /user/{{user_id}}?min=0.0&max=1.0");
    info!("  GET  /status");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Received shutdown signal. Stopping simulations and closing database...");
    supervisor.shutdown().await;
    if let Err(e) = store.flush() {
        warn!("Final database flush failed: {}", e);
    }
    info!("Shutdown complete.");

    Ok(())
}
