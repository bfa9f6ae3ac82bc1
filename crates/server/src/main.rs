mod api;
mod db;
mod router;
mod startup;
mod state;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

// ── CLI ─────────────────────────────────────────────────────────────

/// Pulse: recurring accessibility scans with regression alerts.
#[derive(Parser, Debug)]
#[command(name = "pulse-server", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Run one batch of due schedules locally and exit.
    RunDue {
        /// Maximum schedules to run (capped at SCHEDULER_BATCH_LIMIT).
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn load_config() -> pulse_core::Config {
    pulse_core::config::load_dotenv();
    pulse_core::Config::from_env()
}

async fn serve(config: &pulse_core::Config) -> anyhow::Result<()> {
    let state = Arc::new(startup::build_state(config).await?);
    let app = router::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_due(config: &pulse_core::Config, limit: Option<usize>) -> anyhow::Result<()> {
    let state = startup::build_state(config).await?;
    let summary = state.driver.run(limit).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config();
    config.log_summary();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::RunDue { limit } => run_due(&config, limit).await,
    }
}
