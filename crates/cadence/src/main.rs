//! Cadence: recurring task scheduler
//!
//! Main binary with subcommands:
//! - `demo`: Register a demonstration task set and drive it with the tick driver

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod demo;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Recurring task scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demonstration task set
    Demo {
        /// Number of ticks to run before stopping (Ctrl-C stops early)
        #[arg(long, env = "CADENCE_TICKS", default_value = "20")]
        ticks: u64,

        /// Interval between successful runs of each demo task, in milliseconds
        #[arg(long, env = "CADENCE_INTERVAL_MS", default_value = "100")]
        interval_ms: u64,

        /// Longest pause between ticks, in milliseconds
        #[arg(long, env = "CADENCE_MAX_SLEEP_MS", default_value = "250")]
        max_sleep_ms: u64,

        /// Default retry ceiling for tasks that do not set one
        #[arg(long, env = "CADENCE_MAX_RETRIES", default_value = "3")]
        max_retries: u32,

        /// Default backoff base for tasks that do not set one, in milliseconds
        #[arg(long, env = "CADENCE_BACKOFF_MS", default_value = "50")]
        backoff_ms: u64,

        /// Print the final task table as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "cadence=info,cadence_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            ticks,
            interval_ms,
            max_sleep_ms,
            max_retries,
            backoff_ms,
            json,
        } => {
            demo::run(demo::DemoOptions {
                ticks,
                interval_ms,
                max_sleep_ms,
                max_retries,
                backoff_ms,
                json,
            })
            .await
        }
    }
}
