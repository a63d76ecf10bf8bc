//! Worker Binary Entry Point
//!
//! One worker process, normally launched by `fanout-pool`. It pulls tasks
//! from the distribution endpoint and runs them with the built-in callables.
//!
//! # Usage
//!
//! ```bash
//! fanout-worker tcp://127.0.0.1:1910
//! ```
//!
//! SIGINT lets the current task finish before exiting; SIGTERM ends the
//! process at once.

use anyhow::Context;
use clap::Parser;
use fanout::builtins::builtin_registry;
use fanout::config::LoggingConfig;
use fanout::logging::init_logging;
use fanout::Worker;
use tracing::info;

/// Fanout worker process
#[derive(Parser, Debug)]
#[command(name = "fanout-worker")]
#[command(version)]
#[command(about = "Pulls tasks from a streamer and pushes results back to their submitters")]
struct Args {
    /// Distribution endpoint to pull tasks from
    task_out_url: String,

    #[command(flatten)]
    logging: LoggingConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.logging)?;

    let worker = Worker::connect(&args.task_out_url, builtin_registry())
        .await
        .with_context(|| format!("Failed to connect to {}", args.task_out_url))?;
    let processed = worker.run().await?;

    info!("Worker {} done after {} tasks", std::process::id(), processed);
    Ok(())
}
