//! Master Binary Entry Point
//!
//! Operator tool for the pools of a cluster and for the streamer.
//!
//! # Usage
//!
//! ```bash
//! fanout-master --hosts "127.0.0.1 -1, node2 16" start
//! fanout-master status
//! fanout-master --config-file fanout.yaml stop
//! fanout-master getpid node2
//! fanout-master streamer
//! ```

use anyhow::Context;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use fanout::config::MasterConfig;
use fanout::logging::init_logging;
use fanout::{Streamer, WorkerMaster};
use tracing::info;

/// Fanout cluster control
#[derive(Parser, Debug)]
#[command(name = "fanout-master")]
#[command(version)]
#[command(about = "Start, stop and inspect worker pools, or run the task streamer")]
struct Cli {
    #[command(flatten)]
    config: MasterConfig,

    /// Print the effective configuration before running the command
    #[arg(long, default_value_t = false)]
    show_config: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report running / not-running for every host, or for one
    Status { host: Option<String> },
    /// Launch a pool on every host not running one
    Start,
    /// Stop every pool, letting workers finish their current task
    Stop,
    /// Terminate every pool's workers immediately
    Kill,
    /// Print the pool process id on a host
    Getpid { host: String },
    /// Relay tasks from task_in_url to task_out_url until Ctrl-C
    Streamer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let config = cli.config.resolve(&matches).context("Invalid configuration")?;
    init_logging(&config.logging)?;

    if cli.show_config {
        config.print_summary();
    }

    if let Commands::Streamer = cli.command {
        let streamer = Streamer::bind(&config.network.task_in_url, &config.network.task_out_url)
            .await
            .context("Failed to bind streamer")?;
        let relayed = streamer.run().await?;
        info!("Streamer relayed {} tasks", relayed);
        return Ok(());
    }

    let master = WorkerMaster::from_config(&config)?;
    let lines = match cli.command {
        Commands::Status { host } => master
            .status(host.as_deref())
            .await?
            .into_iter()
            .map(|(host, state)| format!("{} {}", host, state))
            .collect(),
        Commands::Start => master.start().await?,
        Commands::Stop => master.stop().await?,
        Commands::Kill => master.kill().await?,
        Commands::Getpid { host } => vec![master.getpid(&host).await?.to_string()],
        Commands::Streamer => Vec::new(),
    };

    for line in lines {
        println!("{}", line);
    }
    Ok(())
}
