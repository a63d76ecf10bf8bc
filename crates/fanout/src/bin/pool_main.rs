//! Pool Binary Entry Point
//!
//! Supervisor for the workers of one host, normally launched by
//! `fanout-master start`.
//!
//! # Usage
//!
//! ```bash
//! # one worker per core
//! fanout-pool tcp://127.0.0.1:1909 tcp://127.0.0.1:1910 -1
//!
//! # four workers running a custom worker binary
//! fanout-pool tcp://127.0.0.1:1909 tcp://127.0.0.1:1910 4 \
//!     --worker-program /opt/app/bin/app-worker
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use fanout::config::LoggingConfig;
use fanout::logging::init_logging;
use fanout::WorkerPool;
use tracing::info;

/// Fanout worker pool supervisor
#[derive(Parser, Debug)]
#[command(name = "fanout-pool")]
#[command(version)]
#[command(about = "Runs a fixed set of workers and answers stop/kill/getpid on a control endpoint")]
struct Args {
    /// Control endpoint to bind
    ctrl_url: String,

    /// Distribution endpoint the workers pull from
    task_out_url: String,

    /// Number of workers, -1 for one per core
    #[arg(allow_negative_numbers = true)]
    num_workers: i64,

    /// Worker executable (defaults to fanout-worker next to this binary)
    #[arg(long)]
    worker_program: Option<PathBuf>,

    #[command(flatten)]
    logging: LoggingConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.logging)?;

    let mut pool = WorkerPool::new(&args.ctrl_url, &args.task_out_url, args.num_workers)?;
    if let Some(program) = args.worker_program {
        pool = pool.with_worker_program(program);
    }

    pool.start()
        .await
        .with_context(|| format!("WorkerPool {} failed", args.ctrl_url))?;

    info!("WorkerPool {} exited", args.ctrl_url);
    Ok(())
}
