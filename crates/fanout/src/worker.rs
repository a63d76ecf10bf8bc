//! Worker
//!
//! One OS process, one task at a time:
//!
//! ```text
//!   distribution endpoint (PUSH, bound by the streamer)
//!            │
//!            ▼  PullSocket
//!   ┌────────────────────┐
//!   │ Worker             │  decode Task → Registry::execute → TaskResult
//!   └─────────┬──────────┘
//!             ▼  PushSocket (cached per backurl)
//!   submitter's reply endpoint (PULL, bound by the submission)
//! ```
//!
//! A shutdown request (SIGINT from the pool's `stop`) is only looked at
//! between tasks, so the task in flight finishes and its result is delivered.
//! Results for a submitter that is gone are dropped; the worker keeps pulling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fanout_protocol::{Task, TaskResult};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use zeromq::{PullSocket, PushSocket, Socket};

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::transport;

/// How long a reply endpoint gets to accept the connection.
const REPLY_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Worker {
    task_out_url: String,
    socket: PullSocket,
    registry: Arc<Registry>,
    /// Reply socket reused while consecutive tasks share a backurl
    reply: Option<(String, PushSocket)>,
    processed: u64,
}

impl Worker {
    /// Connect to the distribution endpoint.
    pub async fn connect(task_out_url: &str, registry: Registry) -> Result<Self> {
        let mut socket = PullSocket::new();
        transport::connect(&mut socket, task_out_url).await?;
        info!(
            "Worker {} pulling tasks from {} ({} callables)",
            std::process::id(),
            task_out_url,
            registry.names().len()
        );

        Ok(Self {
            task_out_url: task_out_url.to_string(),
            socket,
            registry: Arc::new(registry),
            reply: None,
            processed: 0,
        })
    }

    /// Serve tasks until SIGINT. Returns the number of tasks processed.
    pub async fn run(self) -> Result<u64> {
        let mut sigint = signal(SignalKind::interrupt())?;
        self.run_until(async move {
            sigint.recv().await;
        })
        .await
    }

    /// Serve tasks until `shutdown` resolves.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<u64>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Worker {} interrupted, exiting", std::process::id());
                    break;
                }
                frame = transport::recv_frame(&mut self.socket, &self.task_out_url) => frame?,
            };

            let Some((backurl, result)) = self.handle(&frame).await? else {
                continue;
            };

            // Delivery goes first so a finished task is still reported after
            // shutdown was requested; a stalled delivery yields to shutdown.
            tokio::select! {
                biased;
                delivered = self.reply(&backurl, &result) => {
                    if let Err(e) = delivered {
                        warn!("Dropping result for {}: {}", backurl, e);
                        self.reply = None;
                    }
                }
                _ = &mut shutdown => {
                    warn!("Worker {} interrupted while replying to {}", std::process::id(), backurl);
                    break;
                }
            }
        }

        if let Some((_, socket)) = self.reply.take() {
            socket.close().await;
        }
        Ok(self.processed)
    }

    /// Run one task. Returns the result and where to deliver it.
    async fn handle(&mut self, frame: &[u8]) -> Result<Option<(String, TaskResult)>> {
        let task = match Task::from_bytes(frame) {
            Ok(task) => task,
            Err(e) => {
                warn!("Discarding undecodable task frame: {}", e);
                return Ok(None);
            }
        };

        let Some(backurl) = task.monitor.backurl().map(str::to_string) else {
            warn!(
                "Task {}#{} has no backurl, its result cannot be delivered",
                task.callable, task.monitor.task_no
            );
            return Ok(None);
        };

        debug!("Running {}#{}", task.callable, task.monitor.task_no);
        let registry = Arc::clone(&self.registry);
        let result = tokio::task::spawn_blocking(move || registry.execute(&task))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        if let Some(failure) = result.failure() {
            warn!("{}", failure);
        }
        self.processed += 1;
        Ok(Some((backurl, result)))
    }

    /// Push `result` to `backurl` once. A submitter that went away makes
    /// this fail instead of wait.
    async fn reply(&mut self, backurl: &str, result: &TaskResult) -> Result<()> {
        let payload = result.to_bytes()?;

        let cached = matches!(&self.reply, Some((url, _)) if url == backurl);
        if !cached {
            if let Some((_, previous)) = self.reply.take() {
                previous.close().await;
            }
            let mut socket = PushSocket::new();
            tokio::time::timeout(REPLY_CONNECT_TIMEOUT, transport::connect(&mut socket, backurl))
                .await
                .map_err(|_| Error::Unreachable(backurl.to_string()))??;
            self.reply = Some((backurl.to_string(), socket));
        }

        if let Some((_, socket)) = self.reply.as_mut() {
            transport::send_frame(socket, payload).await?;
        }
        Ok(())
    }
}
