//! Streamer
//!
//! Relay between submitters and workers:
//!
//! ```text
//!   submitters ──PUSH──► task_in (PULL, bound) ─┐
//!                                               │ relay, unchanged
//!   workers ◄──PULL──── task_out (PUSH, bound) ◄┘
//! ```
//!
//! Messages arriving before any worker connects are held until one does.

use std::future::Future;

use fanout_protocol::Endpoint;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use zeromq::{PullSocket, PushSocket, Socket, SocketRecv};

use crate::error::Result;
use crate::transport;

pub struct Streamer {
    inbound: PullSocket,
    outbound: PushSocket,
    task_in_url: String,
    task_out_url: String,
}

impl Streamer {
    /// Bind both endpoints. Ephemeral ports and ranges are resolved here.
    pub async fn bind(task_in_url: &str, task_out_url: &str) -> Result<Self> {
        let task_in: Endpoint = task_in_url.parse()?;
        let task_out: Endpoint = task_out_url.parse()?;

        let mut inbound = PullSocket::new();
        let task_in_url = transport::bind(&mut inbound, &task_in).await?;
        let mut outbound = PushSocket::new();
        let task_out_url = transport::bind(&mut outbound, &task_out).await?;

        info!("Streamer relaying {} -> {}", task_in_url, task_out_url);
        Ok(Self {
            inbound,
            outbound,
            task_in_url,
            task_out_url,
        })
    }

    pub fn task_in_url(&self) -> &str {
        &self.task_in_url
    }

    pub fn task_out_url(&self) -> &str {
        &self.task_out_url
    }

    /// Actual `(task_in, task_out)` endpoints, as peers must connect to them.
    pub fn endpoints(&self) -> (&str, &str) {
        (&self.task_in_url, &self.task_out_url)
    }

    /// Relay until Ctrl-C. Returns the number of messages relayed.
    pub async fn run(self) -> Result<u64> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, stopping streamer");
        })
        .await
    }

    /// Relay until `shutdown` resolves or the transport fails.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<u64>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut relayed = 0u64;

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = self.inbound.recv() => match received {
                    Ok(message) => message,
                    Err(e) => {
                        error!("Streamer receive on {} failed: {}", self.task_in_url, e);
                        break;
                    }
                },
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                sent = transport::send_queued(&mut self.outbound, message) => {
                    if let Err(e) = sent {
                        error!("Streamer send on {} failed: {}", self.task_out_url, e);
                        break;
                    }
                }
            }

            relayed += 1;
            debug!("Relayed message {}", relayed);
        }

        info!("Streamer stopped after relaying {} messages", relayed);
        let _ = self.inbound.close().await;
        let _ = self.outbound.close().await;
        Ok(relayed)
    }

    /// Run the relay in the background until Ctrl-C.
    pub fn spawn(self) -> JoinHandle<Result<u64>> {
        tokio::spawn(self.run())
    }
}
