use std::path::PathBuf;

use fanout_protocol::{ControlCommand, ControlReply, Endpoint};
use nix::sys::signal::Signal;
use tracing::{error, info, warn};
use zeromq::{RepSocket, Socket};

use super::process_manager::{sibling_executable, WorkerHandle};
use crate::error::{Error, Result};
use crate::transport;

const WORKER_PROGRAM: &str = "fanout-worker";

/// Per-host supervisor: a fixed set of worker processes plus a REP control
/// endpoint answering `getpid`, `stop` and `kill`.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    ctrl_url: String,
    task_out_url: String,
    num_workers: usize,
    worker_program: Option<PathBuf>,
}

impl WorkerPool {
    /// `num_workers == -1` means one worker per available core.
    pub fn new(ctrl_url: &str, task_out_url: &str, num_workers: i64) -> Result<Self> {
        let num_workers = match num_workers {
            -1 => std::thread::available_parallelism()?.get(),
            n if n > 0 => n as usize,
            n => {
                return Err(Error::Config(format!(
                    "num_workers must be positive or -1, got {}",
                    n
                )))
            }
        };

        Ok(Self {
            ctrl_url: ctrl_url.to_string(),
            task_out_url: task_out_url.to_string(),
            num_workers,
            worker_program: None,
        })
    }

    /// Run this program for every worker instead of the bundled `fanout-worker`.
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn ctrl_url(&self) -> &str {
        &self.ctrl_url
    }

    /// Bind the control endpoint, spawn the workers and serve control
    /// requests until `stop` or `kill`. Returns once every worker is reaped.
    pub async fn start(self) -> Result<()> {
        let endpoint: Endpoint = self.ctrl_url.parse()?;
        let mut socket = RepSocket::new();
        let bound = transport::bind(&mut socket, &endpoint).await?;

        let program = match &self.worker_program {
            Some(program) => program.clone(),
            None => sibling_executable(WORKER_PROGRAM)?,
        };
        let args = vec![self.task_out_url.clone()];

        let mut workers = Vec::with_capacity(self.num_workers);
        for i in 0..self.num_workers {
            workers.push(WorkerHandle::spawn(&format!("worker-{}", i), &program, &args)?);
        }

        info!(
            "WorkerPool {} (pid {}) serving {} workers on {}",
            bound,
            std::process::id(),
            workers.len(),
            self.task_out_url
        );

        let result = self.serve(&mut socket, &workers).await;
        let _ = socket.close().await;

        let reaped = tokio::task::spawn_blocking(move || {
            for mut worker in workers {
                match worker.wait() {
                    Ok(Some(status)) => info!("{} exited with {}", worker.worker_id(), status),
                    Ok(None) => {}
                    Err(e) => warn!("Failed to reap {}: {}", worker.worker_id(), e),
                }
            }
        })
        .await;
        if let Err(e) = reaped {
            error!("Reaping workers failed: {}", e);
        }

        result
    }

    async fn serve(&self, socket: &mut RepSocket, workers: &[WorkerHandle]) -> Result<()> {
        loop {
            let request = tokio::select! {
                request = transport::recv_frame(socket, &self.ctrl_url) => request?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, stopping workers");
                    self.signal_all(workers, Signal::SIGINT);
                    return Ok(());
                }
            };

            let command = match ControlCommand::from_bytes(&request) {
                Ok(command) => command,
                Err(e) => {
                    warn!("Rejected control request: {}", e);
                    transport::send_frame(socket, e.to_string().into_bytes()).await?;
                    continue;
                }
            };

            match command {
                ControlCommand::Stop => self.signal_all(workers, Signal::SIGINT),
                ControlCommand::Kill => self.signal_all(workers, Signal::SIGTERM),
                ControlCommand::GetPid => {}
            }

            let reply = self.reply_for(command);
            info!("{} -> {}", command, reply);
            transport::send_frame(socket, reply.to_bytes()).await?;

            if command.is_terminal() {
                return Ok(());
            }
        }
    }

    fn reply_for(&self, command: ControlCommand) -> ControlReply {
        match command {
            ControlCommand::GetPid => ControlReply::Pid(std::process::id()),
            ControlCommand::Stop => {
                ControlReply::Status(format!("WorkerPool {} stopped", self.ctrl_url))
            }
            ControlCommand::Kill => {
                ControlReply::Status(format!("WorkerPool {} killed", self.ctrl_url))
            }
        }
    }

    fn signal_all(&self, workers: &[WorkerHandle], sig: Signal) {
        for worker in workers {
            if let Err(e) = worker.signal(sig) {
                warn!("{}: {}", worker.worker_id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count() {
        let pool = WorkerPool::new("tcp://127.0.0.1:1909", "tcp://127.0.0.1:1910", 3).unwrap();
        assert_eq!(pool.num_workers(), 3);

        let pool = WorkerPool::new("tcp://127.0.0.1:1909", "tcp://127.0.0.1:1910", -1).unwrap();
        assert!(pool.num_workers() >= 1);

        assert!(WorkerPool::new("tcp://127.0.0.1:1909", "tcp://127.0.0.1:1910", 0).is_err());
        assert!(WorkerPool::new("tcp://127.0.0.1:1909", "tcp://127.0.0.1:1910", -2).is_err());
    }

    #[test]
    fn test_replies() {
        let pool = WorkerPool::new("tcp://127.0.0.1:1909", "tcp://127.0.0.1:1910", 1).unwrap();
        assert_eq!(
            pool.reply_for(ControlCommand::Stop).to_string(),
            "WorkerPool tcp://127.0.0.1:1909 stopped"
        );
        assert_eq!(
            pool.reply_for(ControlCommand::Kill).to_string(),
            "WorkerPool tcp://127.0.0.1:1909 killed"
        );
        assert_eq!(
            pool.reply_for(ControlCommand::GetPid),
            ControlReply::Pid(std::process::id())
        );
    }

    #[tokio::test]
    async fn test_control_loop_with_stub_workers() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let ctrl_url = format!("tcp://127.0.0.1:{}", port);

        // stub workers run `sleep 30` until signalled
        let pool = WorkerPool::new(&ctrl_url, "30", 2)
            .unwrap()
            .with_worker_program("sleep");
        let running = tokio::spawn(pool.start());

        let mut req = zeromq::ReqSocket::new();
        transport::connect(&mut req, &ctrl_url).await.unwrap();

        for _ in 0..2 {
            transport::send_frame(&mut req, b"getpid".to_vec()).await.unwrap();
            let reply = transport::recv_frame(&mut req, "ctrl").await.unwrap();
            assert_eq!(
                ControlReply::parse(ControlCommand::GetPid, &reply).unwrap(),
                ControlReply::Pid(std::process::id())
            );
        }

        transport::send_frame(&mut req, b"restart".to_vec()).await.unwrap();
        let reply = transport::recv_frame(&mut req, "ctrl").await.unwrap();
        assert!(String::from_utf8_lossy(&reply).contains("restart"));

        transport::send_frame(&mut req, b"kill".to_vec()).await.unwrap();
        let reply = transport::recv_frame(&mut req, "ctrl").await.unwrap();
        assert_eq!(reply, format!("WorkerPool {} killed", ctrl_url).into_bytes());

        running.await.unwrap().unwrap();
    }
}
