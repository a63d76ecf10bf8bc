//! Worker Master
//!
//! Control-plane client run on the submitting side. For every configured
//! host it can probe, start, stop and kill the WorkerPool listening on
//! `tcp://<host>:<ctrl_port>`.
//!
//! ```text
//!   status  : TCP connect to host:ctrl_port, closed at once
//!   start   : spawn fanout-pool locally, or `<remote_shell> host <program>`
//!   stop    : REQ "stop"  ─► pool SIGINTs its workers
//!   kill    : REQ "kill"  ─► pool SIGTERMs its workers
//!   getpid  : REQ "getpid" (a stopped host is an error)
//! ```
//!
//! Host state moves `not-running → running → not-running`. Starting a running
//! host, or stopping a stopped one, is a notice rather than an error.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use fanout_protocol::{ControlCommand, ControlReply, HostSpec};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info};
use zeromq::{ReqSocket, Socket};

use crate::config::MasterConfig;
use crate::error::{Error, Result};
use crate::pool::sibling_executable;
use crate::transport;

const POOL_PROGRAM: &str = "fanout-pool";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Running,
    NotRunning,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::NotRunning => write!(f, "not-running"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerMaster {
    task_out_url: String,
    ctrl_port: u16,
    hosts: Vec<HostSpec>,
    pool_program: Option<PathBuf>,
    remote_program: Option<String>,
    remote_shell: String,
}

impl WorkerMaster {
    pub fn new(task_out_url: &str, ctrl_port: u16, hosts: Vec<HostSpec>) -> Self {
        Self {
            task_out_url: task_out_url.to_string(),
            ctrl_port,
            hosts,
            pool_program: None,
            remote_program: None,
            remote_shell: "ssh".to_string(),
        }
    }

    pub fn from_config(config: &MasterConfig) -> Result<Self> {
        let mut master = Self::new(
            &config.network.task_out_url,
            config.network.ctrl_port,
            config.host_specs()?,
        );
        master.pool_program = config.cluster.pool_program.clone();
        master.remote_program = config.cluster.remote_program.clone();
        master.remote_shell = config.cluster.remote_shell.clone();
        Ok(master)
    }

    pub fn with_pool_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.pool_program = Some(program.into());
        self
    }

    pub fn with_remote(mut self, shell: &str, program: Option<&str>) -> Self {
        self.remote_shell = shell.to_string();
        self.remote_program = program.map(str::to_string);
        self
    }

    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    pub fn ctrl_url(&self, host: &str) -> String {
        format!("tcp://{}:{}", host, self.ctrl_port)
    }

    /// Liveness of one configured host, or of all of them.
    pub async fn status(&self, host: Option<&str>) -> Result<Vec<(String, HostState)>> {
        let mut states = Vec::new();
        for spec in self.select(host)? {
            states.push((spec.host.clone(), self.probe(&spec.host).await));
        }
        Ok(states)
    }

    /// Launch a pool on every host that is not running one yet.
    pub async fn start(&self) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(self.hosts.len());

        for spec in &self.hosts {
            if self.probe(&spec.host).await == HostState::Running {
                info!("{} already running", spec.host);
                lines.push(format!("{} already running", spec.host));
                continue;
            }

            let (program, args) = self.launch_args(spec)?;
            info!("Starting pool on {}: {} {}", spec.host, program, args.join(" "));
            let mut child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .spawn()
                .map_err(|source| Error::Spawn {
                    program: program.clone(),
                    source,
                })?;

            self.wait_until_running(spec, &mut child).await?;
            lines.push(format!("starting {}", self.ctrl_url(&spec.host)));
        }

        Ok(lines)
    }

    /// Ask every running pool to stop: workers finish their current task.
    pub async fn stop(&self) -> Result<Vec<String>> {
        self.shutdown(ControlCommand::Stop).await
    }

    /// Ask every running pool to terminate its workers immediately.
    pub async fn kill(&self) -> Result<Vec<String>> {
        self.shutdown(ControlCommand::Kill).await
    }

    /// Process id of the pool running on `host`.
    pub async fn getpid(&self, host: &str) -> Result<u32> {
        self.select(Some(host))?;
        if self.probe(host).await == HostState::NotRunning {
            return Err(Error::NotRunning(host.to_string()));
        }
        match self.request(host, ControlCommand::GetPid).await? {
            ControlReply::Pid(pid) => Ok(pid),
            ControlReply::Status(text) => Err(fanout_protocol::ProtocolError::InvalidReply {
                command: ControlCommand::GetPid.to_string(),
                reply: text,
            }
            .into()),
        }
    }

    /// Program and arguments that launch the pool for `spec`.
    pub fn launch_args(&self, spec: &HostSpec) -> Result<(String, Vec<String>)> {
        let local_program = match &self.pool_program {
            Some(program) => program.clone(),
            None => sibling_executable(POOL_PROGRAM)?,
        };
        let pool_args = vec![
            self.ctrl_url(&spec.host),
            self.task_out_url.clone(),
            spec.cores.to_string(),
        ];

        if spec.is_local() {
            return Ok((local_program.display().to_string(), pool_args));
        }

        let remote_program = self
            .remote_program
            .clone()
            .unwrap_or_else(|| local_program.display().to_string());
        let mut args = vec![spec.host.clone(), remote_program];
        args.extend(pool_args);
        Ok((self.remote_shell.clone(), args))
    }

    async fn shutdown(&self, command: ControlCommand) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(self.hosts.len());

        for spec in &self.hosts {
            if self.probe(&spec.host).await == HostState::NotRunning {
                info!("{} not running", spec.host);
                lines.push(format!("{} not running", spec.host));
                continue;
            }

            let reply = self.request(&spec.host, command).await?;
            self.wait_until_released(&spec.host).await;
            lines.push(reply.to_string());
        }

        Ok(lines)
    }

    async fn request(&self, host: &str, command: ControlCommand) -> Result<ControlReply> {
        let ctrl_url = self.ctrl_url(host);
        let mut socket = ReqSocket::new();
        transport::connect(&mut socket, &ctrl_url).await?;

        transport::send_frame(&mut socket, command.to_bytes()).await?;
        let reply = transport::recv_frame(&mut socket, &ctrl_url).await?;
        let _ = socket.close().await;

        let reply = ControlReply::parse(command, &reply)?;
        debug!("{} {} -> {}", ctrl_url, command, reply);
        Ok(reply)
    }

    async fn probe(&self, host: &str) -> HostState {
        match TcpStream::connect((host, self.ctrl_port)).await {
            Ok(_) => HostState::Running,
            Err(_) => HostState::NotRunning,
        }
    }

    async fn wait_until_running(&self, spec: &HostSpec, child: &mut Child) -> Result<()> {
        loop {
            if self.probe(&spec.host).await == HostState::Running {
                return Ok(());
            }
            if let Some(status) = child.try_wait()? {
                return Err(Error::PoolExited {
                    host: spec.host.clone(),
                    status,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_until_released(&self, host: &str) {
        while self.probe(host).await == HostState::Running {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn select(&self, host: Option<&str>) -> Result<Vec<&HostSpec>> {
        match host {
            None => Ok(self.hosts.iter().collect()),
            Some(host) => self
                .hosts
                .iter()
                .find(|spec| spec.host == host)
                .map(|spec| vec![spec])
                .ok_or_else(|| Error::UnknownHost(host.to_string())),
        }
    }
}
