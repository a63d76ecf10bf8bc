use std::process::ExitStatus;

use fanout_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("ZeroMQ error: {0}")]
    Transport(#[from] zeromq::ZmqError),

    #[error("Failed to bind {endpoint}: {reason}")]
    Bind { endpoint: String, reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pool launcher for {host} exited with {status} before the control endpoint came up")]
    PoolExited { host: String, status: ExitStatus },

    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("Empty message received on {0}")]
    EmptyMessage(String),

    #[error("No reply endpoint listening at {0}")]
    Unreachable(String),

    #[error("No pool running on {0}")]
    NotRunning(String),

    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
