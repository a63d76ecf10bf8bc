//! Pool control protocol
//!
//! Request/reply over the pool's control endpoint. Requests are the literal
//! strings `stop`, `kill` and `getpid`; replies are a human-readable status
//! line for `stop`/`kill` and a decimal process id for `getpid`.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Interrupt every worker and terminate the pool
    Stop,
    /// Terminate every worker forcefully and terminate the pool
    Kill,
    /// Ask for the pool supervisor's process id
    GetPid,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Kill => "kill",
            Self::GetPid => "getpid",
        }
    }

    /// `stop` and `kill` end the pool's control loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stop | Self::Kill)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        String::from_utf8_lossy(bytes).parse()
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "stop" => Ok(Self::Stop),
            "kill" => Ok(Self::Kill),
            "getpid" => Ok(Self::GetPid),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    Status(String),
    Pid(u32),
}

impl ControlReply {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Interpret the reply text according to the command that was sent.
    pub fn parse(command: ControlCommand, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        match command {
            ControlCommand::GetPid => text
                .trim()
                .parse()
                .map(Self::Pid)
                .map_err(|_| ProtocolError::InvalidReply {
                    command: command.to_string(),
                    reply: text,
                }),
            ControlCommand::Stop | ControlCommand::Kill => Ok(Self::Status(text)),
        }
    }
}

impl fmt::Display for ControlReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => f.write_str(status),
            Self::Pid(pid) => write!(f, "{}", pid),
        }
    }
}
