use thiserror::Error;

use crate::task::TaskFailure;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization/Deserialization error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid host spec '{spec}': {reason}")]
    InvalidHostSpec { spec: String, reason: String },

    #[error("Unknown control command: {0}")]
    UnknownCommand(String),

    #[error("Invalid reply to {command}: {reply}")]
    InvalidReply { command: String, reply: String },

    #[error("Monitor is already bound to {0}")]
    BackurlAlreadySet(String),

    #[error(transparent)]
    TaskFailed(#[from] TaskFailure),
}
