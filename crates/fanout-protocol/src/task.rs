//! Task, Monitor and TaskResult
//!
//! A `Task` names a callable by its registry identity and carries the
//! bincode-encoded argument tuple. The `Monitor` is the trailing element of
//! that tuple: the submitter binds it to its private reply endpoint
//! (`backurl`) and the worker pushes the `TaskResult` there.
//!
//! Results are matched to requests by count only. `task_no`, `worker_pid`
//! and `elapsed` are diagnostics.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec;
use crate::error::ProtocolError;

/// Caller-owned record attached as the last element of every task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Human-readable name of the operation being measured
    pub operation: String,

    /// Position of the task in its submission run
    pub task_no: usize,

    backurl: Option<String>,
}

impl Monitor {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            task_no: 0,
            backurl: None,
        }
    }

    pub fn with_task_no(mut self, task_no: usize) -> Self {
        self.task_no = task_no;
        self
    }

    /// Reply endpoint the worker must push the result to.
    pub fn backurl(&self) -> Option<&str> {
        self.backurl.as_deref()
    }

    /// Bind the monitor to a reply endpoint. A monitor is bound once.
    pub fn set_backurl(&mut self, backurl: impl Into<String>) -> Result<(), ProtocolError> {
        if let Some(existing) = &self.backurl {
            return Err(ProtocolError::BackurlAlreadySet(existing.clone()));
        }
        self.backurl = Some(backurl.into());
        Ok(())
    }
}

/// A unit of work: callable identity, encoded arguments and the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub callable: String,
    pub args: Vec<u8>,
    pub monitor: Monitor,
}

impl Task {
    /// Encode `args` for `callable`, with `monitor` as the trailing element.
    pub fn new<A: Serialize>(
        callable: impl Into<String>,
        args: &A,
        monitor: Monitor,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            callable: callable.into(),
            args: codec::encode(args)?,
            monitor,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        codec::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        codec::decode(bytes)
    }
}

/// Why a task did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No callable registered under the requested identity
    UnknownCallable,
    /// The argument payload did not decode into the callable's input type
    InvalidArguments,
    /// The callable returned an error
    Raised,
    /// The callable panicked
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCallable => write!(f, "unknown-callable"),
            Self::InvalidArguments => write!(f, "invalid-arguments"),
            Self::Raised => write!(f, "raised"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

/// Failure captured by a worker instead of crashing it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("task {callable}#{task_no} {kind}: {message}")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    pub callable: String,
    pub task_no: usize,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, task: &Task) -> Self {
        Self {
            kind,
            message: message.into(),
            callable: task.callable.clone(),
            task_no: task.monitor.task_no,
        }
    }
}

/// Outcome of one task as pushed back to the submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub callable: String,
    pub task_no: usize,
    pub worker_pid: u32,
    pub elapsed: Duration,
    pub outcome: Result<Vec<u8>, TaskFailure>,
}

impl TaskResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.outcome.as_ref().err()
    }

    /// Decode the success payload into the callable's output type.
    ///
    /// A captured failure is returned as `ProtocolError::TaskFailed`.
    pub fn decode<R: DeserializeOwned>(&self) -> Result<R, ProtocolError> {
        match &self.outcome {
            Ok(payload) => codec::decode(payload),
            Err(failure) => Err(ProtocolError::TaskFailed(failure.clone())),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        codec::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        codec::decode(bytes)
    }
}
