//! Fanout wire protocol
//!
//! Types exchanged between the submitter, the streamer, the worker pools and
//! their workers.
//!
//! ```text
//! Submitter ──PUSH──► Streamer (PULL│PUSH) ──► Worker (PULL)
//!     ▲                                            │
//!     └──────────────PULL ◄── backurl ◄──PUSH──────┘
//!
//! WorkerMaster (REQ) ──"stop"/"kill"/"getpid"──► WorkerPool (REP)
//! ```
//!
//! Tasks and results travel as single-frame bincode messages, control
//! commands and their replies as single-frame UTF-8 text.

pub mod codec;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod task;

pub use codec::{decode, encode};
pub use control::{ControlCommand, ControlReply};
pub use endpoint::{Endpoint, PortSpec};
pub use error::ProtocolError;
pub use host::{parse_hosts, HostSpec};
pub use task::{FailureKind, Monitor, Task, TaskFailure, TaskResult};
