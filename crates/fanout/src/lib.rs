pub mod builtins;
pub mod config;
pub mod error;
pub mod logging;
pub mod master;
pub mod pool;
pub mod registry;
pub mod starmap;
pub mod streamer;
pub mod transport;
pub mod worker;

pub use error::{Error, Result};
pub use master::{HostState, WorkerMaster};
pub use pool::WorkerPool;
pub use registry::Registry;
pub use starmap::{Starmap, Submission};
pub use streamer::Streamer;
pub use worker::Worker;
