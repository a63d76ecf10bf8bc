//! Worker Pool Module
//!
//! The per-host supervisor process and the worker processes it owns.
//!
//! ```text
//!   WorkerMaster ──REQ──► WorkerPool (REP on ctrl_url)
//!                              │ spawn / SIGINT / SIGTERM / reap
//!                              ▼
//!                  fanout-worker × num_workers ──PULL── task_out_url
//! ```

mod process_manager;
mod supervisor;

pub use process_manager::{sibling_executable, WorkerHandle};
pub use supervisor::WorkerPool;
