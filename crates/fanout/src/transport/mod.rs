//! Transport Module
//!
//! Thin helpers over the ZeroMQ sockets used by every component: binding
//! with port ranges and ephemeral ports, and single-frame send/receive.

mod socket;

pub use socket::{bind, connect, recv_frame, send_frame, send_queued};
