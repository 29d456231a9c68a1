//! # rkv Server
//!
//! Purpose: Serve the in-process store over RESP2 so ordinary Redis clients
//! (and `KVClient`) can talk to it.
//!
//! ## Design Principles
//! 1. **Task Per Connection**: Each accepted socket gets its own tokio task.
//! 2. **Engine Agnostic**: Dispatch goes through `dyn KVEngine`.
//! 3. **Observable**: Request counters and latency feed the `INFO` reply.

pub mod config;
pub mod metrics;
pub mod protocol;
pub mod server;

pub use config::{ConfigSource, ServerConfig};
pub use metrics::{Metrics, MetricsSnapshot};
pub use server::{execute, handle_connection, serve};
