//! # rkv Client Layer
//!
//! Purpose: Everything between a caller's named connection and a backend: a
//! blocking RESP2 client for real servers, the adapter that hides whether a
//! connection is local or remote, and the registry that owns connections.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **Strategy Pattern**: `KVClient` and `MemoryEngine` share `KVEngine`.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod adapter;
mod client;
mod config;
mod pool;
mod registry;
mod resp;

pub use adapter::ClientAdapter;
pub use client::{ClientConfig, ClientError, ClientResult, KVClient};
pub use config::{ConfigError, RegistryConfig};
pub use registry::{
    Connection, ConnectionInfo, ConnectionRegistry, ConnectionSpec, ReaperHandle, RegistryError,
};
pub use rkv_engine::{KVEngine, MemoryEngine};
