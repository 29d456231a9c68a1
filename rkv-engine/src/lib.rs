//! # rkv-engine
//!
//! In-process stand-in for an external key-value server. `MemoryEngine`
//! implements the same `KVEngine` command contract as the network client, so
//! a connection can be served locally without callers noticing.

mod engine;
mod entry;
mod glob;
mod memory;

pub use engine::KVEngine;
pub use glob::glob_match;
pub use memory::{MemoryEngine, DEFAULT_SWEEP_INTERVAL};
pub use rkv_common::{Kind, RkvError, RkvResult, ScoredMember, TtlStatus};
