//! # Command Contract
//!
//! `KVEngine` is the strategy seam between callers and backends: the
//! in-process `MemoryEngine` and the network `KVClient` both implement it, and
//! adapters dispatch through `&dyn KVEngine`.
//!
//! Conventions shared by every implementation:
//! - A zero `ttl` on `set`/`set_nx` means "no expiry".
//! - `get`, `hget`, `lpop`, `rpop`, `zscore` report absence as `RkvError::Nil`;
//!   other reads return an empty value for absent keys.
//! - Typed commands against a key of another kind fail with
//!   `RkvError::WrongType` and leave the key untouched (`get` reports `Nil`).
//! - `lpush(key, [v1..vn])` leaves the list starting with `v1..vn` in order.
//! - Range commands accept negative indices counted from the tail and clamp
//!   out-of-range bounds; an empty range is not an error.

use std::collections::HashMap;
use std::time::Duration;

use rkv_common::{RkvResult, ScoredMember, TtlStatus};

/// Uniform command surface over an in-process or remote store.
pub trait KVEngine: Send + Sync {
    /// Returns `"PONG"` while the backend is usable.
    fn ping(&self) -> RkvResult<String>;

    /// Releases the backend; later commands fail with `Closed`. Idempotent.
    fn close(&self) -> RkvResult<()>;

    fn get(&self, key: &str) -> RkvResult<String>;

    /// Overwrites any prior value with a string.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> RkvResult<()>;

    /// Writes only when the key is absent; returns whether it wrote.
    fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> RkvResult<bool>;

    /// Returns how many of `keys` were removed.
    fn del(&self, keys: &[&str]) -> RkvResult<i64>;

    /// Returns how many of `keys` exist (duplicates counted each time).
    fn exists(&self, keys: &[&str]) -> RkvResult<i64>;

    /// Sets a relative expiry; `false` when the key is absent.
    fn expire(&self, key: &str, ttl: Duration) -> RkvResult<bool>;

    fn ttl(&self, key: &str) -> RkvResult<TtlStatus>;

    fn hget(&self, key: &str, field: &str) -> RkvResult<String>;

    /// Takes a flat `field, value, field, value, ...` slice and returns the
    /// number of fields that did not exist before.
    fn hset(&self, key: &str, field_values: &[&str]) -> RkvResult<i64>;

    fn hdel(&self, key: &str, fields: &[&str]) -> RkvResult<i64>;

    fn hexists(&self, key: &str, field: &str) -> RkvResult<bool>;

    fn hgetall(&self, key: &str) -> RkvResult<HashMap<String, String>>;

    fn hkeys(&self, key: &str) -> RkvResult<Vec<String>>;

    fn hvals(&self, key: &str) -> RkvResult<Vec<String>>;

    /// Prepends `values` as a block; returns the new length.
    fn lpush(&self, key: &str, values: &[&str]) -> RkvResult<i64>;

    /// Appends `values` in order; returns the new length.
    fn rpush(&self, key: &str, values: &[&str]) -> RkvResult<i64>;

    fn lpop(&self, key: &str) -> RkvResult<String>;

    fn rpop(&self, key: &str) -> RkvResult<String>;

    fn llen(&self, key: &str) -> RkvResult<i64>;

    fn lrange(&self, key: &str, start: i64, stop: i64) -> RkvResult<Vec<String>>;

    /// Returns the number of members that were not already present.
    fn sadd(&self, key: &str, members: &[&str]) -> RkvResult<i64>;

    fn srem(&self, key: &str, members: &[&str]) -> RkvResult<i64>;

    fn smembers(&self, key: &str) -> RkvResult<Vec<String>>;

    fn sismember(&self, key: &str, member: &str) -> RkvResult<bool>;

    fn scard(&self, key: &str) -> RkvResult<i64>;

    /// Returns the number of newly inserted members; score updates to
    /// existing members are not counted.
    fn zadd(&self, key: &str, members: &[ScoredMember]) -> RkvResult<i64>;

    fn zrem(&self, key: &str, members: &[&str]) -> RkvResult<i64>;

    fn zrange(&self, key: &str, start: i64, stop: i64) -> RkvResult<Vec<String>>;

    fn zrange_with_scores(&self, key: &str, start: i64, stop: i64)
        -> RkvResult<Vec<ScoredMember>>;

    fn zcard(&self, key: &str) -> RkvResult<i64>;

    fn zscore(&self, key: &str, member: &str) -> RkvResult<f64>;

    /// Returns live keys matching a glob pattern.
    fn keys(&self, pattern: &str) -> RkvResult<Vec<String>>;

    /// Returns the kind name, or `"none"`.
    fn key_type(&self, key: &str) -> RkvResult<String>;

    fn flush_db(&self) -> RkvResult<()>;

    fn flush_all(&self) -> RkvResult<()>;

    /// Switches the logical database (`0..=15`).
    fn select(&self, index: i64) -> RkvResult<()>;

    fn db_size(&self) -> RkvResult<i64>;
}
