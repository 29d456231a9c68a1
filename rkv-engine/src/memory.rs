//! # In-Memory Engine
//!
//! Provide the in-process stand-in for an external key-value server: five
//! value kinds, TTL expiry, range queries and glob key listing, behind the
//! same `KVEngine` contract the network client implements.
//!
//! ## Usage
//!
//! - Use `MemoryEngine::new()` for an engine whose sweeper runs every second.
//! - Use `MemoryEngine::with_sweep_interval` to tune the background sweep.
//! - Call `close()` (or drop the engine) to stop the sweeper thread.
//!
//! ## Design Principles
//!
//! 1. **Single RwLock**: One reader/writer lock guards the whole map. Reads
//!    share it, writes hold it exclusively, and each command is one critical
//!    section.
//! 2. **Two Expiry Paths**: Every command checks its target key's deadline on
//!    access; a background sweeper removes keys nobody touches again. Both use
//!    `Entry::is_expired`.
//! 3. **Tagged Values**: Each entry holds a `Value` variant, so a kind mismatch
//!    is a `WrongType` result rather than a failed cast.
//! 4. **Copy Out**: Reads return owned copies; nothing outside the lock holds a
//!    reference into a container.
//! 5. **Strategy Pattern**: Implements `KVEngine` to keep callers decoupled.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryEngine
//!   ├── shared: Arc<Shared>
//!   │     └── inner: RwLock<StoreInner>
//!   │           ├── map: HashMap<String, Entry>
//!   │           │     └── Entry { value: Value, created_at, expires_at }
//!   │           ├── db: selected index (not partitioned)
//!   │           └── closed
//!   └── expirer: Mutex<Option<ExpirationHandle>>
//!         └── thread: sleeps `interval`, then Shared::purge_expired
//! ```

use std::collections::HashMap as StdHashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use rkv_common::{check_db_index, Kind, RkvError, RkvResult, ScoredMember, TtlStatus};

use crate::engine::KVEngine;
use crate::entry::{deadline, Entry, Value};
use crate::glob::glob_match;

/// Default pause between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

const PONG: &str = "PONG";

/// Map plus lifecycle state, guarded together by the engine lock.
#[derive(Debug)]
struct StoreInner {
    map: HashMap<String, Entry, RandomState>,
    /// Selected logical database. Recorded only; data is not partitioned.
    db: u8,
    closed: bool,
}

impl StoreInner {
    fn new() -> Self {
        StoreInner {
            map: HashMap::with_hasher(RandomState::new()),
            db: 0,
            closed: false,
        }
    }

    fn ensure_open(&self) -> RkvResult<()> {
        if self.closed {
            return Err(RkvError::Closed);
        }
        Ok(())
    }

    /// Removes `key` if its deadline has passed. Returns true when removed.
    fn purge_if_expired(&mut self, key: &str, now: Instant) -> bool {
        let expired = self
            .map
            .get(key)
            .map(|entry| entry.is_expired(now))
            .unwrap_or(false);
        if expired {
            self.map.remove(key);
        }
        expired
    }

    /// Returns the live entry for `key`, removing it first if expired.
    fn live_mut(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        self.purge_if_expired(key, now);
        self.map.get_mut(key)
    }

    /// Returns the live entry for `key`, creating an empty container of
    /// `kind` when the key is absent. An existing entry of another kind is
    /// returned untouched so the caller's accessor reports `WrongType`.
    fn live_or_insert(&mut self, key: &str, kind: Kind, now: Instant) -> &mut Entry {
        self.purge_if_expired(key, now);
        self.map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::empty(kind), now, None))
    }

    /// Deletes `key` if it holds an empty container.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = self
            .map
            .get(key)
            .map(|entry| entry.value.is_empty_container())
            .unwrap_or(false);
        if empty {
            self.map.remove(key);
        }
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.is_expired(now));
        before - self.map.len()
    }
}

/// State shared between the engine handle and its sweeper thread.
#[derive(Debug)]
struct Shared {
    inner: RwLock<StoreInner>,
}

impl Shared {
    /// Removes expired entries. O(n) under the write lock.
    fn purge_expired(&self, now: Instant) -> usize {
        let mut inner = self.inner.write();
        if inner.closed {
            return 0;
        }
        inner.purge_expired(now)
    }

    /// Removes keys a reader found expired. The deadline is re-checked
    /// because another writer may have replaced the entry in between.
    fn purge_keys(&self, keys: &[&str]) {
        let now = Instant::now();
        let mut inner = self.inner.write();
        for key in keys {
            inner.purge_if_expired(key, now);
        }
    }
}

/// Handle for the background expiration sweeper.
///
/// Call `stop` to signal shutdown and join the thread.
#[derive(Debug)]
struct ExpirationHandle {
    stop: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ExpirationHandle {
    /// Starts a thread that purges expired entries every `interval`.
    ///
    /// The stop signal interrupts the wait, so shutdown does not lag by a
    /// full interval.
    fn start(shared: Arc<Shared>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };

        let (stop, stop_rx) = mpsc::channel::<()>();
        let join = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let removed = shared.purge_expired(Instant::now());
                    if removed > 0 {
                        debug!(removed, "swept expired keys");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        ExpirationHandle {
            stop,
            join: Some(join),
        }
    }

    /// Stops the sweeper and waits for the thread to finish.
    fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// In-process multi-kind store implementing `KVEngine`.
///
/// Lifecycle is `Open -> Closed`. Every command fails with `RkvError::Closed`
/// after `close()`; closing twice is a no-op.
#[derive(Debug)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
    expirer: Mutex<Option<ExpirationHandle>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an engine with the default one-second sweep.
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates an engine whose sweeper runs every `interval`.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            inner: RwLock::new(StoreInner::new()),
        });
        let expirer = ExpirationHandle::start(Arc::clone(&shared), interval);
        MemoryEngine {
            shared,
            expirer: Mutex::new(Some(expirer)),
        }
    }

    /// Removes expired entries now, independent of the sweeper schedule.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired(Instant::now())
    }

    /// Currently selected logical database index.
    pub fn selected_db(&self) -> u8 {
        self.shared.inner.read().db
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.read().closed
    }

    /// Number of physically stored entries, expired ones included.
    pub fn stored_len(&self) -> usize {
        self.shared.inner.read().map.len()
    }

    /// Time since the key was created (or last overwritten by `set`).
    pub fn key_age(&self, key: &str) -> RkvResult<Duration> {
        let now = Instant::now();
        self.read_key(key, now, |entry| {
            let entry = entry.ok_or(RkvError::Nil)?;
            Ok(now.saturating_duration_since(entry.created_at))
        })
    }

    /// Runs `f` on the live entry for `key` under the shared lock.
    ///
    /// An expired entry is passed as `None` and removed after the read lock
    /// is released.
    fn read_key<T>(
        &self,
        key: &str,
        now: Instant,
        f: impl FnOnce(Option<&Entry>) -> RkvResult<T>,
    ) -> RkvResult<T> {
        let inner = self.shared.inner.read();
        inner.ensure_open()?;
        let (result, expired) = match inner.map.get(key) {
            Some(entry) if entry.is_expired(now) => (f(None), true),
            other => (f(other), false),
        };
        drop(inner);

        if expired {
            self.shared.purge_keys(&[key]);
        }
        result
    }

    /// Runs `f` with exclusive access to the map.
    fn write<T>(&self, f: impl FnOnce(&mut StoreInner, Instant) -> RkvResult<T>) -> RkvResult<T> {
        let now = Instant::now();
        let mut inner = self.shared.inner.write();
        inner.ensure_open()?;
        f(&mut inner, now)
    }

    /// Shared body of `lpush`/`rpush`.
    fn push(&self, key: &str, values: &[&str], front: bool) -> RkvResult<i64> {
        if values.is_empty() {
            return Err(RkvError::InvalidArgument(
                "wrong number of arguments for push".to_string(),
            ));
        }
        self.write(|inner, now| {
            let list = inner.live_or_insert(key, Kind::List, now).value.as_list_mut()?;
            if front {
                // Walk backwards so the block keeps the caller's order at the head.
                for value in values.iter().rev() {
                    list.push_front((*value).to_string());
                }
            } else {
                list.extend(values.iter().map(|value| (*value).to_string()));
            }
            Ok(list.len() as i64)
        })
    }

    /// Shared body of `lpop`/`rpop`.
    fn pop(&self, key: &str, front: bool) -> RkvResult<String> {
        self.write(|inner, now| {
            let entry = inner.live_mut(key, now).ok_or(RkvError::Nil)?;
            let list = entry.value.as_list_mut()?;
            let popped = if front {
                list.pop_front()
            } else {
                list.pop_back()
            };
            inner.drop_if_empty(key);
            popped.ok_or(RkvError::Nil)
        })
    }

    /// Members of a sorted set ordered by score, ties broken by member.
    fn sorted_members(&self, key: &str, start: i64, stop: i64) -> RkvResult<Vec<ScoredMember>> {
        self.read_key(key, Instant::now(), |entry| {
            let zset = match entry {
                Some(entry) => entry.value.as_zset()?,
                None => return Ok(Vec::new()),
            };
            let mut members: Vec<ScoredMember> = zset
                .iter()
                .map(|(member, score)| ScoredMember::new(member.clone(), *score))
                .collect();
            members.sort_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then_with(|| a.member.cmp(&b.member))
            });
            Ok(match clamp_range(start, stop, members.len()) {
                Some((from, to)) => members.drain(from..=to).collect(),
                None => Vec::new(),
            })
        })
    }

    /// Counts live keys among `keys` under the shared lock.
    fn count_live(&self, keys: &[&str]) -> RkvResult<i64> {
        let now = Instant::now();
        let inner = self.shared.inner.read();
        inner.ensure_open()?;
        let mut count = 0;
        let mut expired = Vec::new();
        for key in keys {
            match inner.map.get(*key) {
                Some(entry) if entry.is_expired(now) => expired.push(*key),
                Some(_) => count += 1,
                None => {}
            }
        }
        drop(inner);

        if !expired.is_empty() {
            self.shared.purge_keys(&expired);
        }
        Ok(count)
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.expirer.get_mut().take() {
            handle.stop();
        }
    }
}

impl KVEngine for MemoryEngine {
    fn ping(&self) -> RkvResult<String> {
        self.shared.inner.read().ensure_open()?;
        Ok(PONG.to_string())
    }

    /// Marks the engine closed, drops its data, and joins the sweeper.
    fn close(&self) -> RkvResult<()> {
        {
            let mut inner = self.shared.inner.write();
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
            inner.map.clear();
        }

        if let Some(handle) = self.expirer.lock().take() {
            handle.stop();
        }
        info!("memory engine closed");
        Ok(())
    }

    /// Non-string kinds read as `Nil`, the same as a missing key.
    fn get(&self, key: &str) -> RkvResult<String> {
        self.read_key(key, Instant::now(), |entry| match entry.map(|entry| &entry.value) {
            Some(Value::String(value)) => Ok(value.clone()),
            _ => Err(RkvError::Nil),
        })
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> RkvResult<()> {
        self.write(|inner, now| {
            let expires_at = deadline(now, ttl)?;
            let entry = Entry::new(Value::String(value.to_string()), now, expires_at);
            inner.map.insert(key.to_string(), entry);
            Ok(())
        })
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> RkvResult<bool> {
        self.write(|inner, now| {
            let expires_at = deadline(now, ttl)?;
            if inner.live_mut(key, now).is_some() {
                return Ok(false);
            }
            let entry = Entry::new(Value::String(value.to_string()), now, expires_at);
            inner.map.insert(key.to_string(), entry);
            Ok(true)
        })
    }

    /// Expired keys are removed but not counted.
    fn del(&self, keys: &[&str]) -> RkvResult<i64> {
        self.write(|inner, now| {
            let mut removed = 0;
            for key in keys {
                if let Some(entry) = inner.map.remove(*key) {
                    if !entry.is_expired(now) {
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        })
    }

    fn exists(&self, keys: &[&str]) -> RkvResult<i64> {
        self.count_live(keys)
    }

    /// A zero `ttl` deletes the key immediately.
    fn expire(&self, key: &str, ttl: Duration) -> RkvResult<bool> {
        self.write(|inner, now| {
            let expires_at = deadline(now, ttl)?;
            let entry = match inner.live_mut(key, now) {
                Some(entry) => entry,
                None => return Ok(false),
            };
            match expires_at {
                Some(at) => entry.expires_at = Some(at),
                None => {
                    inner.map.remove(key);
                }
            }
            Ok(true)
        })
    }

    fn ttl(&self, key: &str) -> RkvResult<TtlStatus> {
        let now = Instant::now();
        self.read_key(key, now, |entry| {
            Ok(match entry {
                None => TtlStatus::Missing,
                Some(entry) => match entry.expires_at {
                    None => TtlStatus::NoExpiry,
                    Some(at) => TtlStatus::ExpiresIn(at.saturating_duration_since(now)),
                },
            })
        })
    }

    fn hget(&self, key: &str, field: &str) -> RkvResult<String> {
        self.read_key(key, Instant::now(), |entry| {
            let entry = entry.ok_or(RkvError::Nil)?;
            entry.value.as_hash()?.get(field).cloned().ok_or(RkvError::Nil)
        })
    }

    fn hset(&self, key: &str, field_values: &[&str]) -> RkvResult<i64> {
        if field_values.is_empty() || field_values.len() % 2 != 0 {
            return Err(RkvError::InvalidArgument(
                "wrong number of arguments for HSET".to_string(),
            ));
        }
        self.write(|inner, now| {
            let hash = inner.live_or_insert(key, Kind::Hash, now).value.as_hash_mut()?;
            let mut created = 0;
            for pair in field_values.chunks_exact(2) {
                if hash.insert(pair[0].to_string(), pair[1].to_string()).is_none() {
                    created += 1;
                }
            }
            Ok(created)
        })
    }

    fn hdel(&self, key: &str, fields: &[&str]) -> RkvResult<i64> {
        self.write(|inner, now| {
            let hash = match inner.live_mut(key, now) {
                Some(entry) => entry.value.as_hash_mut()?,
                None => return Ok(0),
            };
            let removed = fields.iter().filter(|field| hash.remove(**field).is_some()).count();
            inner.drop_if_empty(key);
            Ok(removed as i64)
        })
    }

    fn hexists(&self, key: &str, field: &str) -> RkvResult<bool> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_hash()?.contains_key(field)),
            None => Ok(false),
        })
    }

    fn hgetall(&self, key: &str) -> RkvResult<StdHashMap<String, String>> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_hash()?.clone()),
            None => Ok(StdHashMap::new()),
        })
    }

    fn hkeys(&self, key: &str) -> RkvResult<Vec<String>> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_hash()?.keys().cloned().collect()),
            None => Ok(Vec::new()),
        })
    }

    fn hvals(&self, key: &str) -> RkvResult<Vec<String>> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_hash()?.values().cloned().collect()),
            None => Ok(Vec::new()),
        })
    }

    fn lpush(&self, key: &str, values: &[&str]) -> RkvResult<i64> {
        self.push(key, values, true)
    }

    fn rpush(&self, key: &str, values: &[&str]) -> RkvResult<i64> {
        self.push(key, values, false)
    }

    fn lpop(&self, key: &str) -> RkvResult<String> {
        self.pop(key, true)
    }

    fn rpop(&self, key: &str) -> RkvResult<String> {
        self.pop(key, false)
    }

    fn llen(&self, key: &str) -> RkvResult<i64> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_list()?.len() as i64),
            None => Ok(0),
        })
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> RkvResult<Vec<String>> {
        self.read_key(key, Instant::now(), |entry| {
            let list = match entry {
                Some(entry) => entry.value.as_list()?,
                None => return Ok(Vec::new()),
            };
            Ok(match clamp_range(start, stop, list.len()) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            })
        })
    }

    fn sadd(&self, key: &str, members: &[&str]) -> RkvResult<i64> {
        if members.is_empty() {
            return Err(RkvError::InvalidArgument(
                "wrong number of arguments for SADD".to_string(),
            ));
        }
        self.write(|inner, now| {
            let set = inner.live_or_insert(key, Kind::Set, now).value.as_set_mut()?;
            let added = members
                .iter()
                .filter(|member| set.insert((**member).to_string()))
                .count();
            Ok(added as i64)
        })
    }

    fn srem(&self, key: &str, members: &[&str]) -> RkvResult<i64> {
        self.write(|inner, now| {
            let set = match inner.live_mut(key, now) {
                Some(entry) => entry.value.as_set_mut()?,
                None => return Ok(0),
            };
            let removed = members.iter().filter(|member| set.remove(**member)).count();
            inner.drop_if_empty(key);
            Ok(removed as i64)
        })
    }

    fn smembers(&self, key: &str) -> RkvResult<Vec<String>> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_set()?.iter().cloned().collect()),
            None => Ok(Vec::new()),
        })
    }

    fn sismember(&self, key: &str, member: &str) -> RkvResult<bool> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_set()?.contains(member)),
            None => Ok(false),
        })
    }

    fn scard(&self, key: &str) -> RkvResult<i64> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_set()?.len() as i64),
            None => Ok(0),
        })
    }

    fn zadd(&self, key: &str, members: &[ScoredMember]) -> RkvResult<i64> {
        if members.is_empty() {
            return Err(RkvError::InvalidArgument(
                "wrong number of arguments for ZADD".to_string(),
            ));
        }
        if members.iter().any(|member| member.score.is_nan()) {
            return Err(RkvError::InvalidArgument("score is not a number".to_string()));
        }
        self.write(|inner, now| {
            let zset = inner
                .live_or_insert(key, Kind::SortedSet, now)
                .value
                .as_zset_mut()?;
            let mut added = 0;
            for member in members {
                if zset.insert(member.member.clone(), member.score).is_none() {
                    added += 1;
                }
            }
            Ok(added)
        })
    }

    fn zrem(&self, key: &str, members: &[&str]) -> RkvResult<i64> {
        self.write(|inner, now| {
            let zset = match inner.live_mut(key, now) {
                Some(entry) => entry.value.as_zset_mut()?,
                None => return Ok(0),
            };
            let removed = members.iter().filter(|member| zset.remove(**member).is_some()).count();
            inner.drop_if_empty(key);
            Ok(removed as i64)
        })
    }

    fn zrange(&self, key: &str, start: i64, stop: i64) -> RkvResult<Vec<String>> {
        let members = self.sorted_members(key, start, stop)?;
        Ok(members.into_iter().map(|scored| scored.member).collect())
    }

    fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> RkvResult<Vec<ScoredMember>> {
        self.sorted_members(key, start, stop)
    }

    fn zcard(&self, key: &str) -> RkvResult<i64> {
        self.read_key(key, Instant::now(), |entry| match entry {
            Some(entry) => Ok(entry.value.as_zset()?.len() as i64),
            None => Ok(0),
        })
    }

    fn zscore(&self, key: &str, member: &str) -> RkvResult<f64> {
        self.read_key(key, Instant::now(), |entry| {
            let entry = entry.ok_or(RkvError::Nil)?;
            entry.value.as_zset()?.get(member).copied().ok_or(RkvError::Nil)
        })
    }

    /// Returned keys are sorted for stable output.
    fn keys(&self, pattern: &str) -> RkvResult<Vec<String>> {
        let now = Instant::now();
        let inner = self.shared.inner.read();
        inner.ensure_open()?;
        let mut keys: Vec<String> = inner
            .map
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    fn key_type(&self, key: &str) -> RkvResult<String> {
        self.read_key(key, Instant::now(), |entry| {
            Ok(entry.map(|entry| entry.kind().as_str()).unwrap_or("none").to_string())
        })
    }

    fn flush_db(&self) -> RkvResult<()> {
        self.write(|inner, _| {
            inner.map.clear();
            Ok(())
        })
    }

    /// Same as `flush_db`: there is only one logical map.
    fn flush_all(&self) -> RkvResult<()> {
        self.flush_db()
    }

    /// Validates and records the index without partitioning data.
    fn select(&self, index: i64) -> RkvResult<()> {
        let db = check_db_index(index)?;
        self.write(|inner, _| {
            inner.db = db;
            Ok(())
        })
    }

    fn db_size(&self) -> RkvResult<i64> {
        let now = Instant::now();
        let inner = self.shared.inner.read();
        inner.ensure_open()?;
        Ok(inner.map.values().filter(|entry| !entry.is_expired(now)).count() as i64)
    }
}

/// Resolves `start..=stop` against a sequence of `len` items.
///
/// Negative indices count from the tail (`-1` is the last item); bounds are
/// clamped, and `None` means the range is empty.
fn clamp_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MemoryEngine {
        MemoryEngine::with_sweep_interval(Duration::from_millis(5))
    }

    #[test]
    fn set_get_roundtrip() {
        let engine = engine();
        engine.set("alpha", "value", Duration::ZERO).unwrap();
        assert_eq!(engine.get("alpha").unwrap(), "value");
    }

    #[test]
    fn set_overwrites_any_kind() {
        let engine = engine();
        engine.rpush("alpha", &["a", "b"]).unwrap();
        engine.set("alpha", "value", Duration::ZERO).unwrap();
        assert_eq!(engine.key_type("alpha").unwrap(), "string");
        assert_eq!(engine.get("alpha").unwrap(), "value");
    }

    #[test]
    fn get_on_other_kind_is_nil() {
        let engine = engine();
        engine.sadd("s", &["a"]).unwrap();
        assert_eq!(engine.get("s"), Err(RkvError::Nil));
    }

    #[test]
    fn set_nx_only_when_absent() {
        let engine = engine();
        assert!(engine.set_nx("k", "first", Duration::ZERO).unwrap());
        assert!(!engine.set_nx("k", "second", Duration::ZERO).unwrap());
        assert_eq!(engine.get("k").unwrap(), "first");
    }

    #[test]
    fn set_nx_replaces_expired_key() {
        let engine = engine();
        engine.set("k", "old", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(3));
        assert!(engine.set_nx("k", "new", Duration::ZERO).unwrap());
        assert_eq!(engine.get("k").unwrap(), "new");
    }

    #[test]
    fn delete_counts_only_live_keys() {
        let engine = engine();
        engine.set("a", "1", Duration::ZERO).unwrap();
        engine.set("b", "2", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(3));
        assert_eq!(engine.del(&["a", "b", "c"]).unwrap(), 1);
        assert_eq!(engine.stored_len(), 0);
    }

    #[test]
    fn exists_counts_duplicates() {
        let engine = engine();
        engine.set("a", "1", Duration::ZERO).unwrap();
        assert_eq!(engine.exists(&["a", "a", "missing"]).unwrap(), 2);
    }

    #[test]
    fn expire_hides_value() {
        let engine = engine();
        engine.set("alpha", "value", Duration::ZERO).unwrap();
        assert!(engine.expire("alpha", Duration::from_millis(1)).unwrap());
        std::thread::sleep(Duration::from_millis(3));
        assert_eq!(engine.get("alpha"), Err(RkvError::Nil));
        assert_eq!(engine.ttl("alpha").unwrap(), TtlStatus::Missing);
    }

    #[test]
    fn expire_missing_key_returns_false() {
        let engine = engine();
        assert!(!engine.expire("missing", Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn oversized_ttl_is_rejected_without_mutation() {
        let engine = engine();
        let invalid = Err(RkvError::InvalidArgument("invalid expire time".to_string()));
        engine.set("alpha", "value", Duration::ZERO).unwrap();

        assert_eq!(
            engine.expire("alpha", Duration::from_secs(i64::MAX as u64)),
            invalid.clone().map(|()| false)
        );
        assert_eq!(engine.set("alpha", "other", Duration::MAX), invalid);
        assert_eq!(
            engine.set_nx("beta", "value", Duration::MAX),
            invalid.map(|()| false)
        );

        assert_eq!(engine.get("alpha").unwrap(), "value");
        assert_eq!(engine.ttl("alpha").unwrap(), TtlStatus::NoExpiry);
        assert_eq!(engine.exists(&["beta"]).unwrap(), 0);
    }

    #[test]
    fn zero_expire_deletes_immediately() {
        let engine = engine();
        engine.set("alpha", "value", Duration::ZERO).unwrap();
        assert!(engine.expire("alpha", Duration::ZERO).unwrap());
        assert_eq!(engine.exists(&["alpha"]).unwrap(), 0);
    }

    #[test]
    fn ttl_reports_missing_or_expiry() {
        let engine = engine();
        assert_eq!(engine.ttl("missing").unwrap(), TtlStatus::Missing);

        engine.set("alpha", "value", Duration::ZERO).unwrap();
        assert_eq!(engine.ttl("alpha").unwrap(), TtlStatus::NoExpiry);
        assert_eq!(engine.ttl("alpha").unwrap().as_secs(), -1);

        engine.expire("alpha", Duration::from_secs(10)).unwrap();
        let secs = engine.ttl("alpha").unwrap().as_secs();
        assert!((9..=10).contains(&secs), "ttl was {}", secs);
    }

    #[test]
    fn lazy_expiry_removes_entry_on_read() {
        let engine = MemoryEngine::with_sweep_interval(Duration::from_secs(3600));
        engine.set("alpha", "value", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(3));
        assert_eq!(engine.stored_len(), 1);
        assert_eq!(engine.key_type("alpha").unwrap(), "none");
        assert_eq!(engine.stored_len(), 0);
    }

    #[test]
    fn purge_expired_removes_entries() {
        let engine = MemoryEngine::with_sweep_interval(Duration::from_secs(3600));
        engine.set("alpha", "value", Duration::from_millis(1)).unwrap();
        engine.set("beta", "value", Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(3));

        assert_eq!(engine.purge_expired(), 1);
        assert_eq!(engine.stored_len(), 1);
    }

    #[test]
    fn expirer_thread_clears_expired() {
        let engine = MemoryEngine::with_sweep_interval(Duration::from_millis(1));
        engine.set("alpha", "value", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.stored_len(), 0);
    }

    #[test]
    fn hash_commands() {
        let engine = engine();
        assert_eq!(engine.hset("h", &["f1", "v1", "f2", "v2"]).unwrap(), 2);
        assert_eq!(engine.hset("h", &["f1", "v1b", "f3", "v3"]).unwrap(), 1);
        assert_eq!(engine.hget("h", "f1").unwrap(), "v1b");
        assert_eq!(engine.hget("h", "nope"), Err(RkvError::Nil));
        assert!(engine.hexists("h", "f2").unwrap());

        let mut keys = engine.hkeys("h").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["f1", "f2", "f3"]);
        assert_eq!(engine.hvals("h").unwrap().len(), 3);
        assert_eq!(engine.hgetall("h").unwrap().get("f3").map(String::as_str), Some("v3"));

        assert_eq!(engine.hdel("h", &["f1", "f2", "f3", "nope"]).unwrap(), 3);
        assert_eq!(engine.key_type("h").unwrap(), "none");
    }

    #[test]
    fn hset_rejects_odd_arguments() {
        let engine = engine();
        assert!(matches!(
            engine.hset("h", &["f1", "v1", "f2"]),
            Err(RkvError::InvalidArgument(_))
        ));
        assert_eq!(engine.exists(&["h"]).unwrap(), 0);
    }

    #[test]
    fn wrong_type_does_not_mutate() {
        let engine = engine();
        engine.set("x", "a", Duration::ZERO).unwrap();
        assert_eq!(engine.hset("x", &["f", "v"]), Err(RkvError::WrongType));
        assert_eq!(engine.lpush("x", &["v"]), Err(RkvError::WrongType));
        assert_eq!(engine.sadd("x", &["v"]), Err(RkvError::WrongType));
        assert_eq!(
            engine.zadd("x", &[ScoredMember::new("m", 1.0)]),
            Err(RkvError::WrongType)
        );
        assert_eq!(engine.llen("x"), Err(RkvError::WrongType));
        assert_eq!(engine.get("x").unwrap(), "a");
    }

    #[test]
    fn hgetall_returns_a_copy() {
        let engine = engine();
        engine.hset("h", &["f", "v"]).unwrap();
        let mut snapshot = engine.hgetall("h").unwrap();
        snapshot.insert("other".into(), "x".into());
        engine.hset("h", &["f", "changed"]).unwrap();
        assert_eq!(snapshot.get("f").map(String::as_str), Some("v"));
        assert_eq!(engine.hgetall("h").unwrap().len(), 1);
    }

    #[test]
    fn lpush_keeps_block_order() {
        let engine = engine();
        engine.rpush("l", &["old"]).unwrap();
        assert_eq!(engine.lpush("l", &["value1", "value2"]).unwrap(), 3);
        assert_eq!(engine.lrange("l", 0, -1).unwrap(), vec!["value1", "value2", "old"]);
        assert_eq!(engine.lpop("l").unwrap(), "value1");
        assert_eq!(engine.rpop("l").unwrap(), "old");
        assert_eq!(engine.lrange("l", 0, -1).unwrap(), vec!["value2"]);
    }

    #[test]
    fn popping_last_element_deletes_key() {
        let engine = engine();
        engine.rpush("l", &["only"]).unwrap();
        assert_eq!(engine.lpop("l").unwrap(), "only");
        assert_eq!(engine.exists(&["l"]).unwrap(), 0);
        assert_eq!(engine.lpop("l"), Err(RkvError::Nil));
        assert_eq!(engine.rpop("l"), Err(RkvError::Nil));
    }

    #[test]
    fn lrange_clamps_indices() {
        let engine = engine();
        engine.rpush("l", &["a", "b", "c", "d"]).unwrap();
        assert_eq!(engine.lrange("l", -2, -1).unwrap(), vec!["c", "d"]);
        assert_eq!(engine.lrange("l", -100, 1).unwrap(), vec!["a", "b"]);
        assert_eq!(engine.lrange("l", 2, 100).unwrap(), vec!["c", "d"]);
        assert!(engine.lrange("l", 3, 1).unwrap().is_empty());
        assert!(engine.lrange("l", 10, 20).unwrap().is_empty());
        assert!(engine.lrange("missing", 0, -1).unwrap().is_empty());
        assert_eq!(engine.llen("l").unwrap(), 4);
    }

    #[test]
    fn set_commands() {
        let engine = engine();
        assert_eq!(engine.sadd("s", &["a", "b"]).unwrap(), 2);
        assert_eq!(engine.sadd("s", &["a"]).unwrap(), 0);
        assert_eq!(engine.scard("s").unwrap(), 2);
        assert!(engine.sismember("s", "a").unwrap());
        assert!(!engine.sismember("s", "z").unwrap());

        let mut members = engine.smembers("s").unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        assert_eq!(engine.srem("s", &["a", "b", "c"]).unwrap(), 2);
        assert_eq!(engine.key_type("s").unwrap(), "none");
    }

    #[test]
    fn sorted_set_ranking() {
        let engine = engine();
        let added = engine
            .zadd(
                "z",
                &[
                    ScoredMember::new("p1", 100.0),
                    ScoredMember::new("p2", 85.0),
                    ScoredMember::new("p3", 92.0),
                ],
            )
            .unwrap();
        assert_eq!(added, 3);
        assert_eq!(engine.zrange("z", 0, -1).unwrap(), vec!["p2", "p3", "p1"]);
        assert_eq!(engine.zrange("z", -1, -1).unwrap(), vec!["p1"]);

        assert_eq!(engine.zadd("z", &[ScoredMember::new("p2", 101.0)]).unwrap(), 0);
        let scored = engine.zrange_with_scores("z", 0, -1).unwrap();
        assert_eq!(scored.last(), Some(&ScoredMember::new("p2", 101.0)));
        assert_eq!(engine.zscore("z", "p3").unwrap(), 92.0);
        assert_eq!(engine.zscore("z", "nope"), Err(RkvError::Nil));
        assert_eq!(engine.zcard("z").unwrap(), 3);
    }

    #[test]
    fn sorted_set_ties_break_by_member() {
        let engine = engine();
        engine
            .zadd(
                "z",
                &[
                    ScoredMember::new("c", 1.0),
                    ScoredMember::new("a", 1.0),
                    ScoredMember::new("b", 1.0),
                ],
            )
            .unwrap();
        assert_eq!(engine.zrange("z", 0, -1).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn zadd_rejects_nan() {
        let engine = engine();
        assert!(matches!(
            engine.zadd("z", &[ScoredMember::new("m", f64::NAN)]),
            Err(RkvError::InvalidArgument(_))
        ));
        assert_eq!(engine.exists(&["z"]).unwrap(), 0);
    }

    #[test]
    fn zrem_deletes_empty_set() {
        let engine = engine();
        engine.zadd("z", &[ScoredMember::new("m", 1.0)]).unwrap();
        assert_eq!(engine.zrem("z", &["m", "other"]).unwrap(), 1);
        assert_eq!(engine.exists(&["z"]).unwrap(), 0);
    }

    #[test]
    fn keys_skip_expired_entries() {
        let engine = MemoryEngine::with_sweep_interval(Duration::from_secs(3600));
        engine.set("user:1", "a", Duration::ZERO).unwrap();
        engine.set("user:2", "b", Duration::from_millis(1)).unwrap();
        engine.set("session:1", "c", Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(3));

        assert_eq!(engine.keys("user:*").unwrap(), vec!["user:1"]);
        assert_eq!(engine.keys("*").unwrap(), vec!["session:1", "user:1"]);
        assert_eq!(engine.db_size().unwrap(), 2);
    }

    #[test]
    fn flush_clears_everything() {
        let engine = engine();
        engine.set("a", "1", Duration::ZERO).unwrap();
        engine.sadd("s", &["x"]).unwrap();
        engine.flush_db().unwrap();
        assert_eq!(engine.db_size().unwrap(), 0);
        engine.set("b", "1", Duration::ZERO).unwrap();
        engine.flush_all().unwrap();
        assert_eq!(engine.db_size().unwrap(), 0);
    }

    #[test]
    fn select_validates_range_without_partitioning() {
        let engine = engine();
        engine.set("a", "1", Duration::ZERO).unwrap();
        engine.select(3).unwrap();
        assert_eq!(engine.selected_db(), 3);
        assert_eq!(engine.get("a").unwrap(), "1");
        assert!(matches!(engine.select(16), Err(RkvError::InvalidArgument(_))));
        assert!(matches!(engine.select(-1), Err(RkvError::InvalidArgument(_))));
        assert_eq!(engine.selected_db(), 3);
    }

    #[test]
    fn closed_engine_rejects_commands() {
        let engine = engine();
        engine.set("a", "1", Duration::ZERO).unwrap();
        engine.close().unwrap();
        assert!(engine.is_closed());
        assert_eq!(engine.ping(), Err(RkvError::Closed));
        assert_eq!(engine.get("a"), Err(RkvError::Closed));
        assert_eq!(engine.keys("*"), Err(RkvError::Closed));
        assert_eq!(engine.db_size(), Err(RkvError::Closed));
        engine.close().unwrap();
    }

    #[test]
    fn key_age_tracks_creation() {
        let engine = engine();
        engine.set("a", "1", Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(engine.key_age("a").unwrap() >= Duration::from_millis(5));
        assert_eq!(engine.key_age("missing"), Err(RkvError::Nil));
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let engine = Arc::new(engine());
        let mut handles = Vec::new();
        for worker in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let value = format!("{}-{}", worker, i);
                    engine.rpush("shared", &[value.as_str()]).unwrap();
                    engine.lrange("shared", 0, -1).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(engine.llen("shared").unwrap(), 400);
    }

    #[test]
    fn clamp_range_edges() {
        assert_eq!(clamp_range(0, -1, 0), None);
        assert_eq!(clamp_range(0, -1, 3), Some((0, 2)));
        assert_eq!(clamp_range(-5, 0, 3), Some((0, 0)));
        assert_eq!(clamp_range(1, -3, 3), None);
    }
}
