//! Per-key storage: a tagged value plus its lifetime metadata.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use rkv_common::{Kind, RkvError, RkvResult};

/// Value held by a key; the variant is the key's kind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    String(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(HashSet<String>),
    /// Member -> score. Ordering is computed on demand by range commands.
    SortedSet(HashMap<String, f64>),
}

impl Value {
    /// Creates an empty container of `kind`.
    pub(crate) fn empty(kind: Kind) -> Value {
        match kind {
            Kind::String => Value::String(String::new()),
            Kind::Hash => Value::Hash(HashMap::new()),
            Kind::List => Value::List(VecDeque::new()),
            Kind::Set => Value::Set(HashSet::new()),
            Kind::SortedSet => Value::SortedSet(HashMap::new()),
        }
    }

    pub(crate) fn kind(&self) -> Kind {
        match self {
            Value::String(_) => Kind::String,
            Value::Hash(_) => Kind::Hash,
            Value::List(_) => Kind::List,
            Value::Set(_) => Kind::Set,
            Value::SortedSet(_) => Kind::SortedSet,
        }
    }

    /// True for a container with no elements. Strings are never "empty".
    pub(crate) fn is_empty_container(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::Hash(hash) => hash.is_empty(),
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::SortedSet(zset) => zset.is_empty(),
        }
    }

    pub(crate) fn as_hash(&self) -> RkvResult<&HashMap<String, String>> {
        match self {
            Value::Hash(hash) => Ok(hash),
            _ => Err(RkvError::WrongType),
        }
    }

    pub(crate) fn as_hash_mut(&mut self) -> RkvResult<&mut HashMap<String, String>> {
        match self {
            Value::Hash(hash) => Ok(hash),
            _ => Err(RkvError::WrongType),
        }
    }

    pub(crate) fn as_list(&self) -> RkvResult<&VecDeque<String>> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(RkvError::WrongType),
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> RkvResult<&mut VecDeque<String>> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(RkvError::WrongType),
        }
    }

    pub(crate) fn as_set(&self) -> RkvResult<&HashSet<String>> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(RkvError::WrongType),
        }
    }

    pub(crate) fn as_set_mut(&mut self) -> RkvResult<&mut HashSet<String>> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(RkvError::WrongType),
        }
    }

    pub(crate) fn as_zset(&self) -> RkvResult<&HashMap<String, f64>> {
        match self {
            Value::SortedSet(zset) => Ok(zset),
            _ => Err(RkvError::WrongType),
        }
    }

    pub(crate) fn as_zset_mut(&mut self) -> RkvResult<&mut HashMap<String, f64>> {
        match self {
            Value::SortedSet(zset) => Ok(zset),
            _ => Err(RkvError::WrongType),
        }
    }
}

/// A stored value with creation time and optional deadline.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    pub(crate) created_at: Instant,
    pub(crate) expires_at: Option<Instant>,
}

impl Entry {
    pub(crate) fn new(value: Value, now: Instant, expires_at: Option<Instant>) -> Self {
        Entry {
            value,
            created_at: now,
            expires_at,
        }
    }

    /// Returns true when the entry has expired at `now`.
    ///
    /// This is the only expiry test; lazy checks and the sweeper both use it.
    #[inline]
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> Kind {
        self.value.kind()
    }
}

/// Converts a relative TTL into an absolute deadline (`None` for zero).
///
/// A TTL too large for the platform clock is `InvalidArgument`.
#[inline]
pub(crate) fn deadline(now: Instant, ttl: Duration) -> RkvResult<Option<Instant>> {
    if ttl.is_zero() {
        return Ok(None);
    }
    now.checked_add(ttl)
        .map(Some)
        .ok_or_else(|| RkvError::InvalidArgument("invalid expire time".to_string()))
}
