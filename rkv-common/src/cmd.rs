//! # Command Result Wrappers
//!
//! Purpose: Give every command a result container with the same shape as the
//! external client library (`val` / `err` / `result`), so code written
//! against the network client works unchanged against the in-process store.
//!
//! ## Design Principles
//! 1. **One Generic, Many Names**: `Cmd<T>` carries the logic; the aliases
//!    only name the shape (`IntCmd`, `StringSliceCmd`, ...).
//! 2. **Owned Results**: Values are owned copies, never views into the store.
//! 3. **Zero-Value Fallback**: `val()` returns `T::default()` on error, the way
//!    callers of the network client expect.

use std::collections::HashMap;
use std::fmt;

use crate::error::{RkvError, RkvResult};
use crate::types::{ScoredMember, TtlStatus};

/// Result of a single command.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Cmd<T> {
    inner: RkvResult<T>,
}

/// `PING`, `SET`, `TYPE`, `FLUSHDB`, `SELECT`.
pub type StatusCmd = Cmd<String>;
/// `GET`, `HGET`, `LPOP`, `RPOP`.
pub type StringCmd = Cmd<String>;
/// Counts and lengths.
pub type IntCmd = Cmd<i64>;
/// `SETNX`, `EXPIRE`, `HEXISTS`, `SISMEMBER`.
pub type BoolCmd = Cmd<bool>;
/// `ZSCORE`.
pub type FloatCmd = Cmd<f64>;
/// `TTL`.
pub type DurationCmd = Cmd<TtlStatus>;
/// `KEYS`, `LRANGE`, `SMEMBERS`, `ZRANGE`, `HKEYS`, `HVALS`.
pub type StringSliceCmd = Cmd<Vec<String>>;
/// `HGETALL`.
pub type StringMapCmd = Cmd<HashMap<String, String>>;
/// `ZRANGE ... WITHSCORES`.
pub type ZSliceCmd = Cmd<Vec<ScoredMember>>;

impl<T> Cmd<T> {
    pub fn ok(value: T) -> Self {
        Cmd { inner: Ok(value) }
    }

    pub fn error(err: RkvError) -> Self {
        Cmd { inner: Err(err) }
    }

    /// Returns the error, if the command failed.
    pub fn err(&self) -> Option<&RkvError> {
        self.inner.as_ref().err()
    }

    /// True when the command failed with `Nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self.inner, Err(RkvError::Nil))
    }

    /// Consumes the wrapper into a plain `Result`.
    pub fn result(self) -> RkvResult<T> {
        self.inner
    }

    /// Borrows the underlying `Result`.
    pub fn as_result(&self) -> Result<&T, &RkvError> {
        self.inner.as_ref()
    }
}

impl<T: Clone + Default> Cmd<T> {
    /// Returns the value, or `T::default()` when the command failed.
    pub fn val(&self) -> T {
        match &self.inner {
            Ok(value) => value.clone(),
            Err(_) => T::default(),
        }
    }
}

impl<T> From<RkvResult<T>> for Cmd<T> {
    fn from(inner: RkvResult<T>) -> Self {
        Cmd { inner }
    }
}

impl<T: fmt::Debug> fmt::Display for Cmd<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Ok(value) => write!(f, "{:?}", value),
            Err(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn val_falls_back_to_default() {
        let cmd: IntCmd = Cmd::error(RkvError::WrongType);
        assert_eq!(cmd.val(), 0);
        assert_eq!(cmd.err(), Some(&RkvError::WrongType));
        assert!(!cmd.is_nil());
    }

    #[test]
    fn nil_is_detected() {
        let cmd: StringCmd = Err(RkvError::Nil).into();
        assert!(cmd.is_nil());
        assert_eq!(cmd.val(), "");
        assert_eq!(cmd.to_string(), "redis: nil");
    }

    #[test]
    fn result_returns_owned_value() {
        let cmd: StringSliceCmd = Cmd::ok(vec!["a".to_string()]);
        assert!(cmd.err().is_none());
        assert_eq!(cmd.as_result().map(|v| v.len()), Ok(1));
        assert_eq!(cmd.result().unwrap(), vec!["a".to_string()]);
    }
}
