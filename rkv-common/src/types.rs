//! # Value Type Definitions
//!
//! Shared data types for store commands: the closed set of value kinds, the
//! scored member used by sorted-set commands, and the TTL state reported by
//! `TTL`.
//!
//! ## Design Principles
//!
//! 1. **Closed Kinds**: A key holds exactly one `Kind`; the set is fixed so
//!    type checks are exhaustive `match`es rather than runtime casts.
//! 2. **Sentinel Encoding at the Edge**: `TtlStatus` is an enum internally and
//!    only becomes `-1` / `-2` when a caller asks for seconds.
//! 3. **Wire Names Live Here**: `Kind::as_str` is the single source of the
//!    names returned by `TYPE`.

use std::fmt;
use std::time::Duration;

use crate::error::{RkvError, RkvResult};

/// Highest logical database index accepted by `SELECT`.
pub const MAX_DB_INDEX: i64 = 15;

/// TTL sentinel for a key that exists without an expiry.
pub const TTL_NO_EXPIRY: i64 = -1;

/// TTL sentinel for a key that is absent or expired.
pub const TTL_MISSING: i64 = -2;

/// Kind of value stored at a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    String,
    Hash,
    List,
    Set,
    SortedSet,
}

impl Kind {
    /// Name reported by the `TYPE` command.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Hash => "hash",
            Kind::List => "list",
            Kind::Set => "set",
            Kind::SortedSet => "zset",
        }
    }

    /// Parses a `TYPE` reply; `"none"` and unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Kind> {
        match name {
            "string" => Some(Kind::String),
            "hash" => Some(Kind::Hash),
            "list" => Some(Kind::List),
            "set" => Some(Kind::Set),
            "zset" => Some(Kind::SortedSet),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted-set member paired with its score.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: f64) -> Self {
        ScoredMember {
            member: member.into(),
            score,
        }
    }
}

/// TTL state for a key, mirroring Redis semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlStatus {
    /// Key is missing or already expired.
    #[default]
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

impl TtlStatus {
    /// Encodes the status as `TTL` seconds: `-2` missing, `-1` no expiry,
    /// otherwise remaining seconds rounded to the nearest second.
    pub fn as_secs(&self) -> i64 {
        match self {
            TtlStatus::Missing => TTL_MISSING,
            TtlStatus::NoExpiry => TTL_NO_EXPIRY,
            TtlStatus::ExpiresIn(remaining) => ((remaining.as_millis() + 500) / 1000) as i64,
        }
    }

    /// Decodes a `TTL` integer reply.
    pub fn from_secs(secs: i64) -> TtlStatus {
        match secs {
            TTL_NO_EXPIRY => TtlStatus::NoExpiry,
            s if s < 0 => TtlStatus::Missing,
            s => TtlStatus::ExpiresIn(Duration::from_secs(s as u64)),
        }
    }

    /// Decodes a `PTTL` integer reply.
    pub fn from_millis(millis: i64) -> TtlStatus {
        match millis {
            TTL_NO_EXPIRY => TtlStatus::NoExpiry,
            m if m < 0 => TtlStatus::Missing,
            m => TtlStatus::ExpiresIn(Duration::from_millis(m as u64)),
        }
    }
}

impl fmt::Display for TtlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlStatus::ExpiresIn(remaining) => write!(f, "{:?}", remaining),
            other => write!(f, "{}", other.as_secs()),
        }
    }
}

/// Validates a logical database index (`0..=15`).
pub fn check_db_index(index: i64) -> RkvResult<u8> {
    if !(0..=MAX_DB_INDEX).contains(&index) {
        return Err(RkvError::InvalidArgument(format!(
            "DB index {} is out of range",
            index
        )));
    }
    Ok(index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_roundtrip() {
        for kind in [Kind::String, Kind::Hash, Kind::List, Kind::Set, Kind::SortedSet] {
            assert_eq!(Kind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(Kind::from_name("none"), None);
    }

    #[test]
    fn ttl_sentinels() {
        assert_eq!(TtlStatus::Missing.as_secs(), -2);
        assert_eq!(TtlStatus::NoExpiry.as_secs(), -1);
        assert_eq!(TtlStatus::ExpiresIn(Duration::from_millis(1_400)).as_secs(), 1);
        assert_eq!(TtlStatus::ExpiresIn(Duration::from_millis(1_600)).as_secs(), 2);
        assert_eq!(TtlStatus::from_secs(-2), TtlStatus::Missing);
        assert_eq!(TtlStatus::from_secs(-1), TtlStatus::NoExpiry);
        assert_eq!(TtlStatus::from_millis(250), TtlStatus::ExpiresIn(Duration::from_millis(250)));
    }

    #[test]
    fn db_index_range() {
        assert_eq!(check_db_index(0).unwrap(), 0);
        assert_eq!(check_db_index(15).unwrap(), 15);
        assert!(matches!(check_db_index(16), Err(RkvError::InvalidArgument(_))));
        assert!(matches!(check_db_index(-1), Err(RkvError::InvalidArgument(_))));
    }
}
