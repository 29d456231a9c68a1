//! # Error Taxonomy
//!
//! Purpose: One error enum shared by the in-process store and the network
//! client so a command fails the same way regardless of the backend.
//!
//! ## Design Principles
//!
//! 1. **Errors Are Values**: Every command reports failure through `RkvResult`;
//!    nothing in the command path panics on bad input.
//! 2. **Distinct Conditions**: `Nil`, `WrongType`, `Closed` and
//!    `InvalidArgument` stay separate so callers can render precise messages.
//! 3. **Transport Folding**: Network failures are flattened into owned strings
//!    to keep the enum `Clone + PartialEq` for assertions.

use thiserror::Error;

/// Result alias used by every command.
pub type RkvResult<T> = Result<T, RkvError>;

/// Errors surfaced by store commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RkvError {
    /// Key, field, or member is absent (or expired).
    #[error("redis: nil")]
    Nil,

    /// Command is incompatible with the kind stored at the key.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// The store or client has been closed.
    #[error("connection closed")]
    Closed,

    /// Bad arguments: odd field/value counts, out-of-range index, NaN score.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Network or IO failure while talking to a real server.
    #[error("io error: {0}")]
    Io(String),

    /// RESP framing or parse error.
    #[error("protocol error")]
    Protocol,

    /// Error reply returned by a real server.
    #[error("server error: {0}")]
    Server(String),

    /// Connection pool is at capacity.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Address could not be parsed into a socket address.
    #[error("invalid address")]
    InvalidAddress,
}

impl RkvError {
    /// Returns true for the "absent" condition.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, RkvError::Nil)
    }

    /// Short user-facing description, used by admin front ends.
    pub fn user_message(&self) -> &'static str {
        match self {
            RkvError::Nil => "key not found",
            RkvError::WrongType => "wrong type",
            RkvError::Closed => "connection closed",
            RkvError::InvalidArgument(_) => "invalid argument",
            RkvError::Io(_) | RkvError::Protocol | RkvError::InvalidAddress => {
                "backend unreachable"
            }
            RkvError::Server(_) => "server error",
            RkvError::PoolExhausted => "too many in-flight requests",
        }
    }
}

impl From<std::io::Error> for RkvError {
    fn from(err: std::io::Error) -> Self {
        RkvError::Io(err.to_string())
    }
}
