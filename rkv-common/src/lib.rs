// rkv-common - Shared error taxonomy, value types, and command result wrappers
//
// Every backend (in-process store or network client) speaks in these types so
// callers never branch on which one is active.

pub mod cmd;
pub mod error;
pub mod types;

// Re-export for convenience
pub use cmd::*;
pub use error::*;
pub use types::*;
