//! Error handling helpers for the transport crate.
//!
//! The transport layer keeps its error surface small: capacity validation at
//! construction time. Runtime conditions such as stale cursors, truncated
//! records or empty rings are reported as values rather than errors.

use std::fmt;

/// Convenience result alias for fallible transport operations.
pub type TransportResult<T, E = TransportError> = Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Errors surfaced by low-level transport helpers.
pub enum TransportError {
    /// Requested ring capacity is below the minimum or not a power of two.
    InvalidCapacity { requested: usize, minimum: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidCapacity { requested, minimum } => {
                write!(
                    f,
                    "ring capacity {requested} must be a power of two of at least {minimum} bytes"
                )
            }
        }
    }
}

impl std::error::Error for TransportError {}
