//! Error taxonomy for the bit-vector core.
//!
//! Precondition violations (`insert` past `size`, out-of-range `at`/`set`,
//! `select` of zero or overshoot) are the caller's responsibility and are
//! only checked via `debug_assert!` — release builds trust the contract.
//! The only recoverable failure inside a mutating call is allocator
//! failure, surfaced as [`BitVecError::OutOfMemory`].

use thiserror::Error;

/// Recoverable failure surfaced from a mutating operation.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum BitVecError {
    /// The allocator could not grow or create a leaf/node.
    #[error("allocator failed to satisfy an allocation request")]
    OutOfMemory,
}
