//! Runtime errors.

use std::io;
use thiserror::Error;

/// Errors reported by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Every fiber in the pool is ready or running.
    #[error("no available fiber in a pool of {capacity}")]
    NoCapacity { capacity: usize },

    /// The pool must at least hold the host fiber.
    #[error("pool capacity must be at least 1 (the host fiber), got {0}")]
    InvalidCapacity(usize),

    /// The stack cannot hold the start-up frame.
    #[error("stack size of {size} bytes is below the minimum of {min}")]
    StackTooSmall { size: usize, min: usize },

    /// The operating system refused to map a stack.
    #[error("failed to allocate fiber stack: {0}")]
    StackAlloc(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
