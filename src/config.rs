//! Runtime configuration.

use crate::arch::FRAME_RESERVE;
use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// Default number of fibers in the pool, the host included.
pub const DEFAULT_CAPACITY: usize = 4;

/// Default stack size for each fiber (64KB)
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack a fiber may get: the start-up frame plus room for the
/// runtime's own frames (entry, panic catching, logging, the exit switch)
/// that run on it even for an empty body.
///
/// This says nothing about what a fiber body needs; sizing stacks for the
/// deepest call chain a body reaches is up to the caller.
pub const MIN_STACK_SIZE: usize = FRAME_RESERVE + 16 * 1024;

/// Shape of the fiber pool, fixed for the lifetime of a [`Runtime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of fibers, including the host at index 0.
    pub capacity: usize,
    /// Bytes of stack per spawnable fiber.
    pub stack_size: usize,
    /// Map stacks with a `PROT_NONE` page below them so overflow faults.
    pub guard_page: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capacity: DEFAULT_CAPACITY,
            stack_size: DEFAULT_STACK_SIZE,
            guard_page: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(Error::StackTooSmall {
                size: self.stack_size,
                min: MIN_STACK_SIZE,
            });
        }
        Ok(())
    }
}

/// Builds a [`Runtime`] from chained settings.
///
/// ```no_run
/// let mut rt = myfiber::Runtime::builder()
///     .capacity(3)
///     .stack_size(128 * 1024)
///     .build()
///     .unwrap();
/// rt.run();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.config.stack_size = stack_size;
        self
    }

    pub fn guard_page(mut self, guard_page: bool) -> Self {
        self.config.guard_page = guard_page;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn build(self) -> Result<Runtime> {
        Runtime::with_config(self.config)
    }
}
