//! Cooperative fibers on a single OS thread.
//!
//! A [`Runtime`] owns a fixed pool of fibers, each with a stack allocated
//! once at construction. Fiber 0 is the host: the code that created the
//! runtime, running on the thread's own stack. Bodies handed to
//! [`Runtime::spawn`] run only when someone yields, are resumed in strict
//! round-robin order of pool index, and give up the CPU only through
//! [`Yielder::yield_now`] or by returning.
//!
//! There is no preemption. A body that loops without yielding starves the
//! whole runtime, and a body that outgrows its stack corrupts memory unless
//! the pool was built with guard pages.

mod arch;
mod config;
mod error;
mod fiber;
mod runtime;
mod scheduler;
mod stack;

pub use config::{Builder, Config, DEFAULT_CAPACITY, DEFAULT_STACK_SIZE, MIN_STACK_SIZE};
pub use error::{Error, Result};
pub use fiber::{FiberId, FiberState};
pub use runtime::{Runtime, Yielder};
