//! Architecture-specific context switching.
//!
//! Each backend exports the same surface: a `Context` with a
//! `Context::new(stack_top, entry, home)` frame builder, the
//! `context_switch` primitive, the `fiber_start` entry routine, and
//! `FRAME_RESERVE`, the bytes a fresh frame takes from the top of a stack.

#[cfg(all(target_arch = "x86_64", not(windows)))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(windows)))]
pub use x86_64::*;

#[cfg(all(target_arch = "aarch64", not(windows)))]
mod aarch64;
#[cfg(all(target_arch = "aarch64", not(windows)))]
pub use aarch64::*;

#[cfg(not(any(
    all(target_arch = "x86_64", not(windows)),
    all(target_arch = "aarch64", not(windows))
)))]
compile_error!("myfiber supports x86_64 System V and aarch64 AAPCS64 targets only");
