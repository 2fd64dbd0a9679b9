//! aarch64 implementation of context switching
//!
//! `ret` jumps to `lr` rather than popping the stack, so a fresh fiber needs
//! no stack slots: the saved `lr` points at the entry routine and the saved
//! `sp` is the aligned stack top. The entry routine calls into the fiber
//! main with `bl` and branches into `guard` once it returns, which is why
//! this backend has no `skip` stage.

use crate::runtime::{fiber_exit, fiber_main};
use std::arch::naked_asm;

/// Bytes taken from the top of a fresh stack by the start-up frame.
pub const FRAME_RESERVE: usize = 0;

/// Saved CPU context for context switching
///
/// On aarch64 (AAPCS64), these are the callee-saved registers
/// that must be preserved across function calls:
/// - x19-x28: general purpose callee-saved registers
/// - d8-d15: floating-point/SIMD callee-saved registers (lower 64 bits of v8-v15)
// Most fields are only touched from assembly.
#[allow(dead_code)]
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Stack pointer
    sp: u64,
    /// Link register (return address)
    lr: u64,
    /// Frame pointer
    fp: u64,
    /// Carries the scheduler address into a fresh fiber
    x19: u64,
    x20: u64,
    x21: u64,
    x22: u64,
    x23: u64,
    x24: u64,
    x25: u64,
    x26: u64,
    x27: u64,
    x28: u64,
    /// Floating-point/SIMD (callee-saved, lower 64 bits)
    d8: u64,
    d9: u64,
    d10: u64,
    d11: u64,
    d12: u64,
    d13: u64,
    d14: u64,
    d15: u64,
}

impl Context {
    /// Build the start-up context for a fiber.
    ///
    /// # Safety
    /// `stack_top` must be the end of a writable region that outlives the
    /// returned context.
    pub unsafe fn new(stack_top: usize, entry: usize, home: usize) -> Self {
        Context {
            sp: (stack_top & !0xF) as u64,
            lr: entry as u64,
            x19: home as u64,
            ..Default::default()
        }
    }
}

/// Switch from one context to another
///
/// Saves the current CPU state into `from` and restores state from `to`.
/// This function returns when another context switches back to `from`.
///
/// # Safety
/// Both pointers must be valid. `to` must hold either a context saved by an
/// earlier `context_switch` or one built by [`Context::new`] whose stack is
/// still alive.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_from: *mut Context, _to: *const Context) {
    // Arguments: x0 = from, x1 = to
    naked_asm!(
        "mov x9, sp",
        "str x9,  [x0, #0x00]", // sp
        "str lr,  [x0, #0x08]", // lr (x30)
        "str fp,  [x0, #0x10]", // fp (x29)
        "str x19, [x0, #0x18]",
        "str x20, [x0, #0x20]",
        "str x21, [x0, #0x28]",
        "str x22, [x0, #0x30]",
        "str x23, [x0, #0x38]",
        "str x24, [x0, #0x40]",
        "str x25, [x0, #0x48]",
        "str x26, [x0, #0x50]",
        "str x27, [x0, #0x58]",
        "str x28, [x0, #0x60]",
        "str d8,  [x0, #0x68]",
        "str d9,  [x0, #0x70]",
        "str d10, [x0, #0x78]",
        "str d11, [x0, #0x80]",
        "str d12, [x0, #0x88]",
        "str d13, [x0, #0x90]",
        "str d14, [x0, #0x98]",
        "str d15, [x0, #0xa0]",
        "ldr x9,  [x1, #0x00]", // sp
        "mov sp, x9",
        "ldr lr,  [x1, #0x08]", // lr (x30)
        "ldr fp,  [x1, #0x10]", // fp (x29)
        "ldr x19, [x1, #0x18]",
        "ldr x20, [x1, #0x20]",
        "ldr x21, [x1, #0x28]",
        "ldr x22, [x1, #0x30]",
        "ldr x23, [x1, #0x38]",
        "ldr x24, [x1, #0x40]",
        "ldr x25, [x1, #0x48]",
        "ldr x26, [x1, #0x50]",
        "ldr x27, [x1, #0x58]",
        "ldr x28, [x1, #0x60]",
        "ldr d8,  [x1, #0x68]",
        "ldr d9,  [x1, #0x70]",
        "ldr d10, [x1, #0x78]",
        "ldr d11, [x1, #0x80]",
        "ldr d12, [x1, #0x88]",
        "ldr d13, [x1, #0x90]",
        "ldr d14, [x1, #0x98]",
        "ldr d15, [x1, #0xa0]",
        "ret",
    );
}

/// First code a fresh fiber runs.
#[unsafe(naked)]
pub unsafe extern "C" fn fiber_start() {
    naked_asm!(
        "mov x0, x19",
        "bl {main}",
        "b {guard}",
        main = sym fiber_main,
        guard = sym guard,
    );
}

/// Return trampoline: hands the finished fiber to the scheduler.
///
/// `x19` still holds the scheduler address because `fiber_main` preserves it.
#[unsafe(naked)]
unsafe extern "C" fn guard() {
    naked_asm!(
        "mov x0, x19",
        "b {exit}",
        exit = sym fiber_exit,
    );
}
