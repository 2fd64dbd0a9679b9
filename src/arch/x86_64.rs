//! x86_64 System V implementation of context switching.
//!
//! Assumptions this file relies on:
//! - `rsp, rbp, rbx, r12..r15` and the control bits of MXCSR and the x87
//!   control word are callee-saved; everything else is clobbered by any
//!   call and need not survive a switch.
//! - `call` pushes an 8-byte return address, and a function is entered
//!   with `rsp ≡ 8 (mod 16)`.
//! - The first integer argument travels in `rdi`.
//!
//! A fresh fiber is entered with `ret`, not `call`, so its first frame is
//! laid out by hand. See [`Context::new`].

use crate::runtime::{fiber_exit, fiber_main};
use std::arch::naked_asm;

/// Bytes taken from the top of a fresh stack by the start-up frame.
pub const FRAME_RESERVE: usize = 32;

/// Power-on MXCSR: all SSE exceptions masked, round to nearest.
const MXCSR_DEFAULT: u32 = 0x1F80;
/// Power-on x87 control word: all exceptions masked, extended precision.
const FPCW_DEFAULT: u32 = 0x037F;

/// Saved CPU context for context switching.
///
/// Field order is the layout `context_switch` reads and writes.
// Most fields are only touched from assembly.
#[allow(dead_code)]
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Stack pointer
    rsp: u64,
    /// Frame pointer
    rbp: u64,
    /// General purpose (callee-saved)
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    /// Carries the scheduler address into a fresh fiber
    r15: u64,
    /// SSE control and status
    mxcsr: u32,
    /// x87 control word (low 16 bits)
    fpcw: u32,
}

impl Context {
    /// Build the start-up frame for a fiber.
    ///
    /// - `stack_top`: one past the highest usable byte of the stack
    /// - `entry`: address the first switch returns into
    /// - `home`: scheduler address, handed to `entry` in `r15`
    ///
    /// Below the 16-byte aligned top `T` the frame reads:
    ///
    /// ```text
    ///   T-8:  0       (never popped)
    ///   T-16: guard   <- skip returns here, rsp becomes T-8
    ///   T-24: skip    <- the body's own `ret` lands here
    ///   T-32: entry   <- saved rsp; the switch's `ret` pops it
    /// ```
    ///
    /// `entry` starts with `rsp = T-24`, which is `8 mod 16` as if it had
    /// been called. Its return then pops `skip`, whose lone `ret` pops
    /// `guard` and leaves `rsp = T-8`, again a correctly aligned entry for
    /// the exit routine `guard` jumps into. Without `skip`, `guard` would
    /// start at `T`, misaligned by eight bytes.
    ///
    /// # Safety
    /// `stack_top` must be the end of a writable region of at least
    /// `FRAME_RESERVE + 15` bytes that outlives the returned context.
    pub unsafe fn new(stack_top: usize, entry: usize, home: usize) -> Self {
        let top = stack_top & !0xF;
        let frame = (top - FRAME_RESERVE) as *mut u64;

        unsafe {
            frame.write(entry as u64);
            frame.add(1).write(skip as usize as u64);
            frame.add(2).write(guard as usize as u64);
            frame.add(3).write(0);
        }

        Context {
            rsp: frame as u64,
            r15: home as u64,
            mxcsr: MXCSR_DEFAULT,
            fpcw: FPCW_DEFAULT,
            ..Default::default()
        }
    }
}

/// Switch from one context to another.
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
    naked_asm!(
        // Save callee-saved registers to `from` (rdi)
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "stmxcsr [rdi + 0x38]",
        "fnstcw [rdi + 0x3c]",
        // Load callee-saved registers from `to` (rsi)
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "ldmxcsr [rsi + 0x38]",
        "fldcw [rsi + 0x3c]",
        // Fresh fiber: pops `fiber_start`.
        // Suspended fiber: returns to where it called context_switch.
        "ret",
    );
}

/// First code a fresh fiber runs. Forwards the scheduler address to
/// `fiber_main` without touching the stack.
#[unsafe(naked)]
pub unsafe extern "C" fn fiber_start() {
    naked_asm!(
        "mov rdi, r15",
        "jmp {main}",
        main = sym fiber_main,
    );
}

/// Return trampoline, stage one: consumes the alignment slot.
#[unsafe(naked)]
unsafe extern "C" fn skip() {
    naked_asm!("ret");
}

/// Return trampoline, stage two: hands the finished fiber to the scheduler.
///
/// `r15` still holds the scheduler address because `fiber_main` preserves it.
#[unsafe(naked)]
unsafe extern "C" fn guard() {
    naked_asm!(
        "mov rdi, r15",
        "jmp {exit}",
        exit = sym fiber_exit,
    );
}
