//! The fiber runtime: a fixed pool of stacks driven by explicit yields.
//!
//! # Example
//!
//! ```no_run
//! use myfiber::Runtime;
//!
//! let mut rt = Runtime::new().unwrap();
//!
//! rt.spawn(|y| {
//!     println!("Fiber 1");
//!     y.yield_now();
//!     println!("Fiber 1 done");
//! })
//! .unwrap();
//!
//! rt.spawn(|_| {
//!     println!("Fiber 2");
//! })
//! .unwrap();
//!
//! rt.run();
//! ```

use crate::arch::context_switch;
use crate::config::{Builder, Config};
use crate::error::Result;
use crate::fiber::{Entry, FiberId, FiberState};
use crate::scheduler::Scheduler;
use log::{debug, error, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

/// Owns the fiber pool. The thread that creates it is fiber 0, the host.
///
/// The scheduler lives behind a stable heap address that fresh fibers
/// receive in a callee-saved register, so the `Runtime` value itself may
/// move freely.
pub struct Runtime {
    home: NonNull<Scheduler>,
}

impl Runtime {
    /// Runtime with the default [`Config`].
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Allocates every stack up front. The pool never grows.
    pub fn with_config(config: Config) -> Result<Self> {
        let sched = Box::new(Scheduler::new(&config)?);
        debug!(
            "runtime up: {} fibers, {} byte stacks",
            config.capacity, config.stack_size
        );
        Ok(Runtime {
            home: NonNull::from(Box::leak(sched)),
        })
    }

    fn sched(&self) -> &Scheduler {
        unsafe { self.home.as_ref() }
    }

    /// Install `f` in the first available fiber.
    ///
    /// The fiber becomes ready but does not run until the host yields or
    /// calls [`run`](Self::run).
    pub fn spawn<F>(&mut self, f: F) -> Result<FiberId>
    where
        F: FnOnce(&Yielder) + 'static,
    {
        unsafe { spawn_in(self.home.as_ptr(), Box::new(f)) }
    }

    /// Let the next ready fiber run. Returns false, without switching, if
    /// none is ready.
    pub fn yield_now(&mut self) -> bool {
        unsafe { switch(self.home.as_ptr()) }
    }

    /// Drive fibers until none is ready.
    ///
    /// Panics if called while already running.
    pub fn run(&mut self) {
        assert!(
            self.sched().current().is_host(),
            "run() called while already running"
        );
        while self.yield_now() {}
        debug!("runtime idle");
    }

    pub fn capacity(&self) -> usize {
        self.sched().capacity()
    }

    /// Fibers free for `spawn`.
    pub fn available(&self) -> usize {
        self.sched().count(FiberState::Available)
    }

    pub fn current(&self) -> FiberId {
        self.sched().current()
    }

    /// `None` for ids outside the pool.
    pub fn state(&self, id: FiberId) -> Option<FiberState> {
        self.sched().state(id)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let suspended = self.sched().suspended();
        if suspended > 0 {
            warn!("dropping runtime with {suspended} suspended fibers; their frames are not unwound");
        }
        drop(unsafe { Box::from_raw(self.home.as_ptr()) });
    }
}

/// Handed to every fiber body: the body's only way back into the runtime.
pub struct Yielder {
    home: *mut Scheduler,
}

impl Yielder {
    /// Suspend this fiber and resume the next ready one.
    ///
    /// Returns false immediately if no other fiber is ready.
    pub fn yield_now(&self) -> bool {
        unsafe { switch(self.home) }
    }

    /// Spawn a sibling. It joins the current round without preempting us.
    pub fn spawn<F>(&self, f: F) -> Result<FiberId>
    where
        F: FnOnce(&Yielder) + 'static,
    {
        unsafe { spawn_in(self.home, Box::new(f)) }
    }

    /// The fiber running this body.
    pub fn id(&self) -> FiberId {
        unsafe { (*self.home).current() }
    }
}

unsafe fn spawn_in(home: *mut Scheduler, entry: Entry) -> Result<FiberId> {
    unsafe { (*home).spawn(entry, home as usize) }
}

/// One cooperative step: schedule, then switch stacks.
///
/// The scheduler borrow ends before the switch; whoever resumes next
/// reaches the scheduler through `home` again.
unsafe fn switch(home: *mut Scheduler) -> bool {
    let (from, to) = {
        let sched = unsafe { &mut *home };
        let Some(switch) = sched.schedule() else {
            return false;
        };
        sched.contexts(switch)
    };
    unsafe { context_switch(from, to) };
    true
}

/// Rust side of a fresh fiber, reached from `fiber_start` with the
/// scheduler address. Returning sends the fiber through the return
/// trampoline into [`fiber_exit`].
pub(crate) extern "C" fn fiber_main(home: *mut Scheduler) {
    let yielder = Yielder { home };
    let id = yielder.id();
    let Some(entry) = (unsafe { (*home).take_entry() }) else {
        error!("{id} started without a body");
        return;
    };

    // Unwinding must stop here: the frames above are hand-built.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| entry(&yielder))) {
        error!("{id} panicked: {}", panic_message(&*payload));
    }
}

/// Termination path for a finished fiber. Frees its slot and yields away
/// for good.
pub(crate) extern "C" fn fiber_exit(home: *mut Scheduler) -> ! {
    let retired = unsafe { (*home).retire_current() };
    if retired {
        unsafe { switch(home) };
    }
    // Only reachable if nothing else was ready, and the host always is.
    error!("finished fiber has nowhere to return to");
    std::process::abort()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
