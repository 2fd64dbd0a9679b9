//! Fibers: one stack, one saved context, one lifecycle state.

use crate::arch::Context;
use crate::runtime::Yielder;
use crate::stack::Stack;
use std::fmt;

/// Lifecycle state of a pool slot.
///
/// ```text
/// Available --spawn--> Ready --selected--> Running --yield--> Ready
///                                          Running --return-> Available
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiberState {
    /// Stack is free and can be reused by `spawn`.
    Available,
    /// Runnable but not executing.
    Ready,
    /// Currently executing.
    Running,
}

/// Index of a fiber in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(pub(crate) usize);

impl FiberId {
    /// The host's own flow of control. Never spawned, never finishes.
    pub const HOST: FiberId = FiberId(0);

    pub fn index(self) -> usize {
        self.0
    }

    pub fn is_host(self) -> bool {
        self == Self::HOST
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber#{}", self.0)
    }
}

pub(crate) type Entry = Box<dyn FnOnce(&Yielder)>;

pub(crate) struct Fiber {
    pub(crate) context: Context,
    pub(crate) state: FiberState,
    /// `None` only for the host, which runs on the thread's own stack.
    stack: Option<Stack>,
    /// Body waiting for its first switch.
    entry: Option<Entry>,
}

impl Fiber {
    pub(crate) fn host() -> Self {
        Fiber {
            context: Context::default(),
            state: FiberState::Running,
            stack: None,
            entry: None,
        }
    }

    pub(crate) fn new(stack: Stack) -> Self {
        Fiber {
            context: Context::default(),
            state: FiberState::Available,
            stack: Some(stack),
            entry: None,
        }
    }

    /// Install a body and a fresh start-up frame. `Available -> Ready`.
    pub(crate) fn admit(&mut self, entry: Entry, home: usize) {
        debug_assert_eq!(self.state, FiberState::Available);
        let Some(stack) = self.stack.as_mut() else {
            unreachable!("the host fiber is never admitted");
        };
        self.context = stack.prepare(home);
        self.entry = Some(entry);
        self.state = FiberState::Ready;
    }

    pub(crate) fn take_entry(&mut self) -> Option<Entry> {
        self.entry.take()
    }

    /// Ready with its body already started, i.e. parked inside a yield.
    pub(crate) fn is_suspended(&self) -> bool {
        self.state == FiberState::Ready && self.entry.is_none()
    }
}
