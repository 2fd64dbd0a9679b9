//! Round-robin scheduling over a fixed pool.
//!
//! This is the bookkeeping half of the runtime: it decides who runs next and
//! moves fibers through their states, but never switches stacks itself.
//! `runtime` pairs each decision with the actual context switch.

use crate::arch::Context;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fiber::{Entry, Fiber, FiberId, FiberState};
use crate::stack::Stack;
use log::{debug, trace};

/// A pending transfer of control between two pool slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Switch {
    pub(crate) from: usize,
    pub(crate) to: usize,
}

pub(crate) struct Scheduler {
    fibers: Vec<Fiber>,
    current: usize,
}

impl Scheduler {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut fibers = Vec::with_capacity(config.capacity);
        fibers.push(Fiber::host());
        for index in 1..config.capacity {
            let stack = Stack::new(config.stack_size, config.guard_page)?;
            trace!("{} stack: {} usable bytes", FiberId(index), stack.len());
            fibers.push(Fiber::new(stack));
        }

        Ok(Scheduler { fibers, current: 0 })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.fibers.len()
    }

    pub(crate) fn current(&self) -> FiberId {
        FiberId(self.current)
    }

    pub(crate) fn state(&self, id: FiberId) -> Option<FiberState> {
        self.fibers.get(id.0).map(|f| f.state)
    }

    pub(crate) fn count(&self, state: FiberState) -> usize {
        self.fibers.iter().filter(|f| f.state == state).count()
    }

    pub(crate) fn suspended(&self) -> usize {
        self.fibers.iter().filter(|f| f.is_suspended()).count()
    }

    /// Admit `entry` into the first available slot.
    ///
    /// `home` is the address fresh fibers hand back to the runtime; it is
    /// only read once the fiber is switched to.
    pub(crate) fn spawn(&mut self, entry: Entry, home: usize) -> Result<FiberId> {
        let capacity = self.capacity();
        let Some(index) = self
            .fibers
            .iter()
            .position(|f| f.state == FiberState::Available)
        else {
            return Err(Error::NoCapacity { capacity });
        };

        self.fibers[index].admit(entry, home);
        debug!("spawned {}", FiberId(index));
        Ok(FiberId(index))
    }

    /// First `Ready` slot after `current`, wrapping, `current` excluded.
    fn next_ready(&self) -> Option<usize> {
        let n = self.fibers.len();
        (1..n)
            .map(|step| (self.current + step) % n)
            .find(|&i| self.fibers[i].state == FiberState::Ready)
    }

    /// Pick the next fiber and apply the state changes of a yield.
    ///
    /// With nothing else ready the current fiber keeps running untouched.
    pub(crate) fn schedule(&mut self) -> Option<Switch> {
        let to = self.next_ready()?;
        let from = self.current;

        if self.fibers[from].state == FiberState::Running {
            self.fibers[from].state = FiberState::Ready;
        }
        self.fibers[to].state = FiberState::Running;
        self.current = to;

        trace!("switch {} -> {}", FiberId(from), FiberId(to));
        Some(Switch { from, to })
    }

    /// Mark the current fiber finished. Returns false for the host, which
    /// cannot finish.
    pub(crate) fn retire_current(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.fibers[self.current].state = FiberState::Available;
        debug!("{} finished", FiberId(self.current));
        true
    }

    pub(crate) fn take_entry(&mut self) -> Option<Entry> {
        self.fibers[self.current].take_entry()
    }

    /// Raw pointers to both contexts of `switch`, for the switch primitive.
    pub(crate) fn contexts(&mut self, switch: Switch) -> (*mut Context, *const Context) {
        let from: *mut Context = &mut self.fibers[switch.from].context;
        let to: *const Context = &self.fibers[switch.to].context;
        (from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(capacity: usize) -> Scheduler {
        let config = Config {
            capacity,
            stack_size: crate::config::MIN_STACK_SIZE,
            guard_page: false,
        };
        Scheduler::new(&config).unwrap()
    }

    fn noop() -> Entry {
        Box::new(|_| {})
    }

    #[test]
    fn starts_with_host_running() {
        let sched = scheduler(4);
        assert_eq!(sched.current(), FiberId::HOST);
        assert_eq!(sched.state(FiberId::HOST), Some(FiberState::Running));
        assert_eq!(sched.count(FiberState::Available), 3);
        assert_eq!(sched.state(FiberId(4)), None);
    }

    #[test]
    fn spawn_fills_lowest_slots() {
        let mut sched = scheduler(3);
        assert_eq!(sched.spawn(noop(), 0).unwrap(), FiberId(1));
        assert_eq!(sched.spawn(noop(), 0).unwrap(), FiberId(2));
        assert_eq!(sched.state(FiberId(1)), Some(FiberState::Ready));
        assert_eq!(sched.state(FiberId(2)), Some(FiberState::Ready));
    }

    #[test]
    fn spawn_past_capacity_changes_nothing() {
        let mut sched = scheduler(2);
        sched.spawn(noop(), 0).unwrap();
        let before: Vec<_> = (0..2).map(|i| sched.state(FiberId(i))).collect();

        let err = sched.spawn(noop(), 0).unwrap_err();
        assert!(matches!(err, Error::NoCapacity { capacity: 2 }));

        let after: Vec<_> = (0..2).map(|i| sched.state(FiberId(i))).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn round_robin_from_after_current() {
        let mut sched = scheduler(4);
        for _ in 0..3 {
            sched.spawn(noop(), 0).unwrap();
        }

        let order: Vec<_> = (0..8).map(|_| sched.schedule().unwrap().to).collect();
        assert_eq!(order, [1, 2, 3, 0, 1, 2, 3, 0]);
        assert_eq!(sched.count(FiberState::Running), 1);
    }

    #[test]
    fn demotes_running_but_not_retired() {
        let mut sched = scheduler(3);
        sched.spawn(noop(), 0).unwrap();
        sched.spawn(noop(), 0).unwrap();

        assert_eq!(sched.schedule(), Some(Switch { from: 0, to: 1 }));
        assert_eq!(sched.state(FiberId::HOST), Some(FiberState::Ready));

        assert!(sched.retire_current());
        assert_eq!(sched.schedule(), Some(Switch { from: 1, to: 2 }));
        assert_eq!(sched.state(FiberId(1)), Some(FiberState::Available));
        assert_eq!(sched.state(FiberId(2)), Some(FiberState::Running));
    }

    #[test]
    fn lone_fiber_keeps_running() {
        let mut sched = scheduler(4);
        assert_eq!(sched.schedule(), None);
        assert_eq!(sched.state(FiberId::HOST), Some(FiberState::Running));

        sched.spawn(noop(), 0).unwrap();
        assert_eq!(sched.schedule(), Some(Switch { from: 0, to: 1 }));
        // Host is ready, so fiber 1 is not alone yet.
        assert_eq!(sched.schedule(), Some(Switch { from: 1, to: 0 }));
        assert_eq!(sched.schedule(), Some(Switch { from: 0, to: 1 }));
    }

    #[test]
    fn host_never_retires() {
        let mut sched = scheduler(2);
        assert!(!sched.retire_current());
        assert_eq!(sched.state(FiberId::HOST), Some(FiberState::Running));
    }

    #[test]
    fn capacity_one_is_always_idle() {
        let mut sched = scheduler(1);
        assert!(matches!(
            sched.spawn(noop(), 0),
            Err(Error::NoCapacity { capacity: 1 })
        ));
        assert_eq!(sched.schedule(), None);
    }

    #[test]
    fn retired_slot_is_reused() {
        let mut sched = scheduler(2);
        sched.spawn(noop(), 0).unwrap();
        sched.schedule().unwrap();
        assert!(sched.take_entry().is_some());
        assert!(sched.retire_current());
        sched.schedule().unwrap();

        assert_eq!(sched.spawn(noop(), 0).unwrap(), FiberId(1));
        assert_eq!(sched.suspended(), 0);
    }
}
