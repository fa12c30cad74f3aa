//! Timeouts on the event loop.
//!
//! [set_timeout] queues a task to run once a delay has elapsed. A zero delay
//! is the usual way for a host to "yield one turn": the task is put at the
//! back of the ready queue straight away, so it runs after everything that
//! was already scheduled, including handlers dispatched by a settled
//! [Future](crate::future::Future).
//!
//! # Example
//! ```
//! use thenable::task::EventLoop;
//! use thenable::timer::set_timeout;
//! use std::time::{Duration, Instant};
//!
//! let now = Instant::now();
//! set_timeout(Duration::from_millis(20), move || {
//!     assert!(now.elapsed() >= Duration::from_millis(20));
//! });
//! EventLoop::run();
//! ```
use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    time::{Duration, Instant},
};

use log::trace;
use slab::Slab;

use crate::task::{EventLoop, Ready, Task};

/// Identifies a timeout created by [set_timeout].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeoutId {
    key: usize,
    seq: u64,
}

/// Run `f` on this thread's event loop once `delay` has elapsed.
///
/// It is guaranteed that `f` runs no earlier than `delay` from now; it could
/// run later if the loop is busy. Timeouts that come due at the same instant
/// run in the order they were set.
///
/// A delay too large to represent as a deadline never fires, and
/// [EventLoop::run] does not wait for it. It can still be cleared.
pub fn set_timeout<F>(delay: Duration, f: F) -> TimeoutId
where
    F: FnOnce() + 'static,
{
    let deadline = Instant::now().checked_add(delay);

    EventLoop::with(|el| {
        let id = el.timers().insert(Box::new(f));

        if delay.is_zero() {
            el.enqueue(Ready::Timeout(id));
        } else if let Some(deadline) = deadline {
            el.timers().arm(id, deadline);
        }

        trace!("Set timeout {:?} for {:?}", id, delay);
        id
    })
}

/// Cancel a timeout that has not run yet.
///
/// Returns `true` if the timeout was pending and will now never run.
pub fn clear_timeout(id: TimeoutId) -> bool {
    EventLoop::with(|el| el.timers().take(id).is_some())
}

struct Timeout {
    seq: u64,
    armed: bool,
    task: Task,
}

/// Storage for the bodies of every timeout that has not yet run.
pub(crate) struct TimerQueue {
    slots: Slab<Timeout>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, usize)>>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            slots: Slab::new(),
            deadlines: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn insert(&mut self, task: Task) -> TimeoutId {
        let seq = self.next_seq;
        self.next_seq += 1;

        let key = self.slots.insert(Timeout {
            seq,
            armed: false,
            task,
        });

        TimeoutId { key, seq }
    }

    /// Hold `id` back until `at`.
    pub(crate) fn arm(&mut self, id: TimeoutId, at: Instant) {
        if let Some(timeout) = self.get_mut(id) {
            timeout.armed = true;
            self.deadlines.push(Reverse((at, id.seq, id.key)));
        }
    }

    pub(crate) fn take(&mut self, id: TimeoutId) -> Option<Task> {
        self.get_mut(id)?;
        Some(self.slots.remove(id.key).task)
    }

    pub(crate) fn contains(&self, id: TimeoutId) -> bool {
        self.slots.get(id.key).is_some_and(|t| t.seq == id.seq)
    }

    /// The number of timeouts still waiting for their deadline.
    pub(crate) fn armed(&self) -> usize {
        self.slots.iter().filter(|(_, t)| t.armed).count()
    }

    /// Disarm and return every timeout whose deadline is at or before `now`,
    /// earliest first.
    pub(crate) fn expired(&mut self, now: Instant) -> Vec<TimeoutId> {
        let mut due = Vec::new();

        while let Some(Reverse((at, seq, key))) = self.deadlines.peek().copied() {
            if at > now {
                break;
            }

            self.deadlines.pop();

            let id = TimeoutId { key, seq };
            if let Some(timeout) = self.get_mut(id) {
                timeout.armed = false;
                due.push(id);
            }
        }

        due
    }

    /// The deadline of the nearest armed timeout.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((at, seq, key))) = self.deadlines.peek().copied() {
            if self.contains(TimeoutId { key, seq }) {
                return Some(at);
            }

            // Cleared before it came due.
            self.deadlines.pop();
        }

        None
    }

    fn get_mut(&mut self, id: TimeoutId) -> Option<&mut Timeout> {
        self.slots.get_mut(id.key).filter(|t| t.seq == id.seq)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        rc::Rc,
        time::{Duration, Instant},
    };

    use crate::task::EventLoop;

    use super::{clear_timeout, set_timeout};

    #[test]
    fn zero_delay_runs_after_queued_tasks() {
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let log = log.clone();
            EventLoop::queue_task(move || log.borrow_mut().push("task"));
        }
        {
            let log = log.clone();
            set_timeout(Duration::ZERO, move || log.borrow_mut().push("timeout"));
        }
        {
            let log = log.clone();
            EventLoop::queue_task(move || log.borrow_mut().push("later task"));
        }

        EventLoop::run();
        assert_eq!(*log.borrow(), ["task", "timeout", "later task"]);
    }

    #[test]
    fn timeouts_run_in_deadline_order() {
        let log = Rc::new(RefCell::new(Vec::new()));

        for (delay, n) in [(60, 3), (20, 1), (40, 2)] {
            let log = log.clone();
            set_timeout(Duration::from_millis(delay), move || log.borrow_mut().push(n));
        }

        assert_eq!(EventLoop::pending_tasks(), 3);
        EventLoop::run();
        assert_eq!(*log.borrow(), [1, 2, 3]);
    }

    #[test]
    fn sleep_until_deadline() {
        let before = Instant::now();
        let fired = Rc::new(RefCell::new(None));

        {
            let fired = fired.clone();
            set_timeout(Duration::from_millis(100), move || {
                *fired.borrow_mut() = Some(Instant::now());
            });
        }

        EventLoop::run();

        let fired = fired.borrow().expect("timeout never ran");
        assert!(fired - before >= Duration::from_millis(100));
        assert!(EventLoop::is_idle());
    }

    #[test]
    fn cleared_timeouts_never_run() {
        let ran = Rc::new(RefCell::new(0));

        let delayed = {
            let ran = ran.clone();
            set_timeout(Duration::from_millis(10), move || *ran.borrow_mut() += 1)
        };
        let immediate = {
            let ran = ran.clone();
            set_timeout(Duration::ZERO, move || *ran.borrow_mut() += 1)
        };

        assert!(clear_timeout(delayed));
        assert!(clear_timeout(immediate));
        assert!(!clear_timeout(immediate));
        assert!(EventLoop::is_idle());

        EventLoop::run();
        assert_eq!(*ran.borrow(), 0);
    }

    #[test]
    fn unrepresentable_delay_never_fires() {
        let ran = Rc::new(RefCell::new(false));
        let id = {
            let ran = ran.clone();
            set_timeout(Duration::MAX, move || *ran.borrow_mut() = true)
        };

        assert!(EventLoop::is_idle());
        EventLoop::run();
        assert!(!*ran.borrow());

        assert!(clear_timeout(id));
        assert!(!clear_timeout(id));
    }

    #[test]
    fn clear_after_run_is_noop() {
        let id = set_timeout(Duration::ZERO, || {});
        EventLoop::run();
        assert!(!clear_timeout(id));

        // A new timeout may reuse the slot; the stale id must not touch it.
        let ran = Rc::new(RefCell::new(false));
        {
            let ran = ran.clone();
            set_timeout(Duration::ZERO, move || *ran.borrow_mut() = true);
        }
        assert!(!clear_timeout(id));
        EventLoop::run();
        assert!(*ran.borrow());
    }
}
