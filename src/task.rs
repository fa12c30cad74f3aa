//! Task and event loop management
//!
//! This module provides the event loop that every [Future](crate::future::Future)
//! dispatches its handlers on. Thenable uses a per-thread event loop model
//! which means that each OS thread has its own queue of macrotasks. This
//! means that:
//!
//! 1. The thread upon which a task is queued is the same thread that will
//!    execute it.
//! 2. Each thread needs to call one of [EventLoop::run] or [EventLoop::turn]
//!    to do any work. Use the former to drain everything that is queued
//!    (including pending timeouts), or the latter to run exactly one task.
//!
//! # Example
//!
//! ```
//! use thenable::task::EventLoop;
//! EventLoop::queue_task(|| println!("Hello"));
//! EventLoop::queue_task(|| println!("World!"));
//! EventLoop::run();
//! assert!(EventLoop::is_idle());
//! ```
//!
//! Tasks run strictly in the order they were queued, and a task queued from
//! inside another task runs after everything that was already waiting:
//!
//! ```
//! use thenable::task::EventLoop;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! let log = Rc::new(RefCell::new(Vec::new()));
//! {
//!     let log = log.clone();
//!     EventLoop::queue_task(move || {
//!         let inner = log.clone();
//!         EventLoop::queue_task(move || inner.borrow_mut().push("c"));
//!         log.borrow_mut().push("a");
//!     });
//! }
//! {
//!     let log = log.clone();
//!     EventLoop::queue_task(move || log.borrow_mut().push("b"));
//! }
//! EventLoop::run();
//! assert_eq!(*log.borrow(), ["a", "b", "c"]);
//! ```
//!
//! # Threading Model
//!
//! Since each thread has its own event loop, only a single task is ever
//! executing on it at once. Tasks therefore don't need to be `Send`, and can
//! share state through `Rc<RefCell<_>>`. Tasks queued on another thread are
//! never seen by this one:
//!
//! ```
//! use thenable::task::EventLoop;
//! use std::thread;
//! EventLoop::queue_task(|| {});
//! thread::spawn(|| assert!(EventLoop::is_idle())).join().unwrap();
//! assert_eq!(EventLoop::pending_tasks(), 1);
//! EventLoop::run();
//! ```
use std::{cell::RefCell, collections::VecDeque, thread, time::Instant};

use log::{debug, trace};

use crate::timer::{TimeoutId, TimerQueue};

pub(crate) type Task = Box<dyn FnOnce()>;

/// An entry in the ready queue.
pub(crate) enum Ready {
    Task(Task),
    /// A timeout that has come due. Its body stays in the [TimerQueue] until
    /// it runs so that it can still be cleared.
    Timeout(TimeoutId),
}

/// The per-thread event loop.
///
/// A type that is responsible for running macrotasks to completion, one at a
/// time, in the order they became ready. All of its functions operate on the
/// calling thread's loop.
pub struct EventLoop {
    ready: VecDeque<Ready>,
    timers: TimerQueue,
}

thread_local! {
    static EVENT_LOOP: RefCell<EventLoop> = RefCell::new(EventLoop {
        ready: VecDeque::new(),
        timers: TimerQueue::new(),
    });
}

impl EventLoop {
    /// Queue `f` to run in a later turn of this thread's event loop.
    ///
    /// The task is never run inline; it will not execute until
    /// [EventLoop::run] or [EventLoop::turn] is called on this thread and
    /// every task queued before it has finished.
    pub fn queue_task<F>(f: F)
    where
        F: FnOnce() + 'static,
    {
        Self::with(|el| el.ready.push_back(Ready::Task(Box::new(f))));
    }

    /// Run a single turn of the event loop.
    ///
    /// Any timeouts whose deadline has passed are moved onto the ready queue,
    /// then the oldest ready task is executed. Returns `false` if there was
    /// nothing ready to run. A panic inside the task unwinds out of this
    /// function; the remaining tasks stay queued.
    pub fn turn() -> bool {
        match Self::with(|el| el.next_ready(Instant::now())) {
            Some(task) => {
                trace!("Running task");
                task();
                true
            }
            None => false,
        }
    }

    /// Run the event loop for this thread.
    ///
    /// Blocks until there are no ready tasks and no pending timeouts left. If
    /// only delayed timeouts remain, the thread sleeps until the nearest one
    /// comes due.
    pub fn run() {
        loop {
            if Self::turn() {
                continue;
            }

            match Self::with(|el| el.timers.next_deadline()) {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        trace!("Sleeping until next timeout");
                        thread::sleep(deadline - now);
                    }
                }
                None => {
                    debug!("Event loop idle");
                    return;
                }
            }
        }
    }

    /// Returns `true` if there is nothing left for this thread's loop to run.
    pub fn is_idle() -> bool {
        Self::pending_tasks() == 0
    }

    /// The number of tasks and pending timeouts that have yet to run on this
    /// thread.
    pub fn pending_tasks() -> usize {
        Self::with(|el| {
            let ready = el
                .ready
                .iter()
                .filter(|entry| match entry {
                    Ready::Task(_) => true,
                    Ready::Timeout(id) => el.timers.contains(*id),
                })
                .count();

            ready + el.timers.armed()
        })
    }

    /// Borrow this thread's loop. `f` must not run any task.
    pub(crate) fn with<R>(f: impl FnOnce(&mut EventLoop) -> R) -> R {
        EVENT_LOOP.with(|el| f(&mut el.borrow_mut()))
    }

    pub(crate) fn enqueue(&mut self, entry: Ready) {
        self.ready.push_back(entry);
    }

    pub(crate) fn timers(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    fn next_ready(&mut self, now: Instant) -> Option<Task> {
        for id in self.timers.expired(now) {
            self.ready.push_back(Ready::Timeout(id));
        }

        while let Some(entry) = self.ready.pop_front() {
            match entry {
                Ready::Task(task) => return Some(task),
                Ready::Timeout(id) => {
                    if let Some(task) = self.timers.take(id) {
                        return Some(task);
                    }
                    // Cleared after it came due.
                }
            }
        }

        None
    }
}
