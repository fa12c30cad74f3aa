//! Deferred values.
//!
//! A [Future] is settled exactly once, either fulfilled with a value or
//! rejected with a reason, by the producer that created it. Consumers register
//! handlers with [Future::then] before or after that happens. Handlers never
//! run inline: each one is queued as its own task on the thread's
//! [EventLoop], in the order it was registered.
//!
//! # Example
//!
//! ```
//! use thenable::future::{Future, Handler};
//! use thenable::task::EventLoop;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(Cell::new(0));
//! let future = Future::<i32, String>::new(|resolve, _reject| {
//!     resolve(789);
//!     resolve(999);
//! });
//!
//! {
//!     let seen = seen.clone();
//!     future.then(Handler::new(move |v| seen.set(v)), Handler::none());
//! }
//!
//! // Nothing runs until the event loop gets a turn.
//! assert_eq!(seen.get(), 0);
//! EventLoop::run();
//! assert_eq!(seen.get(), 789);
//! assert_eq!(future.state().as_str(), "fulfilled");
//! ```
//!
//! The settlement functions can be kept past the initializer and called later:
//!
//! ```
//! use thenable::future::{Future, Handler, Resolve, State};
//! use thenable::task::EventLoop;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let slot: Rc<RefCell<Option<Resolve<&str>>>> = Rc::default();
//! let future = {
//!     let slot = slot.clone();
//!     Future::<&str, ()>::new(move |resolve, _| *slot.borrow_mut() = Some(resolve))
//! };
//! future.then(Handler::new(|v| println!("settled with {v}")), Handler::none());
//! assert_eq!(future.state(), State::Pending);
//!
//! if let Some(resolve) = slot.borrow_mut().take() {
//!     resolve("done");
//! }
//! assert_eq!(future.state(), State::Fulfilled);
//! EventLoop::run();
//! ```
use std::{cell::RefCell, fmt, mem, rc::Rc};

use log::{debug, trace};

use crate::{
    error::{Error, Result},
    task::EventLoop,
};

/// Fulfills the [Future] it was handed out by. Only the first settlement
/// across both functions has any effect.
pub type Resolve<T> = Rc<dyn Fn(T)>;

/// Rejects the [Future] it was handed out by. Only the first settlement
/// across both functions has any effect.
pub type Reject<E> = Rc<dyn Fn(E)>;

/// The observable state of a [Future].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Fulfilled => "fulfilled",
            State::Rejected => "rejected",
        }
    }

    pub fn is_settled(&self) -> bool {
        *self != State::Pending
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An optional success or failure handler.
///
/// A handler receives the settled value and nothing else; it is not given
/// access to the [Future] it was registered on. [Handler::none] stands in for
/// "no handler" and is skipped at dispatch.
pub struct Handler<T> {
    f: Option<Box<dyn FnOnce(T)>>,
}

impl<T> Handler<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(T) + 'static,
    {
        Self {
            f: Some(Box::new(f)),
        }
    }

    pub fn none() -> Self {
        Self { f: None }
    }

    pub fn is_invocable(&self) -> bool {
        self.f.is_some()
    }
}

impl<T: Clone + 'static> Handler<T> {
    /// Queue this handler on the event loop with its own copy of `value`.
    fn dispatch(self, value: &T) {
        if let Some(f) = self.f {
            let value = value.clone();
            EventLoop::queue_task(move || f(value));
        }
    }
}

impl<T> Default for Handler<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("invocable", &self.is_invocable())
            .finish()
    }
}

/// An initializer slot that may be empty, for [Future::try_new].
pub struct Initializer<'a, T, E> {
    f: Option<Box<dyn FnOnce(Resolve<T>, Reject<E>) + 'a>>,
}

impl<'a, T, E> Initializer<'a, T, E> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Resolve<T>, Reject<E>) + 'a,
    {
        Self {
            f: Some(Box::new(f)),
        }
    }

    pub fn none() -> Self {
        Self { f: None }
    }
}

enum Outcome<T, E> {
    Pending {
        on_fulfilled: Vec<Handler<T>>,
        on_rejected: Vec<Handler<E>>,
    },
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    fn state(&self) -> State {
        match self {
            Outcome::Pending { .. } => State::Pending,
            Outcome::Fulfilled(_) => State::Fulfilled,
            Outcome::Rejected(_) => State::Rejected,
        }
    }
}

/// A value that will be fulfilled or rejected at some point.
///
/// See the [module-level documentation](self) for more information. Cloning a
/// `Future` clones the handle, not the value: every clone observes the same
/// settlement.
pub struct Future<T, E> {
    outcome: Rc<RefCell<Outcome<T, E>>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            outcome: self.outcome.clone(),
        }
    }
}

impl<T, E> Future<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Create a pending future and run `initializer` on it.
    ///
    /// `initializer` is called exactly once, before this function returns,
    /// with the future's [Resolve] and [Reject] functions. A panic inside it
    /// is not caught.
    pub fn new<F>(initializer: F) -> Self
    where
        F: FnOnce(Resolve<T>, Reject<E>),
    {
        let future = Self {
            outcome: Rc::new(RefCell::new(Outcome::Pending {
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
            })),
        };

        initializer(future.resolver(), future.rejecter());

        future
    }

    /// Like [Future::new], but for an initializer that may be absent.
    ///
    /// Returns [Error::InvalidInitializer] if `initializer` has nothing to
    /// invoke.
    pub fn try_new(initializer: Initializer<'_, T, E>) -> Result<Self> {
        match initializer.f {
            Some(f) => Ok(Self::new(f)),
            None => Err(Error::InvalidInitializer),
        }
    }

    pub fn state(&self) -> State {
        self.outcome.borrow().state()
    }

    /// Register handlers for the outcome of this future.
    ///
    /// While the future is pending both handlers are queued, absent ones
    /// included. Once it has settled, the handler for the outcome is
    /// scheduled on the event loop straight away. Either way the handler runs
    /// in a later turn, after every handler registered before it.
    pub fn then(&self, on_fulfilled: Handler<T>, on_rejected: Handler<E>) {
        let mut outcome = self.outcome.borrow_mut();

        match &mut *outcome {
            Outcome::Pending {
                on_fulfilled: fulfill_q,
                on_rejected: reject_q,
            } => {
                fulfill_q.push(on_fulfilled);
                reject_q.push(on_rejected);
            }
            Outcome::Fulfilled(value) => on_fulfilled.dispatch(value),
            Outcome::Rejected(reason) => on_rejected.dispatch(reason),
        }
    }

    fn resolver(&self) -> Resolve<T> {
        let future = self.clone();
        Rc::new(move |value| future.settle(Ok(value)))
    }

    fn rejecter(&self) -> Reject<E> {
        let future = self.clone();
        Rc::new(move |reason| future.settle(Err(reason)))
    }

    fn settle(&self, settled: std::result::Result<T, E>) {
        let mut outcome = self.outcome.borrow_mut();
        let current = outcome.state();

        let Outcome::Pending {
            on_fulfilled,
            on_rejected,
        } = &mut *outcome
        else {
            debug!(
                "Ignoring {} of an already {} future",
                if settled.is_ok() { "fulfillment" } else { "rejection" },
                current
            );
            return;
        };

        let on_fulfilled = mem::take(on_fulfilled);
        let on_rejected = mem::take(on_rejected);

        *outcome = match &settled {
            Ok(value) => Outcome::Fulfilled(value.clone()),
            Err(reason) => Outcome::Rejected(reason.clone()),
        };
        drop(outcome);

        // No borrow is held from here on, including while the losing queue drops.
        match settled {
            Ok(value) => {
                trace!("Future fulfilled, dispatching {} handlers", on_fulfilled.len());
                for handler in on_fulfilled {
                    handler.dispatch(&value);
                }
            }
            Err(reason) => {
                trace!("Future rejected, dispatching {} handlers", on_rejected.len());
                for handler in on_rejected {
                    handler.dispatch(&reason);
                }
            }
        }
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("state", &self.outcome.borrow().state())
            .finish()
    }
}
