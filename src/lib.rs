//! # `thenable`: deferred values with Promises/A+ style handlers
//!
//! This project implements a minimal deferred value, the [future::Future],
//! together with the tiny single-threaded event loop it dispatches on. A
//! producer settles a future exactly once, fulfilled with a value or rejected
//! with a reason. Consumers register handlers with [future::Future::then],
//! before or after settlement, and every handler runs in a later turn of the
//! event loop, in the order it was registered. Handlers never run inside the
//! call that registered them, nor inside the call that settled the future.
//!
//! For information about running the event loop, refer to the [task] module.
//! To defer your own work by a turn, or by a delay, see the [timer] module.
//!
//! ## Example
//!
//! ```
//! use thenable::future::{Future, Handler};
//! use thenable::task::EventLoop;
//! use thenable::timer::set_timeout;
//! use std::time::Duration;
//!
//! let future = Future::<u32, String>::new(|_resolve, reject| {
//!     reject("no answer".to_owned());
//! });
//!
//! future.then(
//!     Handler::new(|v| println!("fulfilled with {v}")),
//!     Handler::new(|e| println!("rejected with {e}")),
//! );
//! set_timeout(Duration::ZERO, || println!("one turn later"));
//!
//! EventLoop::run();
//! ```
pub mod error;
pub mod future;
pub mod task;
pub mod timer;
