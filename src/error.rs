//! Errors raised by the crate.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A [Future](crate::future::Future) was constructed without anything to
    /// invoke as its initializer.
    #[error("future initializer is not invocable")]
    InvalidInitializer,
}
