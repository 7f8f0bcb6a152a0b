//! # Functionality Related to Early Solver Termination
//!
//! Internally, early termination travels through [`anyhow`] like any other error and is caught at
//! the public solving entry points, where it is separated from true errors again via
//! [`MaybeTerminatedError::capture`].

use std::fmt;

/// Early termination reasons for [`crate::algs::MaxHs::solve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Termination {
    /// Terminated because of maximum number of SAT oracle calls reached
    #[error("Solver terminated early because of oracle call limit")]
    OracleCallsLimit,
    /// Terminated because of maximum number of hitting set computations reached
    #[error("Solver terminated early because of hitting set call limit")]
    HsCallsLimit,
    /// Terminated because of maximum number of solutions reached
    #[error("Solver terminated early because of solution limit")]
    SolsLimit,
    /// Termination because of external interrupt
    #[error("Solver terminated early because of interrupt signal")]
    Interrupted,
}

/// Return type for functions that either return a value or were terminated early
#[derive(Debug, PartialEq)]
pub enum MaybeTerminated<T = ()> {
    /// The operation finished with a return value
    Done(T),
    /// The operation was terminated early
    Terminated(Termination),
}

impl<T> MaybeTerminated<T> {
    pub fn unwrap(self) -> T {
        match self {
            MaybeTerminated::Done(val) => val,
            MaybeTerminated::Terminated(term) => {
                panic!("called `MaybeTerminated::unwrap()` on a `Terminated` value: {term}")
            }
        }
    }
}

/// Return type for functions that either return a value, terminate early or error
#[derive(Debug)]
pub enum MaybeTerminatedError<T = ()> {
    /// The operation finished with a return value
    Done(T),
    /// The operation was terminated early
    Terminated(Termination),
    /// The operation failed
    Error(anyhow::Error),
}

impl<T> MaybeTerminatedError<T> {
    /// Separates early termination from true errors in an [`anyhow::Result`]
    pub fn capture(res: anyhow::Result<T>) -> Self {
        match res {
            Ok(val) => MaybeTerminatedError::Done(val),
            Err(err) => match err.downcast::<Termination>() {
                Ok(term) => MaybeTerminatedError::Terminated(term),
                Err(err) => MaybeTerminatedError::Error(err),
            },
        }
    }

    pub fn unwrap(self) -> T {
        match self {
            MaybeTerminatedError::Done(val) => val,
            MaybeTerminatedError::Terminated(term) => {
                panic!("called `MaybeTerminatedError::unwrap()` on a `Terminated` value: {term}")
            }
            MaybeTerminatedError::Error(err) => {
                panic!("called `MaybeTerminatedError::unwrap()` on an `Error` value: {err}")
            }
        }
    }
}

impl<T> From<MaybeTerminated<T>> for MaybeTerminatedError<T> {
    fn from(value: MaybeTerminated<T>) -> Self {
        match value {
            MaybeTerminated::Done(val) => MaybeTerminatedError::Done(val),
            MaybeTerminated::Terminated(term) => MaybeTerminatedError::Terminated(term),
        }
    }
}

impl<T> From<anyhow::Result<T>> for MaybeTerminatedError<T> {
    fn from(value: anyhow::Result<T>) -> Self {
        MaybeTerminatedError::capture(value)
    }
}

impl<T: fmt::Debug> MaybeTerminatedError<T> {
    /// Unwraps the `Done` or `Terminated` variant, panicking on errors
    pub fn expect_no_error(self) -> MaybeTerminated<T> {
        match self {
            MaybeTerminatedError::Done(val) => MaybeTerminated::Done(val),
            MaybeTerminatedError::Terminated(term) => MaybeTerminated::Terminated(term),
            MaybeTerminatedError::Error(err) => panic!("unexpected solver error: {err}"),
        }
    }
}
