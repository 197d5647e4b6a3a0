//! The unified error handling system for the request-security core.

use std::fmt::Display;

pub use types::GuardError;

/// A unified `Result` type for the entire crate.
pub type Result<T> = std::result::Result<T, GuardError>;

pub mod macros;
pub mod types;

/// Attaches a human-readable context message to any error convertible into [`GuardError`].
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<GuardError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|error| GuardError::Context {
            context: context().to_string(),
            source: Box::new(error.into()),
        })
    }
}

/// Error category for monitoring and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Rejections caused by the caller (bad credential, forged request, throttling).
    Client,
    /// Failures of the service or its dependencies.
    Server,
}

#[cfg(test)]
mod tests;
