//! Error types for the reactive runtime.
//!
//! Two failure kinds cross the public surface: a cyclic dependency, raised
//! when an effect would re-enter itself during its own run, and a body
//! failure reported by user code. Both propagate to the synchronous caller
//! of whichever signal write or effect creation triggered execution.
//!
//! Cleanup failures are deliberately not represented here: they are caught,
//! logged to the error channel, and discarded (see `reactive::effect`).

use thiserror::Error;

use crate::reactive::EffectId;

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// An effect was scheduled while it was still running, directly or
    /// transitively. The offending effect's dependency edges have already
    /// been removed when this is raised.
    #[error("cyclic dependency: effect {0:?} re-entered during its own run")]
    Cycle(EffectId),

    /// An effect body reported a failure. The effect's dependency edges
    /// have been removed; the error is handed back to whoever triggered
    /// the run.
    #[error("effect body failed")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary failure raised by an effect body.
    pub fn body<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Body(source.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
