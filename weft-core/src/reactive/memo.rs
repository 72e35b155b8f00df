//! Memo Implementation
//!
//! A Memo is a derived read-only cell: a hidden signal whose only writer
//! is a memo-kind effect evaluating the compute closure.
//!
//! # How Memos Work
//!
//! 1. Creation runs the compute closure once, inside the backing effect,
//!    establishing the memo's dependencies and its initial value.
//!
//! 2. When a dependency changes, the backing effect is scheduled like any
//!    other — but the flush runs all memo-kind effects before any plain
//!    effect, so an effect reading a memo always observes a value
//!    consistent with the latest upstream writes.
//!
//! 3. The recomputed value goes through the hidden signal's equality
//!    short-circuit: a recomputation that yields an equal value notifies
//!    nobody downstream.
//!
//! The hidden signal starts at `None` (the uninitialised sentinel) and
//! holds `Some` from the first run onward; the equality predicate is
//! lifted over the `Option` so the sentinel never compares equal to a
//! computed value.
//!
//! Dropping a `Memo` handle does not tear down the backing effect; the
//! store owns it until an abort token fires or the store is unlinked.
//! A token that has already fired at creation short-circuits the whole
//! machinery: the compute closure runs once, untracked, to seed the
//! value, and no backing effect is installed.

use std::sync::Arc;

use super::abort::AbortToken;
use super::effect::{EffectContext, EffectKind, EffectOutcome};
use super::runtime::Store;
use super::signal::{EqualsFn, Signal};
use crate::error::Result;

/// Options accepted by [`Store::memo_with`].
pub struct MemoOptions<T> {
    /// Change predicate for the computed value; defaults to `==`.
    pub equals: Option<EqualsFn<T>>,
    /// External teardown for the backing effect.
    pub abort: Option<AbortToken>,
}

impl<T> Default for MemoOptions<T> {
    fn default() -> Self {
        Self {
            equals: None,
            abort: None,
        }
    }
}

/// A cached derived value that recomputes when its dependencies change.
///
/// Readable only; the sole writer is the internal memo-kind effect.
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    signal: Signal<Option<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    pub(crate) fn create<F>(store: &Store, compute: F, options: MemoOptions<T>) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let equals = options
            .equals
            .unwrap_or_else(|| Arc::new(|a: &T, b: &T| a == b));

        let lifted = move |a: &Option<T>, b: &Option<T>| match (a, b) {
            (Some(a), Some(b)) => equals(a, b),
            (None, None) => true,
            _ => false,
        };

        // A token that already fired means the backing effect will never
        // run. Seed the cell with one direct, untracked compute so reads
        // still work; the memo stays frozen at that value.
        if let Some(token) = &options.abort {
            if token.is_aborted() {
                let initial = store.untracked(|| compute());
                let signal = store.signal_with(Some(initial), lifted);
                return Ok(Self { signal });
            }
        }

        let signal: Signal<Option<T>> = store.signal_with(None, lifted);

        let writer = signal.clone();
        let body = move |_cx: &EffectContext| -> EffectOutcome {
            writer.set(Some(compute()))?;
            Ok(None)
        };

        Arc::clone(store.inner()).create_effect(EffectKind::Memo, Box::new(body), options.abort)?;

        Ok(Self { signal })
    }

    /// Get the current value, registering the reading effect (if any) as
    /// an observer.
    pub fn get(&self) -> T {
        self.signal
            .get()
            .expect("memo value initialised on first run")
    }

    /// Get the current value without installing a dependency edge.
    pub fn get_untracked(&self) -> T {
        self.signal
            .get_untracked()
            .expect("memo value initialised on first run")
    }

    /// Get the number of effects currently observing this memo.
    pub fn observer_count(&self) -> usize {
        self.signal.observer_count()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("value", &self.get_untracked())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}
