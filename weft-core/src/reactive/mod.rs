//! Reactive Primitives
//!
//! This module implements the core reactive system: stores, signals,
//! memos, and effects. These primitives form the foundation of weft's
//! fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is
//! read while an effect body is running, the signal automatically
//! registers that effect as an observer. When the signal's value changes,
//! all observers are scheduled and re-run.
//!
//! ## Memos
//!
//! A Memo is a derived read-only value, recomputed whenever one of its
//! dependencies changes. Within a single flush, memos always settle
//! before plain effects run, so effects never observe a memo that lags
//! its inputs.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs when its
//! dependencies change. Effects synchronize reactive state with the
//! outside world and may return a cleanup hook that runs before each
//! re-run and at teardown.
//!
//! ## Stores
//!
//! A Store is an isolated reactive universe: it owns its effects, carries
//! its own observer stack and pending set, and never interacts with
//! signals of another store.
//!
//! # Implementation Notes
//!
//! Dependency discovery is implicit: each store keeps a stack of
//! currently executing effects, and signal reads consult the top of that
//! stack. This approach (sometimes called "automatic dependency tracking"
//! or "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.
//! The stack is per-store state rather than thread-local, which is what
//! makes stores isolated and lets several coexist in one process.

mod abort;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use abort::AbortToken;
pub use effect::{cleanup, Cleanup, EffectContext, EffectHandle, EffectId, EffectOutcome};
pub use memo::{Memo, MemoOptions};
pub use runtime::{EffectOptions, Store};
pub use signal::{EqualsFn, ReadSignal, Signal, SignalId, WriteSignal};
