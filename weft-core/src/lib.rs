//! Weft Core
//!
//! This crate implements a framework-agnostic runtime for fine-grained
//! reactive state. It provides:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Automatic dependency tracking with per-store observer stacks
//! - A two-phase flush that recomputes memos before effects run
//! - Batching, untracked reads, and cooperative cancellation
//! - A structural equality helper for dynamic values
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `reactive`: the store, signals, memos, effects, and the scheduler
//! - `equality`: structural comparison of dynamic [`equality::Value`]s,
//!   used as the default change predicate for signals holding them
//! - `global`: a process-wide default store with mirror functions
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::Store;
//!
//! let store = Store::new();
//! let count = store.signal(0);
//!
//! let doubled = store.memo({
//!     let count = count.clone();
//!     move || count.get() * 2
//! })?;
//!
//! store.effect({
//!     let doubled = doubled.clone();
//!     move |_cx| {
//!         println!("doubled: {}", doubled.get());
//!         Ok(None)
//!     }
//! })?;
//!
//! count.set(5)?;
//! // Effect automatically runs, prints: "doubled: 10"
//! ```

pub mod equality;
pub mod global;
pub mod reactive;

mod error;

pub use error::{Error, Result};
