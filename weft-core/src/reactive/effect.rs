//! Effect Records
//!
//! An effect owns a user body, the dependency edges discovered during its
//! most recent run, and an optional user-supplied cleanup hook returned by
//! the body.
//!
//! # Lifecycle
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the store schedules the effect and the
//!    flush re-runs it.
//!
//! 3. Before each re-run the effect drops its old edges (via the unlinker
//!    closures installed by signal reads) and invokes any prior user
//!    cleanup, then tracks fresh edges during execution.
//!
//! # Cancellation
//!
//! Three paths converge on the same teardown: the [`EffectHandle`]
//! returned at creation, an external [`AbortToken`](super::AbortToken),
//! and [`EffectContext::cancel`] invoked from inside the body (deferred
//! until the body returns, because the body is still on the observer
//! stack). All are idempotent.
//!
//! # Cleanup failures
//!
//! A user cleanup that panics is caught, reported to the error channel
//! with the prefix `Error during effect cleanup:`, and discarded. Normal
//! flow continues; cleanup failures never propagate.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::error;

use super::runtime::StoreInner;
use crate::error::Result;

/// Unique identifier for an effect within its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Distinguishes memo-backing effects from plain effects. The flush runs
/// all memo-kind effects before any plain effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Plain,
    Memo,
}

/// A cleanup hook returned by an effect body. Runs once, before the next
/// re-run or at teardown.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// What an effect body hands back: an optional cleanup on success, or a
/// failure that propagates to whoever triggered the run.
pub type EffectOutcome = Result<Option<Cleanup>>;

/// Wrap a closure as an effect cleanup.
pub fn cleanup<F>(hook: F) -> Option<Cleanup>
where
    F: FnOnce() + Send + 'static,
{
    Some(Box::new(hook))
}

pub(crate) type EffectBody = Box<dyn Fn(&EffectContext) -> EffectOutcome + Send + Sync>;

pub(crate) type Unlinker = Box<dyn FnOnce() + Send>;

/// The record the store keeps for every live effect.
pub(crate) struct EffectRecord {
    id: EffectId,
    kind: EffectKind,
    body: EffectBody,

    /// One unlinker per distinct signal read during the most recent run.
    /// Each removes this effect from that signal's observer list.
    unlinkers: Mutex<Vec<Unlinker>>,

    /// Cleanup returned by the most recent body run, if any.
    user_cleanup: Mutex<Option<Cleanup>>,

    /// Set once by any cancellation path; a cancelled effect never runs
    /// again.
    cancelled: AtomicBool,

    /// Set by [`EffectContext::cancel`] during a body run; acted on after
    /// the body returns.
    cancel_requested: AtomicBool,

    runs: AtomicU64,
}

impl EffectRecord {
    pub(crate) fn new(id: EffectId, kind: EffectKind, body: EffectBody) -> Self {
        Self {
            id,
            kind,
            body,
            unlinkers: Mutex::new(Vec::new()),
            user_cleanup: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn kind(&self) -> EffectKind {
        self.kind
    }

    pub(crate) fn invoke(&self, cx: &EffectContext) -> EffectOutcome {
        let outcome = (self.body)(cx);
        self.runs.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    pub(crate) fn add_unlinker(&self, unlinker: Unlinker) {
        self.unlinkers
            .lock()
            .expect("unlinker lock poisoned")
            .push(unlinker);
    }

    pub(crate) fn set_user_cleanup(&self, hook: Option<Cleanup>) {
        *self.user_cleanup.lock().expect("cleanup lock poisoned") = hook;
    }

    /// Drop all dependency edges, then run and discard any user cleanup.
    /// A panicking user cleanup is caught and logged; it never propagates.
    pub(crate) fn cleanup(&self) {
        let unlinkers = mem::take(&mut *self.unlinkers.lock().expect("unlinker lock poisoned"));
        for unlink in unlinkers {
            unlink();
        }

        let hook = self.user_cleanup.lock().expect("cleanup lock poisoned").take();
        if let Some(hook) = hook {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(hook)) {
                error!("Error during effect cleanup: {}", panic_message(&payload));
            }
        }
    }

    /// Mark the effect inactive. Returns true on the first call only, so
    /// every cancellation path stays idempotent.
    pub(crate) fn deactivate(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_cancel_request(&self) -> bool {
        self.cancel_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EffectRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("cancelled", &self.is_cancelled())
            .field("runs", &self.run_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Passed to every effect body. Carries the cooperative cancellation hook.
pub struct EffectContext {
    record: Arc<EffectRecord>,
}

impl EffectContext {
    pub(crate) fn new(record: Arc<EffectRecord>) -> Self {
        Self { record }
    }

    /// Request teardown of this effect. The body is still running (and
    /// still on the observer stack), so the actual cleanup is deferred
    /// until it returns.
    pub fn cancel(&self) {
        self.record.request_cancel();
    }
}

/// The cancel handle returned by effect creation.
///
/// Cancelling is idempotent: the first call drops all dependency edges,
/// runs any pending user cleanup, and marks the effect inactive; later
/// calls do nothing.
pub struct EffectHandle {
    record: Arc<EffectRecord>,
    store: Weak<StoreInner>,
}

impl EffectHandle {
    pub(crate) fn new(record: Arc<EffectRecord>, store: Weak<StoreInner>) -> Self {
        Self { record, store }
    }

    pub fn cancel(&self) {
        match self.store.upgrade() {
            Some(store) => store.cancel_effect(&self.record),
            // The store is gone; its registry already dropped us, but the
            // edges still need to go.
            None => {
                if self.record.deactivate() {
                    self.record.cleanup();
                }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.record.is_cancelled()
    }

    /// How many times the effect body has run.
    pub fn run_count(&self) -> u64 {
        self.record.run_count()
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("record", &self.record)
            .finish()
    }
}
