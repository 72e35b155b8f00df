//! Abort tokens for external effect teardown.
//!
//! A token fires at most once. Callbacks registered before the fire run
//! when it fires; callbacks registered after run immediately. Tokens are
//! cheap to clone and every clone observes the same fire.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A cloneable fire-once cancellation token.
#[derive(Clone, Default)]
pub struct AbortToken {
    inner: Arc<AbortInner>,
}

#[derive(Default)]
struct AbortInner {
    fired: AtomicBool,
    callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Registered callbacks run exactly once, in
    /// registration order; later calls are no-ops.
    pub fn abort(&self) {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = mem::take(
            &mut *self
                .inner
                .callbacks
                .lock()
                .expect("abort callback lock poisoned"),
        );
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Register a callback; runs immediately if the token already fired.
    pub(crate) fn on_abort(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut callbacks = self
                .inner
                .callbacks
                .lock()
                .expect("abort callback lock poisoned");
            if !self.inner.fired.load(Ordering::SeqCst) {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }
}

impl std::fmt::Debug for AbortToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortToken")
            .field("fired", &self.is_aborted())
            .finish()
    }
}
