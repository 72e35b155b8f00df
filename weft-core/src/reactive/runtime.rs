//! Store and Scheduler
//!
//! The store is the central coordinator that connects signals, memos, and
//! effects. It owns every effect created through it and holds the
//! scheduler state that keeps re-execution glitch-free and terminating.
//!
//! # How It Works
//!
//! 1. While an effect body runs, its id sits on top of the store's
//!    observer stack. Signal reads peek at the stack top to discover the
//!    current observer; the stack is a field of the store, never
//!    process-global, so stores are fully isolated from one another.
//!
//! 2. A signal write schedules the signal's observers into the pending
//!    set (insertion-ordered, unique by effect identity) and invokes the
//!    flush.
//!
//! 3. The flush drains the pending set in two phases: all memo-kind
//!    effects settle before any plain effect runs, and memos pended by a
//!    plain effect settle before the next plain effect, so an effect
//!    reading a memo never observes a torn intermediate state.
//!
//! 4. An open batch defers the plain-effect phase until the outermost
//!    batch exit; memos still settle eagerly inside the batch.
//!
//! # Termination
//!
//! The updating flag makes the flush non-reentrant: a write performed by
//! a running body schedules observers and returns, and the single active
//! drain loop picks them up, so one originating write runs each affected
//! effect exactly once. The observer stack is the cycle detector: a
//! write that would schedule an effect which is still running, directly
//! or transitively, fails with [`Error::Cycle`] instead of looping.
//!
//! # Locking
//!
//! Scheduling is cooperative and single-threaded, but the state lives
//! behind locks so the types stay `Send + Sync`: every acquisition is
//! short and no lock is ever held across user code (bodies, compute
//! closures, equality predicates, cleanup hooks).

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use scopeguard::{guard, ScopeGuard};

use super::abort::AbortToken;
use super::effect::{
    EffectBody, EffectContext, EffectHandle, EffectId, EffectKind, EffectOutcome, EffectRecord,
};
use super::memo::{Memo, MemoOptions};
use super::signal::{Signal, SignalId};
use crate::error::{Error, Result};

/// Options accepted by [`Store::effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    /// External teardown: when the token fires, the effect is cancelled.
    pub abort: Option<AbortToken>,
}

/// Scheduler state. One per store, behind a single mutex.
struct Scheduler {
    /// LIFO of effects whose bodies are currently executing.
    observer_stack: Vec<EffectId>,
    /// Effects awaiting re-run, in first-pended order, unique by identity.
    pending: Vec<EffectId>,
    batch_depth: usize,
    /// True while a flush is draining; re-entrant flushes are no-ops.
    updating: bool,
    tracking: bool,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            observer_stack: Vec::new(),
            pending: Vec::new(),
            batch_depth: 0,
            updating: false,
            tracking: true,
        }
    }
}

/// An isolated reactive universe.
///
/// Effects in one store never respond to signals in another: the observer
/// stack consulted by signal reads belongs to the signal's own store, so
/// reading a foreign signal inside an effect installs no edge.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    scheduler: Mutex<Scheduler>,

    /// The arena owning every live effect, addressed by stable id.
    /// Observer lists and the pending set hold ids, never owning
    /// pointers.
    effects: RwLock<HashMap<EffectId, Arc<EffectRecord>>>,

    next_effect_id: AtomicU64,
    next_signal_id: AtomicU64,
}

impl Store {
    /// Create a fresh, independent store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                scheduler: Mutex::new(Scheduler::new()),
                effects: RwLock::new(HashMap::new()),
                next_effect_id: AtomicU64::new(0),
                next_signal_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create a signal with the default equality predicate (`==`).
    pub fn signal<T>(&self, initial: T) -> Signal<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        self.signal_with(initial, |a: &T, b: &T| a == b)
    }

    /// Create a signal with a custom equality predicate.
    pub fn signal_with<T, E>(&self, initial: T, equals: E) -> Signal<T>
    where
        T: Clone + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let id = SignalId::new(self.inner.next_signal_id.fetch_add(1, Ordering::Relaxed));
        Signal::new(id, initial, Arc::new(equals), Arc::downgrade(&self.inner))
    }

    /// Create an effect and run it once to establish its dependencies.
    ///
    /// The body receives an [`EffectContext`] carrying a cooperative
    /// `cancel()` hook and may return a cleanup closure that runs before
    /// the next re-run or at teardown. Errors from the first run (a
    /// cyclic dependency, or a failure the body reports) propagate here.
    pub fn effect<F>(&self, body: F) -> Result<EffectHandle>
    where
        F: Fn(&EffectContext) -> EffectOutcome + Send + Sync + 'static,
    {
        self.effect_with(body, EffectOptions::default())
    }

    /// Create an effect with options.
    pub fn effect_with<F>(&self, body: F, options: EffectOptions) -> Result<EffectHandle>
    where
        F: Fn(&EffectContext) -> EffectOutcome + Send + Sync + 'static,
    {
        Arc::clone(&self.inner).create_effect(EffectKind::Plain, Box::new(body), options.abort)
    }

    /// Create a memo: a read-only derived cell recomputed whenever a
    /// dependency of `compute` changes.
    pub fn memo<T, F>(&self, compute: F) -> Result<Memo<T>>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.memo_with(compute, MemoOptions::default())
    }

    /// Create a memo with options.
    pub fn memo_with<T, F>(&self, compute: F, options: MemoOptions<T>) -> Result<Memo<T>>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Memo::create(self, compute, options)
    }

    /// Run `body` with flushing deferred to the outermost batch exit.
    ///
    /// Nested batches collapse. Memos still settle during the batch; only
    /// plain effects wait. The deferral is restored even if `body`
    /// panics, and the exit flush still runs.
    pub fn batch<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        self.inner
            .scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .batch_depth += 1;

        let armed = guard(Arc::clone(&self.inner), |inner| {
            // Unwind path: close the batch and flush; the flush result
            // has nowhere to go mid-panic.
            if inner.close_batch() {
                let _ = inner.flush();
            }
        });

        let value = body();

        let inner = ScopeGuard::into_inner(armed);
        if inner.close_batch() {
            inner.flush()?;
        }
        Ok(value)
    }

    /// Run `reader` with dependency tracking disabled, restoring the
    /// previous tracking state on exit (even on panic). Signal reads
    /// inside install no edges.
    pub fn untracked<T, F>(&self, reader: F) -> T
    where
        F: FnOnce() -> T,
    {
        let previous = {
            let mut scheduler = self
                .inner
                .scheduler
                .lock()
                .expect("scheduler lock poisoned");
            mem::replace(&mut scheduler.tracking, false)
        };

        let _restore = guard(Arc::clone(&self.inner), move |inner| {
            inner
                .scheduler
                .lock()
                .expect("scheduler lock poisoned")
                .tracking = previous;
        });

        reader()
    }

    /// Tear down every live effect in this store, in creation order.
    /// Signals remain usable as plain storage with no observers.
    pub fn unlink(&self) {
        let mut records: Vec<Arc<EffectRecord>> = {
            let mut effects = self.inner.effects.write().expect("effect registry poisoned");
            effects.drain().map(|(_, record)| record).collect()
        };
        records.sort_by_key(|record| record.id().raw());

        for record in records {
            if record.deactivate() {
                record.cleanup();
            }
        }

        self.inner
            .scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .pending
            .clear();
    }

    /// Get the number of live effects owned by this store.
    pub fn effect_count(&self) -> usize {
        self.inner
            .effects
            .read()
            .expect("effect registry poisoned")
            .len()
    }

    pub(crate) fn inner(&self) -> &Arc<StoreInner> {
        &self.inner
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheduler = self.inner.scheduler.lock().expect("scheduler lock poisoned");
        f.debug_struct("Store")
            .field("effects", &self.effect_count())
            .field("pending", &scheduler.pending.len())
            .field("batch_depth", &scheduler.batch_depth)
            .field("updating", &scheduler.updating)
            .field("tracking", &scheduler.tracking)
            .finish()
    }
}

impl StoreInner {
    /// The effect whose body is currently executing, unless tracking is
    /// disabled or no body is running.
    pub(crate) fn current_observer(&self) -> Option<EffectId> {
        let scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
        if !scheduler.tracking {
            return None;
        }
        scheduler.observer_stack.last().copied()
    }

    pub(crate) fn effect_record(&self, id: EffectId) -> Option<Arc<EffectRecord>> {
        self.effects
            .read()
            .expect("effect registry poisoned")
            .get(&id)
            .cloned()
    }

    /// Insert observers into the pending set, preserving first-pended
    /// order and deduplicating by identity.
    ///
    /// A write always happens with its writer on the observer stack, so
    /// an observer that is itself on the stack is being re-triggered
    /// during its own run, directly or transitively. That is the cycle
    /// the runtime refuses: nothing is pended and the error propagates
    /// to whoever performed the write.
    pub(crate) fn schedule(&self, observers: Vec<EffectId>) -> Result<()> {
        if observers.is_empty() {
            return Ok(());
        }
        let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
        for id in &observers {
            if scheduler.observer_stack.contains(id) {
                return Err(Error::Cycle(*id));
            }
        }
        for id in observers {
            if !scheduler.pending.contains(&id) {
                scheduler.pending.push(id);
            }
        }
        Ok(())
    }

    /// Drain the pending set in two phases.
    ///
    /// 1. Re-entry guard: while a drain is active, nested calls return
    ///    immediately; anything a running body pends is picked up by the
    ///    active loop, so one originating write runs each affected
    ///    effect exactly once.
    /// 2. Memo phase: drain memo-kind effects, in first-pended order,
    ///    until none remain — including memos pended by a plain effect
    ///    that already ran, so no plain effect observes a stale memo.
    /// 3. If a batch is open, stop: plain effects wait for the outermost
    ///    batch exit.
    /// 4. Plain phase: drain one plain effect at a time from the shared
    ///    pending set, in first-pended order.
    ///
    /// On an error the drained effect is gone but everything still
    /// pending stays put; a later flush picks it up in order.
    pub(crate) fn flush(&self) -> Result<()> {
        {
            let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
            if scheduler.updating {
                return Ok(());
            }
            scheduler.updating = true;
        }

        let _draining = guard(self, |inner| {
            inner
                .scheduler
                .lock()
                .expect("scheduler lock poisoned")
                .updating = false;
        });

        loop {
            if let Some(memo) = self.next_pending(EffectKind::Memo) {
                self.run_effect(&memo)?;
                continue;
            }

            {
                let scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
                if scheduler.batch_depth > 0 {
                    return Ok(());
                }
            }

            match self.next_pending(EffectKind::Plain) {
                Some(effect) => self.run_effect(&effect)?,
                None => break,
            }
        }

        Ok(())
    }

    /// Remove and return the first pending effect of `kind`. Ids whose
    /// records are gone (cancelled while pending) are dropped; entries
    /// of the other kind keep their position.
    fn next_pending(&self, kind: EffectKind) -> Option<Arc<EffectRecord>> {
        let pending = {
            let scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
            scheduler.pending.clone()
        };
        if pending.is_empty() {
            return None;
        }

        let mut found = None;
        let mut dead = Vec::new();
        {
            let effects = self.effects.read().expect("effect registry poisoned");
            for id in pending {
                match effects.get(&id) {
                    Some(record) if record.kind() == kind => {
                        found = Some((id, Arc::clone(record)));
                        break;
                    }
                    Some(_) => {}
                    None => dead.push(id),
                }
            }
        }

        let taken = found.as_ref().map(|(id, _)| *id);
        if taken.is_some() || !dead.is_empty() {
            let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
            scheduler
                .pending
                .retain(|id| Some(*id) != taken && !dead.contains(id));
        }

        found.map(|(_, record)| record)
    }

    /// The core re-execution routine.
    ///
    /// 1. Drop old edges and run any prior user cleanup.
    /// 2. Refuse re-entry: an effect already on the observer stack fails
    ///    with [`Error::Cycle`] (its edges are already gone from step 1).
    /// 3. Run the body with this effect on top of the stack; the pop is
    ///    guarded so a panicking body cannot wedge the stack.
    /// 4. Store the returned cleanup, or on a body error clean the fresh
    ///    edges and propagate.
    /// 5. Honor a cancellation requested from inside the body.
    pub(crate) fn run_effect(&self, record: &Arc<EffectRecord>) -> Result<()> {
        if record.is_cancelled() {
            return Ok(());
        }

        record.cleanup();

        {
            let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
            if scheduler.observer_stack.contains(&record.id()) {
                return Err(Error::Cycle(record.id()));
            }
            scheduler.observer_stack.push(record.id());
        }

        let outcome = {
            let _popped = guard(self, |inner| {
                inner
                    .scheduler
                    .lock()
                    .expect("scheduler lock poisoned")
                    .observer_stack
                    .pop();
            });
            let cx = EffectContext::new(Arc::clone(record));
            record.invoke(&cx)
        };

        match outcome {
            Ok(hook) => record.set_user_cleanup(hook),
            Err(err) => {
                record.cleanup();
                return Err(err);
            }
        }

        if record.take_cancel_request() {
            self.cancel_effect(record);
        }
        Ok(())
    }

    /// Allocate, register, and run a new effect once.
    pub(crate) fn create_effect(
        self: Arc<Self>,
        kind: EffectKind,
        body: EffectBody,
        abort: Option<AbortToken>,
    ) -> Result<EffectHandle> {
        let id = EffectId::new(self.next_effect_id.fetch_add(1, Ordering::Relaxed));
        let record = Arc::new(EffectRecord::new(id, kind, body));

        if let Some(token) = &abort {
            if token.is_aborted() {
                // Never run, never registered: an inert handle.
                record.deactivate();
                return Ok(EffectHandle::new(record, Arc::downgrade(&self)));
            }
        }

        self.effects
            .write()
            .expect("effect registry poisoned")
            .insert(id, Arc::clone(&record));

        if let Some(token) = &abort {
            let store = Arc::downgrade(&self);
            let target = Arc::downgrade(&record);
            token.on_abort(move || {
                if let (Some(store), Some(record)) = (store.upgrade(), target.upgrade()) {
                    store.cancel_effect(&record);
                }
            });
        }

        match self.run_effect(&record) {
            Ok(()) => Ok(EffectHandle::new(record, Arc::downgrade(&self))),
            Err(err) => {
                self.cancel_effect(&record);
                Err(err)
            }
        }
    }

    /// Idempotent teardown: drop edges, run pending user cleanup, forget
    /// the record.
    pub(crate) fn cancel_effect(&self, record: &Arc<EffectRecord>) {
        if record.deactivate() {
            record.cleanup();
            self.effects
                .write()
                .expect("effect registry poisoned")
                .remove(&record.id());
        }
    }

    pub(crate) fn close_batch(&self) -> bool {
        let mut scheduler = self.scheduler.lock().expect("scheduler lock poisoned");
        scheduler.batch_depth -= 1;
        scheduler.batch_depth == 0
    }
}
