//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which effects depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while an effect body is executing (and
//!    tracking is enabled), the signal records that effect in its
//!    observer list and installs an unlinker into the effect so the edge
//!    is removed from both sides at the effect's next cleanup.
//!
//! 2. When a signal's value changes, every observer is scheduled into the
//!    store's pending set and a flush is invoked.
//!
//! 3. A write whose new value compares equal to the current one (per the
//!    signal's equality predicate) is a silent no-op.
//!
//! # Edges are membership, not ownership
//!
//! The observer list holds effect ids, and the unlinkers hold weak
//! references to the observer list. Neither side keeps the other alive;
//! the store is the arena that owns effects, and signals are owned by
//! whoever created them. A signal whose store has been dropped degrades
//! to plain storage: reads and writes still work, nobody is notified.

use std::sync::{Arc, RwLock, Weak};

use super::effect::EffectId;
use super::runtime::StoreInner;
use crate::error::Result;

/// Equality predicate deciding whether a write actually changed a value.
pub type EqualsFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Identifier for a signal within its store. Only used for diagnostics;
/// edges are keyed by effect identity, not signal identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(u64);

impl SignalId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = store.signal(0);
///
/// // Read the value (tracks the current effect, if any)
/// let value = count.get();
///
/// // Update the value (notifies observers)
/// count.set(5)?;
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: SignalId,

    value: Arc<RwLock<T>>,

    equals: EqualsFn<T>,

    /// Effects observing this signal, in first-read order, unique by
    /// identity. Inserted by tracked reads, removed by effect cleanup.
    observers: Arc<RwLock<Vec<EffectId>>>,

    store: Weak<StoreInner>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        id: SignalId,
        initial: T,
        equals: EqualsFn<T>,
        store: Weak<StoreInner>,
    ) -> Self {
        Self {
            id,
            value: Arc::new(RwLock::new(initial)),
            equals,
            observers: Arc::new(RwLock::new(Vec::new())),
            store,
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    /// Get the current value.
    ///
    /// If an effect body is executing and tracking is enabled, this also
    /// registers that effect as an observer of this signal.
    pub fn get(&self) -> T {
        self.track();
        self.value.read().expect("value lock poisoned").clone()
    }

    /// Get the current value without installing a dependency edge.
    pub fn get_untracked(&self) -> T {
        self.value.read().expect("value lock poisoned").clone()
    }

    /// Set a new value and notify observers.
    ///
    /// Returns without side effects when the equality predicate reports
    /// the new value equal to the current one. Otherwise every observer
    /// is scheduled and the store's flush runs; a cyclic dependency or a
    /// failing effect body surfaces here.
    pub fn set(&self, value: T) -> Result<()> {
        {
            let current = self.value.read().expect("value lock poisoned").clone();
            if (self.equals)(&current, &value) {
                return Ok(());
            }
        }
        *self.value.write().expect("value lock poisoned") = value;
        self.notify()
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.value.read().expect("value lock poisoned");
            f(&current)
        };
        self.set(next)
    }

    /// Split into a read half and a write half sharing this cell.
    pub fn split(&self) -> (ReadSignal<T>, WriteSignal<T>) {
        (
            ReadSignal {
                signal: self.clone(),
            },
            WriteSignal {
                signal: self.clone(),
            },
        )
    }

    /// Get the number of effects currently observing this signal.
    pub fn observer_count(&self) -> usize {
        self.observers.read().expect("observer lock poisoned").len()
    }

    /// Register the current observer, if any, installing the edge on both
    /// sides. Idempotent: a signal read twice in one run installs one edge.
    fn track(&self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let Some(current) = store.current_observer() else {
            return;
        };

        let installed = {
            let mut observers = self.observers.write().expect("observer lock poisoned");
            if observers.contains(&current) {
                false
            } else {
                observers.push(current);
                true
            }
        };
        if !installed {
            return;
        }

        match store.effect_record(current) {
            Some(record) => {
                let observers = Arc::downgrade(&self.observers);
                record.add_unlinker(Box::new(move || {
                    if let Some(observers) = observers.upgrade() {
                        observers
                            .write()
                            .expect("observer lock poisoned")
                            .retain(|observer| *observer != current);
                    }
                }));
            }
            // The record vanished between the stack peek and now; drop
            // the half-installed edge.
            None => {
                self.observers
                    .write()
                    .expect("observer lock poisoned")
                    .retain(|observer| *observer != current);
            }
        }
    }

    fn notify(&self) -> Result<()> {
        let Some(store) = self.store.upgrade() else {
            return Ok(());
        };
        let observers = self.observers.read().expect("observer lock poisoned").clone();
        store.schedule(observers)?;
        store.flush()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            equals: Arc::clone(&self.equals),
            observers: Arc::clone(&self.observers),
            store: Weak::clone(&self.store),
        }
    }
}

impl<T> std::fmt::Debug for Signal<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// The read half of a split signal.
pub struct ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    signal: Signal<T>,
}

impl<T> ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn get(&self) -> T {
        self.signal.get()
    }

    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }
}

impl<T> Clone for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

/// The write half of a split signal.
pub struct WriteSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    signal: Signal<T>,
}

impl<T> WriteSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn set(&self, value: T) -> Result<()> {
        self.signal.set(value)
    }

    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.signal.update(f)
    }
}

impl<T> Clone for WriteSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::runtime::Store;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn signal_get_and_set() {
        let store = Store::new();
        let signal = store.signal(0);
        assert_eq!(signal.get(), 0);

        signal.set(42).unwrap();
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let store = Store::new();
        let signal = store.signal(10);
        signal.update(|v| v + 5).unwrap();
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn equal_write_is_silent() {
        let store = Store::new();
        let signal = store.signal(7);
        let runs = Arc::new(AtomicI32::new(0));

        store
            .effect({
                let signal = signal.clone();
                let runs = runs.clone();
                move |_cx| {
                    signal.get();
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Same value: no observer scheduled.
        signal.set(7).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        signal.set(8).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_equality_predicate() {
        let store = Store::new();
        // Compare case-insensitively.
        let signal = store.signal_with("Hello".to_string(), |a: &String, b: &String| {
            a.eq_ignore_ascii_case(b)
        });

        signal.set("HELLO".to_string()).unwrap();
        // Considered equal, so the stored value is unchanged.
        assert_eq!(signal.get(), "Hello");

        signal.set("world".to_string()).unwrap();
        assert_eq!(signal.get(), "world");
    }

    #[test]
    fn split_halves_share_the_cell() {
        let store = Store::new();
        let (read, write) = store.signal(1).split();
        write.set(2).unwrap();
        assert_eq!(read.get(), 2);
        write.update(|v| v * 10).unwrap();
        assert_eq!(read.get(), 20);
    }

    #[test]
    fn clone_shares_state() {
        let store = Store::new();
        let a = store.signal(0);
        let b = a.clone();

        a.set(42).unwrap();
        assert_eq!(b.get(), 42);

        b.set(100).unwrap();
        assert_eq!(a.get(), 100);
    }

    #[test]
    fn untracked_read_installs_no_edge() {
        let store = Store::new();
        let signal = store.signal(0);

        store
            .effect({
                let signal = signal.clone();
                move |_cx| {
                    signal.get_untracked();
                    Ok(None)
                }
            })
            .unwrap();

        assert_eq!(signal.observer_count(), 0);
    }

    #[test]
    fn tracked_read_installs_one_edge() {
        let store = Store::new();
        let signal = store.signal(0);

        store
            .effect({
                let signal = signal.clone();
                move |_cx| {
                    // Two reads, one edge.
                    signal.get();
                    signal.get();
                    Ok(None)
                }
            })
            .unwrap();

        assert_eq!(signal.observer_count(), 1);
    }

    #[test]
    fn plain_storage_after_store_drop() {
        let store = Store::new();
        let signal = store.signal(5);
        drop(store);

        assert_eq!(signal.get(), 5);
        signal.set(6).unwrap();
        assert_eq!(signal.get(), 6);
        assert_eq!(signal.observer_count(), 0);
    }
}
