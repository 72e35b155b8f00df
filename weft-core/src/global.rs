//! Process-wide default store.
//!
//! Thin mirrors of the [`Store`] methods, delegating to a lazily created
//! singleton. Applications that need isolation create their own stores;
//! these free functions are the convenient front door for everything
//! else.

use std::sync::OnceLock;

use crate::error::Result;
use crate::reactive::{
    EffectContext, EffectHandle, EffectOptions, EffectOutcome, Memo, MemoOptions, Signal, Store,
};

static DEFAULT_STORE: OnceLock<Store> = OnceLock::new();

/// The process-wide default store.
pub fn store() -> &'static Store {
    DEFAULT_STORE.get_or_init(Store::new)
}

/// Create a signal in the default store.
pub fn signal<T>(initial: T) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    store().signal(initial)
}

/// Create a memo in the default store.
pub fn memo<T, F>(compute: F) -> Result<Memo<T>>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    store().memo(compute)
}

/// Create a memo in the default store, with options.
pub fn memo_with<T, F>(compute: F, options: MemoOptions<T>) -> Result<Memo<T>>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    store().memo_with(compute, options)
}

/// Create an effect in the default store.
pub fn effect<F>(body: F) -> Result<EffectHandle>
where
    F: Fn(&EffectContext) -> EffectOutcome + Send + Sync + 'static,
{
    store().effect(body)
}

/// Create an effect in the default store, with options.
pub fn effect_with<F>(body: F, options: EffectOptions) -> Result<EffectHandle>
where
    F: Fn(&EffectContext) -> EffectOutcome + Send + Sync + 'static,
{
    store().effect_with(body, options)
}

/// Run `body` with flushing deferred to the outermost batch exit, in the
/// default store.
pub fn batch<T, F>(body: F) -> Result<T>
where
    F: FnOnce() -> T,
{
    store().batch(body)
}

/// Run `reader` without dependency tracking, in the default store.
pub fn untracked<T, F>(reader: F) -> T
where
    F: FnOnce() -> T,
{
    store().untracked(reader)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    // One test exercises the whole mirror surface: the default store is
    // shared process state, and the scheduler is cooperative.
    #[test]
    fn default_store_mirrors_work() {
        let count = super::signal(1);
        let doubled = super::memo({
            let count = count.clone();
            move || count.get() * 2
        })
        .unwrap();

        let runs = Arc::new(AtomicI32::new(0));
        let handle = super::effect({
            let doubled = doubled.clone();
            let runs = runs.clone();
            move |_cx| {
                doubled.get();
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        super::batch(|| {
            count.set(2).unwrap();
            count.set(3).unwrap();
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(doubled.get(), 6);

        let untracked_value = super::untracked(|| count.get());
        assert_eq!(untracked_value, 3);

        handle.cancel();
        count.set(4).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
