//! Dynamic values compared by the structural equality helper.
//!
//! Signals can hold any Rust type, but the default change predicate for
//! dynamic state is structural comparison, and structural comparison needs
//! a value representation that can express shared (and therefore cyclic)
//! structure. [`Value`] is that representation: containers sit behind an
//! `Arc`, so two handles can point at the same underlying storage and a
//! container can, directly or indirectly, contain itself.
//!
//! Identity matters here. The comparison fast path ("these are literally
//! the same container") and the cycle cache both key on the address of the
//! shared allocation, never on contents.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// A compiled-pattern value: source text, flag set, and the cursor left by
/// the most recent match. Two patterns are equal only when all three agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub source: String,
    pub flags: String,
    pub last_match: usize,
}

impl Pattern {
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
            last_match: 0,
        }
    }
}

/// A wrapper type that stands in for its unwrapped value during
/// comparison. Containers implementing this are compared by what
/// [`Unwrap::value_of`] returns, not by their own shape.
pub trait Unwrap: Send + Sync {
    fn value_of(&self) -> Value;
}

/// A dynamic value with shared-structure containers.
///
/// Leaves (`Null`, `Bool`, `Number`, `Text`) are compared by content.
/// Containers are compared structurally by the helpers in the parent
/// module, with identity fast paths and cycle protection.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    /// Packed numeric data. Compared elementwise, like a list of numbers.
    Bytes(Arc<[u8]>),
    /// Ordered sequence of values.
    List(Arc<RwLock<Vec<Value>>>),
    /// Keyed associative container with string keys.
    Record(Arc<RwLock<BTreeMap<String, Value>>>),
    /// Unordered container of scalar keys. Equality is membership-only.
    Set(Arc<RwLock<BTreeSet<String>>>),
    Pattern(Arc<Pattern>),
    /// A value that defers comparison to its [`Unwrap::value_of`] result.
    Wrapped(Arc<dyn Unwrap>),
}

impl Value {
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Value::Text(text.into())
    }

    pub fn bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Value::Bytes(bytes.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn record(fields: BTreeMap<String, Value>) -> Self {
        Value::Record(Arc::new(RwLock::new(fields)))
    }

    pub fn set(members: BTreeSet<String>) -> Self {
        Value::Set(Arc::new(RwLock::new(members)))
    }

    pub fn pattern(pattern: Pattern) -> Self {
        Value::Pattern(Arc::new(pattern))
    }

    pub fn wrapped(inner: Arc<dyn Unwrap>) -> Self {
        Value::Wrapped(inner)
    }

    /// The address of the shared allocation backing this value, if it has
    /// one. Leaves have no identity; containers are identified by their
    /// `Arc` pointer.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Text(_) => None,
            Value::Bytes(bytes) => Some(Arc::as_ptr(bytes) as *const u8 as usize),
            Value::List(items) => Some(Arc::as_ptr(items) as usize),
            Value::Record(fields) => Some(Arc::as_ptr(fields) as usize),
            Value::Set(members) => Some(Arc::as_ptr(members) as usize),
            Value::Pattern(pattern) => Some(Arc::as_ptr(pattern) as usize),
            Value::Wrapped(inner) => Some(Arc::as_ptr(inner) as *const () as usize),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value.into())
    }
}

impl PartialEq for Value {
    /// Structural equality with strict leaves and no depth limit. Cyclic
    /// values compare conservatively (see the parent module); identical
    /// handles always compare equal via the identity fast path.
    fn eq(&self, other: &Self) -> bool {
        super::deep_equal(self, other, &super::LeafComparator::Strict, None)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Value::Number(value) => f.debug_tuple("Number").field(value).finish(),
            Value::Text(value) => f.debug_tuple("Text").field(value).finish(),
            Value::Bytes(value) => f.debug_tuple("Bytes").field(&value.len()).finish(),
            Value::List(items) => {
                let len = items.read().map(|items| items.len()).unwrap_or(0);
                f.debug_struct("List").field("len", &len).finish()
            }
            Value::Record(fields) => {
                let len = fields.read().map(|fields| fields.len()).unwrap_or(0);
                f.debug_struct("Record").field("len", &len).finish()
            }
            Value::Set(members) => {
                let len = members.read().map(|members| members.len()).unwrap_or(0);
                f.debug_struct("Set").field("len", &len).finish()
            }
            Value::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
            Value::Wrapped(_) => f.write_str("Wrapped(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_have_no_identity() {
        assert!(Value::Null.identity().is_none());
        assert!(Value::Bool(true).identity().is_none());
        assert!(Value::Number(1.5).identity().is_none());
        assert!(Value::text("hello").identity().is_none());
    }

    #[test]
    fn clones_share_identity() {
        let list = Value::list(vec![Value::Number(1.0)]);
        let clone = list.clone();
        assert_eq!(list.identity(), clone.identity());

        let rebuilt = Value::list(vec![Value::Number(1.0)]);
        assert_ne!(list.identity(), rebuilt.identity());
    }

    #[test]
    fn from_conversions() {
        assert!(matches!(Value::from(true), Value::Bool(true)));
        assert!(matches!(Value::from(2.5), Value::Number(_)));
        assert!(matches!(Value::from(7i64), Value::Number(_)));
        assert!(matches!(Value::from("abc"), Value::Text(_)));
    }
}
