//! Bindings: the fixed arguments supplied to a node's callable or hooks.
//!
//! A binding is either a concrete value or a thunk re-evaluated on every
//! invocation — useful for a parameter that should read some ambient state
//! (a clock, a counter, a shared handle) fresh each time the node runs,
//! rather than once at construction.

use std::collections::HashMap;
use std::sync::Arc;

/// One bound argument: a literal value, or a closure producing one on demand.
pub enum Binding<E> {
    Value(E),
    Thunk(Arc<dyn Fn() -> E + Send + Sync>),
}

impl<E: Clone> Binding<E> {
    /// Resolve to a concrete value, invoking the thunk if this is a `Thunk`.
    pub fn resolve(&self) -> E {
        match self {
            Binding::Value(v) => v.clone(),
            Binding::Thunk(f) => f(),
        }
    }
}

impl<E: Clone> Clone for Binding<E> {
    fn clone(&self) -> Self {
        match self {
            Binding::Value(v) => Binding::Value(v.clone()),
            Binding::Thunk(f) => Binding::Thunk(f.clone()),
        }
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for Binding<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Binding::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl<E> From<E> for Binding<E> {
    fn from(v: E) -> Self {
        Binding::Value(v)
    }
}

/// A node's fixed-argument table, keyed by parameter name.
pub type Bindings<E> = HashMap<String, Binding<E>>;

/// Resolve every binding in `bindings` to a concrete value.
pub fn resolve_bindings<E: Clone>(bindings: &Bindings<E>) -> HashMap<String, E> {
    bindings.iter().map(|(k, b)| (k.clone(), b.resolve())).collect()
}
