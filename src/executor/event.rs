//! Events emitted by [`super::Executor::yielding`].

use std::sync::Arc;

use crate::chunk::Chunk;
use crate::node::Node;

/// One item from the executor's lazy event stream: either a streamed chunk,
/// or notice that a node has finished (successfully or not — check
/// `executor.errors()` for failures).
pub enum Event<E> {
    Chunk(Chunk<E>),
    Completed(Arc<Node<E>>),
}

impl<E: Clone> Clone for Event<E> {
    fn clone(&self) -> Self {
        match self {
            Event::Chunk(c) => Event::Chunk(c.clone()),
            Event::Completed(n) => Event::Completed(n.clone()),
        }
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for Event<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Chunk(c) => f.debug_tuple("Chunk").field(c).finish(),
            Event::Completed(n) => f.debug_tuple("Completed").field(&n.id).finish(),
        }
    }
}
