//! Error types for graph construction and execution.
//!
//! `GraphError` enumerates every discriminated failure kind the core raises:
//! connect-time validation failures (forwarding conflicts, cycles,
//! mutation-while-running), and run-time failures (timeouts, type mismatches,
//! and errors propagated from a user callable, hook, or forwarding
//! transform). There is no shared supertype beyond the enum itself — callers
//! match on the variant they care about.

use std::time::Duration;
use thiserror::Error;

use crate::node::NodeId;

/// Convenience result type using [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

/// The error type a user callable, hook, or forwarding transform may return.
///
/// Kept opaque rather than requiring callers to construct a [`GraphError`]
/// themselves, so node logic can use `?` with whatever error type it already
/// has.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors the core can raise, from graph construction through execution.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A connect/disconnect/redirect was attempted on a node whose `exec_lock`
    /// is currently held — either the node is running, or another mutation
    /// on it is already in flight.
    #[error("node '{0}' is running or already being mutated; refusing to connect/disconnect/redirect")]
    SafeExecutionError(NodeId),

    /// A named forward target was already bound in the child (either by a
    /// literal binding or by another parent's forwarding rule).
    #[error("forward target '{target}' on edge {parent} -> {child} is already bound")]
    ForwardingOverrideError {
        parent: NodeId,
        child: NodeId,
        target: String,
    },

    /// A named forward target is not a declared parameter of the child's
    /// callable, and the child does not accept a variadic sink.
    #[error("forward target '{target}' on edge {parent} -> {child} is not a parameter of '{child}'")]
    ForwardingParameterError {
        parent: NodeId,
        child: NodeId,
        target: String,
    },

    /// `AUTO` forwarding requires exactly one eligible parameter on the
    /// child (declared, not already bound, not already claimed by another
    /// parent's forwarding rule). Zero or more than one were found.
    #[error("AUTO forwarding into '{child}' requires exactly one eligible parameter, found {eligible}")]
    AutoForwardError { child: NodeId, eligible: usize },

    /// A produced value (single-shot return or streamed chunk) failed the
    /// node's declared element-type check.
    #[error("node '{node}' produced a value that does not satisfy its declared element type: {reason}")]
    MismatchChunkType { node: NodeId, reason: String },

    /// `run()` was called on a node whose callable is streaming, or
    /// `run_yielding()` was called on a node whose callable is single-shot.
    #[error("node '{node}' callable kind mismatch: expected {expected}, found {found}")]
    NotAsyncCallableError {
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },

    /// The node's callable exceeded its per-node timeout.
    #[error("node '{node}' timed out after {timeout:?}")]
    Timeout { node: NodeId, timeout: Duration },

    /// An exception raised by the user's callable, a lifecycle hook, or a
    /// forwarding transform, tagged with the node it is attributed to.
    #[error("node '{node}' propagated an error: {source}")]
    Propagated {
        node: NodeId,
        #[source]
        source: BoxError,
    },

    /// Graph-structural validation failed: a cycle, a self-connect, or an
    /// empty `roots` list where one is required. The forwarding- and
    /// mutation-specific errors above are named explicitly; this is the
    /// catch-all for everything else connect-time validation can reject.
    #[error("graph validation failed: {0}")]
    Validation(String),
}

impl GraphError {
    /// Wrap a user error as a [`GraphError::Propagated`] attributed to `node`.
    pub fn propagated(node: impl Into<NodeId>, source: BoxError) -> Self {
        Self::Propagated {
            node: node.into(),
            source,
        }
    }
}
