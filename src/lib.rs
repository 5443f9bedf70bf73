//! # dagflow — async DAG task-graph execution
//!
//! `dagflow` runs a directed acyclic graph of async tasks: each [`Node`]
//! wraps a single-shot or streaming callable, nodes are wired together with
//! [`Node::connect`], and an [`Executor`] walks the graph from a set of root
//! nodes outward, dispatching each node to a worker as soon as all of its
//! parents have completed.
//!
//! ## Core concepts
//!
//! - **Node** — one unit of work: a callable, its bound arguments, a
//!   per-execution timeout, and optional lifecycle hooks
//!   (`on_connect`/`on_disconnect`/`before_run`/`after_run`).
//! - **Forwarding** — a parent's output can be bound into one of its child's
//!   parameters automatically ([`forward::AUTO`]), by name
//!   ([`ForwardAs::Named`]), or not at all ([`ForwardAs::None`]); see
//!   [`forward`].
//! - **Executor** — a dynamically-sized worker pool that schedules ready
//!   nodes (all parents complete), stops dispatching new work on the first
//!   error, and exposes both a blocking [`Executor::run`] and a lazy
//!   [`Executor::yielding`] event stream.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dagflow::{Executor, NodeBuilder};
//!
//! # async fn demo() {
//! let root = NodeBuilder::single("fetch", |_args| {
//!     Box::pin(async move { Ok::<_, dagflow::BoxError>(1i64) })
//! })
//! .build();
//!
//! let double = NodeBuilder::single("double", |args| {
//!     Box::pin(async move {
//!         let n: i64 = *args.get("n").unwrap();
//!         Ok::<_, dagflow::BoxError>(n * 2)
//!     })
//! })
//! .param("n")
//! .build();
//!
//! root.connect(&double, dagflow::forward::AUTO, None).await.unwrap();
//!
//! let executor = Executor::new("demo", vec![root]);
//! let (completed, _chunks) = executor.run().await;
//! assert_eq!(completed.len(), 2);
//! # }
//! ```
//!
//! ## Non-goals
//!
//! Persistence of graph state, cycles, distributed execution across process
//! boundaries, prioritized scheduling, and automatic retry are all out of
//! scope — callers who need retry semantics wrap their own callable.

pub mod binding;
pub mod chunk;
pub mod error;
pub mod executor;
pub mod forward;
pub mod node;
pub mod time;
pub mod value;

pub use binding::{resolve_bindings, Binding, Bindings};
pub use chunk::Chunk;
pub use error::{BoxError, GraphError, Result};
pub use executor::{Event, Executor, ExecutorConfig, ExecutorMetrics};
pub use forward::{ForwardAs, ForwardTransform, AUTO};
pub use node::{Callable, CallableResult, Hook, Node, NodeBuilder, NodeId, NodeMetadata, SingleShotFn, StreamingFn};
pub use time::{Clock, TokioClock};
pub use value::ElementType;
