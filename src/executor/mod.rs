//! The executor: runs a DAG of nodes starting from a set of root nodes,
//! respecting dependencies, with a dynamically-sized worker pool and a lazy
//! event stream of intermediate chunks and node completions.
//!
//! An executor is single-use: once `run()` or `yielding()` has been called,
//! a second call returns the validation error rather than starting a second
//! pass over the same nodes.

mod event;
mod runtime;
mod worker;

pub use event::Event;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt as _, StreamExt as _};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::chunk::Chunk;
use crate::error::{GraphError, Result};
use crate::node::{Node, NodeId};
use crate::time::{Clock, TokioClock};

use worker::{Bookkeeping, RunState};

/// Tunable knobs for an executor's scheduling loop. Plain fields with
/// documented defaults rather than a config-file layer, matching how the
/// teacher's own Pregel executor exposes its tunables.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Upper bound on the number of concurrently live worker tasks.
    pub max_workers: usize,
    /// How often the supervisor re-samples ready-queue depth to decide
    /// whether to scale the worker pool up.
    pub poll_interval: Duration,
    /// Default max wait between polls used by `run()`'s internal drain of
    /// `yielding()`.
    pub default_latency: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 64,
            poll_interval: Duration::from_millis(150),
            default_latency: Duration::from_millis(200),
        }
    }
}

/// A point-in-time read of the executor's scheduling state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorMetrics {
    pub workers_alive: usize,
    pub completed: usize,
}

/// Runs a DAG starting from `roots` to completion.
pub struct Executor<E> {
    pub id: String,
    pub description: Option<String>,
    roots: Vec<Arc<Node<E>>>,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    run_state: tokio::sync::OnceCell<Arc<RunState<E>>>,
    started: AtomicBool,
}

impl<E: Clone + Send + Sync + std::fmt::Debug + 'static> Executor<E> {
    pub fn new(id: impl Into<String>, roots: Vec<Arc<Node<E>>>) -> Self {
        Self::with_config(id, roots, ExecutorConfig::default())
    }

    pub fn with_config(id: impl Into<String>, roots: Vec<Arc<Node<E>>>, config: ExecutorConfig) -> Self {
        Self {
            id: id.into(),
            description: None,
            roots,
            config,
            clock: Arc::new(TokioClock),
            run_state: tokio::sync::OnceCell::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the time source, e.g. with a virtual clock under
    /// `tokio::time::pause` for deterministic tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// All nodes reachable from the roots with no children. Fails if `roots`
    /// is empty.
    pub async fn leaves(&self) -> Result<Vec<Arc<Node<E>>>> {
        if self.roots.is_empty() {
            return Err(GraphError::Validation("roots list is empty".to_string()));
        }
        let snap = runtime::build_snapshot(&self.roots).await;
        let mut out: Vec<Arc<Node<E>>> = snap
            .nodes
            .values()
            .filter(|n| snap.children_of.get(&n.seq()).map(|c| c.is_empty()).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|n| n.seq());
        Ok(out)
    }

    /// Signal every worker to stop dequeuing further nodes. Workers already
    /// executing a node finish it; no new node's before-run fires afterward.
    pub fn stop_tree(&self) {
        if let Some(state) = self.run_state.get() {
            state.stop.store(true, Ordering::SeqCst);
        }
    }

    /// Errors recorded so far, tagged by the node each is attributed to.
    pub async fn errors(&self) -> Vec<(NodeId, Arc<GraphError>)> {
        match self.run_state.get() {
            Some(state) => state.errors.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// A snapshot of worker-pool and completion counters.
    pub fn metrics(&self) -> ExecutorMetrics {
        match self.run_state.get() {
            Some(state) => ExecutorMetrics {
                workers_alive: state.workers_alive.load(Ordering::SeqCst),
                completed: state.completed_count.load(Ordering::SeqCst),
            },
            None => ExecutorMetrics::default(),
        }
    }

    async fn ensure_started(&self) -> Result<Arc<RunState<E>>> {
        if self.roots.is_empty() {
            return Err(GraphError::Validation("roots list is empty".to_string()));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return self.run_state.get().cloned().ok_or_else(|| {
                GraphError::Validation(format!("executor '{}' is single-use and has already run", self.id))
            });
        }

        tracing::info!(executor = %self.id, roots = self.roots.len(), "executor starting");

        let snap = runtime::build_snapshot(&self.roots).await;
        let root_seqs: std::collections::HashSet<u64> = self.roots.iter().map(|r| r.seq()).collect();

        let mut ready: VecDeque<Arc<Node<E>>> = VecDeque::new();
        let mut book = std::collections::HashMap::new();
        for (seq, _node) in &snap.nodes {
            let pending = if root_seqs.contains(seq) {
                0
            } else {
                *snap.indegree.get(seq).unwrap_or(&0)
            };
            book.insert(
                *seq,
                tokio::sync::Mutex::new(Bookkeeping {
                    pending_parents: pending,
                    forwarded: std::collections::HashMap::new(),
                }),
            );
        }
        for r in &self.roots {
            ready.push_back(r.clone());
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let state = Arc::new(RunState {
            ready: tokio::sync::Mutex::new(ready),
            book,
            children_of: snap.children_of,
            total: snap.nodes.len(),
            completed_count: Arc::new(AtomicUsize::new(0)),
            completed: tokio::sync::Mutex::new(Vec::new()),
            errors: tokio::sync::Mutex::new(Vec::new()),
            stop: Arc::new(AtomicBool::new(false)),
            workers_alive: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            rx: tokio::sync::Mutex::new(Some(rx)),
        });

        let _ = self.run_state.set(state.clone());
        worker::spawn_pool(state.clone(), tx, self.config.clone(), self.clock.clone());
        Ok(state)
    }

    /// The lazy event stream: streamed chunks and node-completion notices, in
    /// the order workers produce them. `latency` bounds how long the stream
    /// waits between polls of its internal channel before re-checking for
    /// drain.
    pub fn yielding(&self, latency: Duration) -> impl futures::Stream<Item = Event<E>> + Send + '_ {
        async_stream::stream! {
            let state = match self.ensure_started().await {
                Ok(s) => s,
                Err(_) => return,
            };
            let rx = {
                let mut guard = state.rx.lock().await;
                match guard.take() {
                    Some(rx) => rx,
                    None => return,
                }
            };
            // `tokio_stream`'s `timeout` combinator bounds each poll by
            // `latency`, matching the teacher's own `ReceiverStream`-over-`mpsc`
            // pattern (`langgraph-core`'s `stream_chunks_with_modes`), adapted
            // here with a timeout wrapper since this stream needs to notice a
            // drained-and-idle pool rather than just forward every item.
            let mut timed = tokio_stream::StreamExt::timeout(UnboundedReceiverStream::new(rx), latency);
            loop {
                match timed.next().await {
                    Some(Ok(event)) => yield event,
                    None => break,
                    Some(Err(_elapsed)) => {
                        if state.workers_alive.load(Ordering::SeqCst) == 0 {
                            while let Some(Some(Ok(event))) = timed.next().now_or_never() {
                                yield event;
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Run to completion, collecting every completed node and every
    /// streamed chunk. Returns immediately with empty results if `roots` is
    /// empty.
    pub async fn run(&self) -> (Vec<Arc<Node<E>>>, Vec<Chunk<E>>) {
        if self.roots.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let mut completed = Vec::new();
        let mut chunks = Vec::new();
        let stream = self.yielding(self.config.default_latency);
        tokio::pin!(stream);
        while let Some(event) = stream.next().await {
            match event {
                Event::Chunk(c) => chunks.push(c),
                Event::Completed(n) => completed.push(n),
            }
        }
        tracing::info!(executor = %self.id, completed = completed.len(), chunks = chunks.len(), "executor drained");
        (completed, chunks)
    }
}
