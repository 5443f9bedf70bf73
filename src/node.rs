//! The node: a single unit of work in the graph.
//!
//! A node wraps either a single-shot or a streaming async callable, plus the
//! bindings it's invoked with, a per-execution timeout, optional lifecycle
//! hooks, and its edges to parents/children. `exec_lock` (a `tokio::sync::Mutex`
//! guarding the node's mutable state) serializes connect/disconnect/redirect
//! against each other and against execution: mutation acquires it
//! non-blockingly via `try_lock` and fails fast with `SafeExecutionError` if
//! the node is currently running or already being mutated elsewhere.
//! Execution holds the same lock for the duration of the callable.
//!
//! Because `try_lock` never blocks, two nodes can never deadlock acquiring
//! each other's locks regardless of ordering — one side simply fails fast.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Mutex as TokioMutex;

use crate::binding::{resolve_bindings, Binding, Bindings};
use crate::error::{BoxError, GraphError, Result};
use crate::forward::{resolve_forward, ForwardAs, ForwardRule, ForwardTransform};
use crate::value::ElementType;

/// Caller-supplied opaque identifier. Uniqueness is not enforced; nodes are
/// distinguished internally by their own stable sequence number.
pub type NodeId = String;

/// The error type a callable or hook may fail with.
pub type CallableResult<E> = std::result::Result<E, BoxError>;

/// A single-shot callable: resolved arguments in, one value (or error) out.
pub type SingleShotFn<E> =
    Arc<dyn Fn(HashMap<String, E>) -> BoxFuture<'static, CallableResult<E>> + Send + Sync>;

/// A streaming callable: resolved arguments in, a stream of values out.
pub type StreamingFn<E> =
    Arc<dyn Fn(HashMap<String, E>) -> BoxStream<'static, CallableResult<E>> + Send + Sync>;

/// A node's underlying unit of work.
#[derive(Clone)]
pub enum Callable<E> {
    Single(SingleShotFn<E>),
    Streaming(StreamingFn<E>),
}

/// A lifecycle hook: a function plus the fixed bindings passed to it
/// (thunks resolved fresh on every invocation).
#[derive(Clone)]
pub struct Hook<E> {
    func: Arc<dyn Fn(HashMap<String, E>) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>,
    fixed: Bindings<E>,
}

impl<E: Clone + Send + Sync + 'static> Hook<E> {
    pub fn new(
        func: impl Fn(HashMap<String, E>) -> BoxFuture<'static, std::result::Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            func: Arc::new(func),
            fixed: HashMap::new(),
        }
    }

    pub fn with_fixed(mut self, name: impl Into<String>, value: E) -> Self {
        self.fixed.insert(name.into(), Binding::Value(value));
        self
    }

    async fn invoke(&self, node_id: &str) -> Result<()> {
        let args = resolve_bindings(&self.fixed);
        (self.func)(args)
            .await
            .map_err(|e| GraphError::propagated(node_id, e))
    }
}

async fn invoke_hook<E: Clone + Send + Sync + 'static>(hook: &Option<Hook<E>>, node_id: &str) -> Result<()> {
    match hook {
        Some(h) => h.invoke(node_id).await,
        None => Ok(()),
    }
}

#[derive(Default)]
pub struct NodeHooks<E> {
    pub on_connect: Option<Hook<E>>,
    pub on_disconnect: Option<Hook<E>>,
    pub before_run: Option<Hook<E>>,
    pub after_run: Option<Hook<E>>,
}

impl<E> Clone for NodeHooks<E> {
    fn clone(&self) -> Self {
        Self {
            on_connect: self.on_connect.clone(),
            on_disconnect: self.on_disconnect.clone(),
            before_run: self.before_run.clone(),
            after_run: self.after_run.clone(),
        }
    }
}

/// Per-node bookkeeping readable after (or during, for `runtime_seconds`)
/// execution.
#[derive(Debug, Clone, Default)]
pub struct NodeMetadata {
    /// Wall-clock duration of the last (or current, once started) execution.
    pub runtime_seconds: f64,
    /// Distance from the nearest root, assigned by the executor at launch.
    pub level: usize,
}

struct NodeState<E> {
    bindings: Bindings<E>,
    parents: Vec<Weak<Node<E>>>,
    children: Vec<Arc<Node<E>>>,
    forward_rules: HashMap<u64, ForwardRule<E>>,
    output: Option<E>,
    metadata: NodeMetadata,
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// A node in the graph: a callable plus its edges, bindings, and lifecycle
/// hooks.
pub struct Node<E> {
    seq: u64,
    pub id: NodeId,
    callable: Callable<E>,
    params: Vec<String>,
    variadic: bool,
    pub timeout: Duration,
    hooks: NodeHooks<E>,
    element_type: ElementType<E>,
    state: TokioMutex<NodeState<E>>,
    is_running: AtomicBool,
}

impl<E: Clone + Send + Sync + 'static> Node<E> {
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.callable, Callable::Streaming(_))
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub async fn output(&self) -> Option<E> {
        self.state.lock().await.output.clone()
    }

    pub async fn metadata(&self) -> NodeMetadata {
        self.state.lock().await.metadata.clone()
    }

    pub(crate) async fn set_level(&self, level: usize) {
        self.state.lock().await.metadata.level = level;
    }

    pub(crate) async fn children_snapshot(&self) -> Vec<Arc<Node<E>>> {
        self.state.lock().await.children.clone()
    }

    pub(crate) async fn parents_snapshot(&self) -> Vec<Arc<Node<E>>> {
        self.state
            .lock()
            .await
            .parents
            .iter()
            .filter_map(|w| w.upgrade())
            .collect()
    }

    /// The node's current children, in connect order.
    pub async fn children(&self) -> Vec<Arc<Node<E>>> {
        self.children_snapshot().await
    }

    /// The node's current parents (only those still alive).
    pub async fn parents(&self) -> Vec<Arc<Node<E>>> {
        self.parents_snapshot().await
    }

    pub(crate) async fn forward_rule(&self, parent_seq: u64) -> Option<ForwardRule<E>> {
        self.state.lock().await.forward_rules.get(&parent_seq).cloned()
    }

    fn require_single(&self) -> Result<SingleShotFn<E>> {
        match &self.callable {
            Callable::Single(f) => Ok(f.clone()),
            Callable::Streaming(_) => Err(GraphError::NotAsyncCallableError {
                node: self.id.clone(),
                expected: "single-shot",
                found: "streaming",
            }),
        }
    }

    fn require_streaming(&self) -> Result<StreamingFn<E>> {
        match &self.callable {
            Callable::Streaming(f) => Ok(f.clone()),
            Callable::Single(_) => Err(GraphError::NotAsyncCallableError {
                node: self.id.clone(),
                expected: "streaming",
                found: "single-shot",
            }),
        }
    }

    /// Connect `self` to `child`, optionally forwarding `self`'s output into
    /// one of `child`'s parameters.
    pub async fn connect(
        self: &Arc<Self>,
        child: &Arc<Self>,
        forward_as: ForwardAs,
        transform: Option<ForwardTransform<E>>,
    ) -> Result<()> {
        let mut self_guard = self
            .state
            .try_lock()
            .map_err(|_| GraphError::SafeExecutionError(self.id.clone()))?;
        self.connect_locked(&mut self_guard, child, forward_as, transform).await
    }

    async fn connect_locked(
        self: &Arc<Self>,
        self_guard: &mut NodeState<E>,
        child: &Arc<Self>,
        forward_as: ForwardAs,
        transform: Option<ForwardTransform<E>>,
    ) -> Result<()> {
        if Arc::ptr_eq(self, child) {
            return Err(GraphError::Validation(format!(
                "node '{}' cannot connect to itself",
                self.id
            )));
        }
        let mut child_guard = child
            .state
            .try_lock()
            .map_err(|_| GraphError::SafeExecutionError(child.id.clone()))?;

        if creates_cycle(child, self, &child_guard).await {
            return Err(GraphError::Validation(format!(
                "connecting '{}' to '{}' would create a cycle",
                self.id, child.id
            )));
        }

        let bound_keys: HashSet<String> = child_guard.bindings.keys().cloned().collect();
        let existing_targets: HashSet<String> = child_guard
            .forward_rules
            .values()
            .filter_map(|r| r.target.clone())
            .collect();
        let rule = resolve_forward(
            &child.id,
            &self.id,
            forward_as,
            &child.params,
            child.variadic,
            &bound_keys,
            &existing_targets,
            transform,
        )?;

        child_guard.parents.push(Arc::downgrade(self));
        self_guard.children.push(child.clone());
        child_guard.forward_rules.insert(self.seq, rule);
        drop(child_guard);

        invoke_hook(&self.hooks.on_connect, &self.id).await?;
        invoke_hook(&child.hooks.on_connect, &child.id).await?;
        Ok(())
    }

    /// Disconnect `self` from `child`, removing the edge and its forwarding
    /// rule.
    pub async fn disconnect(self: &Arc<Self>, child: &Arc<Self>) -> Result<()> {
        let mut self_guard = self
            .state
            .try_lock()
            .map_err(|_| GraphError::SafeExecutionError(self.id.clone()))?;
        self.disconnect_locked(&mut self_guard, child).await
    }

    async fn disconnect_locked(self: &Arc<Self>, self_guard: &mut NodeState<E>, child: &Arc<Self>) -> Result<()> {
        let mut child_guard = child
            .state
            .try_lock()
            .map_err(|_| GraphError::SafeExecutionError(child.id.clone()))?;
        self_guard.children.retain(|c| !Arc::ptr_eq(c, child));
        child_guard
            .parents
            .retain(|p| p.upgrade().map(|up| !Arc::ptr_eq(&up, self)).unwrap_or(false));
        child_guard.forward_rules.remove(&self.seq);
        drop(child_guard);

        invoke_hook(&self.hooks.on_disconnect, &self.id).await?;
        invoke_hook(&child.hooks.on_disconnect, &child.id).await?;
        Ok(())
    }

    /// Replace `self`'s entire child set in one atomic step: every current
    /// child is disconnected, then every node in `new_children` is connected
    /// with no forwarding. Observed under a single lock acquisition on
    /// `self`, so no other operation can see a partial child set mid-call.
    pub async fn redirect(self: &Arc<Self>, new_children: &[Arc<Self>]) -> Result<()> {
        let mut self_guard = self
            .state
            .try_lock()
            .map_err(|_| GraphError::SafeExecutionError(self.id.clone()))?;
        let current = self_guard.children.clone();
        for child in &current {
            self.disconnect_locked(&mut self_guard, child).await?;
        }
        for child in new_children {
            self.connect_locked(&mut self_guard, child, ForwardAs::None, None).await?;
        }
        Ok(())
    }

    /// Run the single-shot callable to completion. `forwarded` carries the
    /// values installed by completed parents, keyed by resolved target
    /// parameter name, and is overlaid onto the node's own bindings.
    pub async fn run(self: &Arc<Self>, forwarded: HashMap<String, E>) -> Result<E> {
        let single = self.require_single()?;
        let mut guard = self
            .state
            .try_lock()
            .map_err(|_| GraphError::SafeExecutionError(self.id.clone()))?;
        self.is_running.store(true, Ordering::SeqCst);

        let start = Instant::now();
        let outcome: Result<E> = match invoke_hook(&self.hooks.before_run, &self.id).await {
            Err(e) => Err(e),
            Ok(()) => {
                let mut args = resolve_bindings(&guard.bindings);
                args.extend(forwarded);

                match tokio::time::timeout(self.timeout, single(args)).await {
                    Ok(Ok(value)) => match self.element_type.check(&value) {
                        Ok(()) => Ok(value),
                        Err(reason) => Err(GraphError::MismatchChunkType {
                            node: self.id.clone(),
                            reason,
                        }),
                    },
                    Ok(Err(e)) => Err(GraphError::propagated(self.id.clone(), e)),
                    Err(_) => Err(GraphError::Timeout {
                        node: self.id.clone(),
                        timeout: self.timeout,
                    }),
                }
            }
        };

        // Runs whether or not `before_run` itself failed: after-run fires
        // whenever before-run fired, and `output` must stay unreadable
        // until after-run has completed, so the guard is held across it.
        guard.metadata.runtime_seconds = start.elapsed().as_secs_f64();
        let after_result = invoke_hook(&self.hooks.after_run, &self.id).await;
        if let Ok(value) = &outcome {
            guard.output = Some(value.clone());
        }
        self.is_running.store(false, Ordering::SeqCst);
        drop(guard);

        match after_result {
            Err(hook_err) if outcome.is_ok() => Err(hook_err),
            _ => outcome,
        }
    }

    /// Run the streaming callable, yielding each validated element as it is
    /// produced. The last element also becomes `output`. The per-node
    /// timeout bounds the whole run, not each individual element: each poll
    /// is capped by the remaining budget against a deadline fixed at start.
    pub fn run_yielding(self: &Arc<Self>, forwarded: HashMap<String, E>) -> impl futures::Stream<Item = Result<E>> + Send + 'static {
        let this = self.clone();
        async_stream::stream! {
            let streaming = match this.require_streaming() {
                Ok(f) => f,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut guard = match this.state.try_lock() {
                Ok(g) => g,
                Err(_) => {
                    yield Err(GraphError::SafeExecutionError(this.id.clone()));
                    return;
                }
            };
            this.is_running.store(true, Ordering::SeqCst);

            let start = Instant::now();
            let mut last_ok: Option<E> = None;
            let mut failed = false;

            match invoke_hook(&this.hooks.before_run, &this.id).await {
                Err(e) => {
                    failed = true;
                    yield Err(e);
                }
                Ok(()) => {
                    let mut args = resolve_bindings(&guard.bindings);
                    args.extend(forwarded);

                    let deadline = Instant::now() + this.timeout;
                    let mut inner = streaming(args);

                    loop {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            failed = true;
                            yield Err(GraphError::Timeout { node: this.id.clone(), timeout: this.timeout });
                            break;
                        }
                        match tokio::time::timeout(remaining, inner.next()).await {
                            Ok(Some(Ok(value))) => match this.element_type.check(&value) {
                                Ok(()) => {
                                    last_ok = Some(value.clone());
                                    yield Ok(value);
                                }
                                Err(reason) => {
                                    failed = true;
                                    yield Err(GraphError::MismatchChunkType { node: this.id.clone(), reason });
                                    break;
                                }
                            },
                            Ok(Some(Err(e))) => {
                                failed = true;
                                yield Err(GraphError::propagated(this.id.clone(), e));
                                break;
                            }
                            Ok(None) => break,
                            Err(_) => {
                                failed = true;
                                yield Err(GraphError::Timeout { node: this.id.clone(), timeout: this.timeout });
                                break;
                            }
                        }
                    }
                }
            }

            // Runs whether or not `before_run` itself failed: after-run
            // fires whenever before-run fired, and `output` must stay
            // unreadable until after-run has completed, so the guard is
            // held across it.
            guard.metadata.runtime_seconds = start.elapsed().as_secs_f64();
            let after_result = invoke_hook(&this.hooks.after_run, &this.id).await;
            if !failed {
                guard.output = last_ok;
            }
            this.is_running.store(false, Ordering::SeqCst);
            drop(guard);

            if let Err(e) = after_result {
                yield Err(e);
            }
        }
    }
}

async fn creates_cycle<E: Clone + Send + Sync + 'static>(
    from_child: &Arc<Node<E>>,
    looking_for: &Arc<Node<E>>,
    from_child_guard: &NodeState<E>,
) -> bool {
    let mut stack = from_child_guard.children.clone();
    let mut visited: HashSet<u64> = HashSet::new();
    visited.insert(from_child.seq);
    while let Some(node) = stack.pop() {
        if Arc::ptr_eq(&node, looking_for) {
            return true;
        }
        if !visited.insert(node.seq) {
            continue;
        }
        let kids = node.children_snapshot().await;
        stack.extend(kids);
    }
    false
}

/// Fluent construction of a [`Node`]. Mirrors the teacher's graph-builder
/// style: chained setters over a plain config struct, finished with `build`.
pub struct NodeBuilder<E> {
    id: NodeId,
    callable: Callable<E>,
    params: Vec<String>,
    variadic: bool,
    bindings: Bindings<E>,
    timeout: Duration,
    hooks: NodeHooks<E>,
    element_type: ElementType<E>,
}

impl<E: Clone + Send + Sync + 'static> NodeBuilder<E> {
    fn new(id: impl Into<NodeId>, callable: Callable<E>) -> Self {
        Self {
            id: id.into(),
            callable,
            params: Vec::new(),
            variadic: false,
            bindings: HashMap::new(),
            timeout: Duration::from_secs(60),
            hooks: NodeHooks::default(),
            element_type: ElementType::any(),
        }
    }

    pub fn single(
        id: impl Into<NodeId>,
        f: impl Fn(HashMap<String, E>) -> BoxFuture<'static, CallableResult<E>> + Send + Sync + 'static,
    ) -> Self {
        Self::new(id, Callable::Single(Arc::new(f)))
    }

    pub fn streaming(
        id: impl Into<NodeId>,
        f: impl Fn(HashMap<String, E>) -> BoxStream<'static, CallableResult<E>> + Send + Sync + 'static,
    ) -> Self {
        Self::new(id, Callable::Streaming(Arc::new(f)))
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn variadic(mut self, variadic: bool) -> Self {
        self.variadic = variadic;
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: E) -> Self {
        self.bindings.insert(name.into(), Binding::Value(value));
        self
    }

    pub fn bind_thunk(mut self, name: impl Into<String>, f: impl Fn() -> E + Send + Sync + 'static) -> Self {
        self.bindings.insert(name.into(), Binding::Thunk(Arc::new(f)));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn on_connect(mut self, hook: Hook<E>) -> Self {
        self.hooks.on_connect = Some(hook);
        self
    }

    pub fn on_disconnect(mut self, hook: Hook<E>) -> Self {
        self.hooks.on_disconnect = Some(hook);
        self
    }

    pub fn on_before_run(mut self, hook: Hook<E>) -> Self {
        self.hooks.before_run = Some(hook);
        self
    }

    pub fn on_after_run(mut self, hook: Hook<E>) -> Self {
        self.hooks.after_run = Some(hook);
        self
    }

    pub fn element_type(mut self, element_type: ElementType<E>) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn build(self) -> Arc<Node<E>> {
        Arc::new(Node {
            seq: next_seq(),
            id: self.id,
            callable: self.callable,
            params: self.params,
            variadic: self.variadic,
            timeout: self.timeout,
            hooks: self.hooks,
            element_type: self.element_type,
            state: TokioMutex::new(NodeState {
                bindings: self.bindings,
                parents: Vec::new(),
                children: Vec::new(),
                forward_rules: HashMap::new(),
                output: None,
                metadata: NodeMetadata::default(),
            }),
            is_running: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_self_loop() {
        let a = NodeBuilder::single("a", |_args| Box::pin(async move { Ok::<_, BoxError>(1i64) })).build();
        let err = a.connect(&a, ForwardAs::None, None).await.unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
    }

    #[tokio::test]
    async fn connect_rejects_cycle() {
        let a = NodeBuilder::single("a", |_args| Box::pin(async move { Ok::<_, BoxError>(1i64) })).build();
        let b = NodeBuilder::single("b", |_args| Box::pin(async move { Ok::<_, BoxError>(1i64) })).build();
        a.connect(&b, ForwardAs::None, None).await.unwrap();
        let err = b.connect(&a, ForwardAs::None, None).await.unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        // the attempted cycle must not have left a's edge set mutated
        assert_eq!(a.children_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_restores_edge_set_and_redirect_to_same_children_is_noop() {
        let a = NodeBuilder::single("a", |_args| Box::pin(async move { Ok::<_, BoxError>(1i64) })).build();
        let b = NodeBuilder::single("b", |_args| Box::pin(async move { Ok::<_, BoxError>(1i64) })).build();
        a.connect(&b, ForwardAs::None, None).await.unwrap();
        assert_eq!(a.children_snapshot().await.len(), 1);

        a.disconnect(&b).await.unwrap();
        assert!(a.children_snapshot().await.is_empty());

        a.connect(&b, ForwardAs::None, None).await.unwrap();
        let before = a.children_snapshot().await.len();
        a.redirect(&[b.clone()]).await.unwrap();
        assert_eq!(a.children_snapshot().await.len(), before);
    }

    #[tokio::test]
    async fn run_fails_fast_on_streaming_node() {
        let n = NodeBuilder::streaming("n", |_args| Box::pin(futures::stream::iter(vec![Ok::<_, BoxError>(1i64)]))).build();
        let err = n.run(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::NotAsyncCallableError { .. }));
    }

    #[tokio::test]
    async fn run_yielding_fails_fast_on_single_shot_node() {
        let n = NodeBuilder::single("n", |_args| Box::pin(async move { Ok::<_, BoxError>(1i64) })).build();
        let stream = n.run_yielding(HashMap::new());
        tokio::pin!(stream);
        let first = stream.next().await.unwrap();
        assert!(matches!(first.unwrap_err(), GraphError::NotAsyncCallableError { .. }));
    }

    #[tokio::test]
    async fn timeout_zero_fails_on_first_schedule() {
        let n = NodeBuilder::single("n", |_args| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(1i64)
            })
        })
        .timeout(Duration::from_secs(0))
        .build();
        let err = n.run(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::Timeout { .. }));
    }

    #[tokio::test]
    async fn element_type_mismatch_is_reported() {
        let n = NodeBuilder::single("n", |_args| Box::pin(async move { Ok::<_, BoxError>(-1i64) }))
            .element_type(ElementType::new("non_negative", |v: &i64| {
                if *v >= 0 {
                    Ok(())
                } else {
                    Err(format!("{v} is negative"))
                }
            }))
            .build();
        let err = n.run(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::MismatchChunkType { .. }));
    }

    #[tokio::test]
    async fn before_run_hook_failure_still_invokes_after_run() {
        use std::sync::atomic::{AtomicBool as StdAtomicBool, Ordering as StdOrdering};
        let callable_ran = Arc::new(StdAtomicBool::new(false));
        let after_run_ran = Arc::new(StdAtomicBool::new(false));
        let callable_ran_clone = callable_ran.clone();
        let after_run_ran_clone = after_run_ran.clone();

        let n = NodeBuilder::single("n", move |_args| {
            let callable_ran = callable_ran_clone.clone();
            Box::pin(async move {
                callable_ran.store(true, StdOrdering::SeqCst);
                Ok::<_, BoxError>(1i64)
            })
        })
        .on_before_run(Hook::new(|_args| Box::pin(async move { Err::<(), BoxError>("before_run boom".into()) })))
        .on_after_run(Hook::new(move |_args| {
            let after_run_ran = after_run_ran_clone.clone();
            Box::pin(async move {
                after_run_ran.store(true, StdOrdering::SeqCst);
                Ok(())
            })
        }))
        .build();

        let err = n.run(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::Propagated { .. }));
        assert!(!callable_ran.load(StdOrdering::SeqCst), "callable must not run when before_run fails");
        assert!(after_run_ran.load(StdOrdering::SeqCst), "after_run must still fire when before_run fails");
        assert!(n.output().await.is_none(), "output must stay unset when the callable never ran");
    }

    #[tokio::test]
    async fn before_run_hook_failure_still_invokes_after_run_for_streaming_node() {
        use std::sync::atomic::{AtomicBool as StdAtomicBool, Ordering as StdOrdering};
        let callable_ran = Arc::new(StdAtomicBool::new(false));
        let after_run_ran = Arc::new(StdAtomicBool::new(false));
        let callable_ran_clone = callable_ran.clone();
        let after_run_ran_clone = after_run_ran.clone();

        let n = NodeBuilder::streaming("n", move |_args| {
            callable_ran_clone.store(true, StdOrdering::SeqCst);
            Box::pin(futures::stream::iter(vec![Ok::<_, BoxError>(1i64)]))
        })
        .on_before_run(Hook::new(|_args| Box::pin(async move { Err::<(), BoxError>("before_run boom".into()) })))
        .on_after_run(Hook::new(move |_args| {
            let after_run_ran = after_run_ran_clone.clone();
            Box::pin(async move {
                after_run_ran.store(true, StdOrdering::SeqCst);
                Ok(())
            })
        }))
        .build();

        let stream = n.run_yielding(HashMap::new());
        tokio::pin!(stream);
        let first = stream.next().await.unwrap();
        assert!(matches!(first.unwrap_err(), GraphError::Propagated { .. }));
        assert!(stream.next().await.is_none());
        assert!(!callable_ran.load(StdOrdering::SeqCst), "callable must not run when before_run fails");
        assert!(after_run_ran.load(StdOrdering::SeqCst), "after_run must still fire when before_run fails");
        assert!(n.output().await.is_none(), "output must stay unset when the callable never ran");
    }

    #[tokio::test]
    async fn output_is_unreadable_until_after_run_hook_completes() {
        use std::sync::atomic::{AtomicBool as StdAtomicBool, Ordering as StdOrdering};
        let after_run_started = Arc::new(StdAtomicBool::new(false));
        let after_run_started_clone = after_run_started.clone();

        let n = NodeBuilder::single("n", |_args| Box::pin(async move { Ok::<_, BoxError>(42i64) }))
            .on_after_run(Hook::new(move |_args| {
                let after_run_started = after_run_started_clone.clone();
                Box::pin(async move {
                    after_run_started.store(true, StdOrdering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(())
                })
            }))
            .build();

        let n_clone = n.clone();
        let run_fut = tokio::spawn(async move { n_clone.run(HashMap::new()).await });

        while !after_run_started.load(StdOrdering::SeqCst) {
            tokio::task::yield_now().await;
        }
        // after-run is in flight and holding the state lock: a concurrent
        // `output()` read must block behind it rather than race ahead and
        // observe the value before after-run has completed.
        let read_while_after_run_in_flight = tokio::time::timeout(Duration::from_millis(10), n.output()).await;
        assert!(read_while_after_run_in_flight.is_err(), "output() must block while after_run is still running");

        run_fut.await.unwrap().unwrap();
        assert_eq!(n.output().await, Some(42));
    }

    #[tokio::test]
    async fn mutation_while_running_is_rejected() {
        use std::sync::atomic::{AtomicBool as StdAtomicBool, Ordering as StdOrdering};
        let started = Arc::new(StdAtomicBool::new(false));
        let started_clone = started.clone();
        let a = NodeBuilder::single("a", move |_args| {
            let started = started_clone.clone();
            Box::pin(async move {
                started.store(true, StdOrdering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, BoxError>(1i64)
            })
        })
        .build();
        let b = NodeBuilder::single("b", |_args| Box::pin(async move { Ok::<_, BoxError>(1i64) })).build();

        let a_clone = a.clone();
        let run_fut = tokio::spawn(async move { a_clone.run(HashMap::new()).await });

        while !started.load(StdOrdering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let err = a.connect(&b, ForwardAs::None, None).await.unwrap_err();
        assert!(matches!(err, GraphError::SafeExecutionError(_)));

        run_fut.await.unwrap().unwrap();
    }
}
