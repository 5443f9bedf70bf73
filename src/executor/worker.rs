//! The dynamically-sized worker pool: a supervisor task that scales worker
//! count to ready-queue depth, and the per-worker dequeue/execute/forward
//! loop.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex as TokioMutex;

use crate::chunk::Chunk;
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use crate::time::Clock;

use super::event::Event;
use super::ExecutorConfig;

/// Scheduling bookkeeping for one node, private to the executor: how many of
/// its reachable parents have yet to complete, and the forwarded values
/// those parents have installed so far.
pub(crate) struct Bookkeeping<E> {
    pub pending_parents: usize,
    pub forwarded: HashMap<String, E>,
}

pub(crate) struct RunState<E> {
    pub ready: TokioMutex<VecDeque<Arc<Node<E>>>>,
    pub book: HashMap<u64, TokioMutex<Bookkeeping<E>>>,
    pub children_of: HashMap<u64, Vec<Arc<Node<E>>>>,
    pub total: usize,
    pub completed_count: Arc<AtomicUsize>,
    pub completed: TokioMutex<Vec<Arc<Node<E>>>>,
    pub errors: TokioMutex<Vec<(NodeId, Arc<GraphError>)>>,
    pub stop: Arc<AtomicBool>,
    pub workers_alive: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub rx: TokioMutex<Option<tokio::sync::mpsc::UnboundedReceiver<Event<E>>>>,
}

pub(crate) fn spawn_pool<E: Clone + Send + Sync + std::fmt::Debug + 'static>(
    state: Arc<RunState<E>>,
    tx: UnboundedSender<Event<E>>,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
) {
    let depth = state.ready.try_lock().map(|q| q.len()).unwrap_or(1);
    let initial = depth.max(1).min(config.max_workers.max(1));
    for _ in 0..initial {
        state.workers_alive.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(worker_loop(state.clone(), tx.clone(), clock.clone()));
    }
    tokio::spawn(supervisor_loop(state, tx, config, clock));
}

async fn worker_loop<E: Clone + Send + Sync + std::fmt::Debug + 'static>(
    state: Arc<RunState<E>>,
    tx: UnboundedSender<Event<E>>,
    clock: Arc<dyn Clock>,
) {
    loop {
        if state.stop.load(Ordering::SeqCst) {
            break;
        }
        let maybe = {
            let mut q = state.ready.lock().await;
            q.pop_front()
        };
        match maybe {
            Some(node) => {
                state.in_flight.fetch_add(1, Ordering::SeqCst);
                execute_node(&state, &tx, &node).await;
                state.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            None => {
                if state.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                clock.sleep(Duration::from_millis(20)).await;
            }
        }
    }
    state.workers_alive.fetch_sub(1, Ordering::SeqCst);
    drop(tx);
}

async fn supervisor_loop<E: Clone + Send + Sync + std::fmt::Debug + 'static>(
    state: Arc<RunState<E>>,
    tx: UnboundedSender<Event<E>>,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
) {
    loop {
        let depth = state.ready.lock().await.len();
        let alive = state.workers_alive.load(Ordering::SeqCst);
        if depth > alive && alive < config.max_workers {
            let to_spawn = (depth - alive).min(config.max_workers - alive);
            for _ in 0..to_spawn {
                state.workers_alive.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(worker_loop(state.clone(), tx.clone(), clock.clone()));
            }
            tracing::debug!(spawned = to_spawn, alive = state.workers_alive.load(Ordering::SeqCst), "scaled up worker pool");
        }
        if state.workers_alive.load(Ordering::SeqCst) == 0 && state.ready.lock().await.is_empty() {
            break;
        }
        if state.completed_count.load(Ordering::SeqCst) >= state.total {
            break;
        }
        clock.sleep(config.poll_interval).await;
    }
    drop(tx);
}

async fn execute_node<E: Clone + Send + Sync + std::fmt::Debug + 'static>(
    state: &Arc<RunState<E>>,
    tx: &UnboundedSender<Event<E>>,
    node: &Arc<Node<E>>,
) {
    let seq = node.seq();
    let forwarded = {
        let mut bk = state.book[&seq].lock().await;
        std::mem::take(&mut bk.forwarded)
    };

    tracing::debug!(node = %node.id, "dequeued node");

    let mut had_error = false;
    if node.is_streaming() {
        let stream = node.run_yielding(forwarded);
        tokio::pin!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(value) => {
                    let _ = tx.send(Event::Chunk(Chunk::new(node.id.clone(), value)));
                }
                Err(e) => {
                    had_error = true;
                    tracing::warn!(node = %node.id, error = %e, "node failed");
                    state.errors.lock().await.push((node.id.clone(), Arc::new(e)));
                    state.stop.store(true, Ordering::SeqCst);
                }
            }
        }
    } else {
        match node.run(forwarded).await {
            Ok(_) => {}
            Err(e) => {
                had_error = true;
                tracing::warn!(node = %node.id, error = %e, "node failed");
                state.errors.lock().await.push((node.id.clone(), Arc::new(e)));
                state.stop.store(true, Ordering::SeqCst);
            }
        }
    }

    state.completed_count.fetch_add(1, Ordering::SeqCst);
    state.completed.lock().await.push(node.clone());
    let _ = tx.send(Event::Completed(node.clone()));

    tracing::debug!(node = %node.id, runtime_seconds = node.metadata().await.runtime_seconds, "after-run");

    if had_error {
        return;
    }

    let children = match state.children_of.get(&seq) {
        Some(c) => c.clone(),
        None => return,
    };
    let output_value = match node.output().await {
        Some(v) => v,
        None => return,
    };

    for child in &children {
        let rule = match child.forward_rule(seq).await {
            Some(r) => r,
            None => continue,
        };

        if let Some(target) = &rule.target {
            let result = match &rule.transform {
                Some(transform) => transform.apply(output_value.clone()).await,
                None => Ok(output_value.clone()),
            };
            match result {
                Ok(value) => {
                    let mut bk = state.book[&child.seq()].lock().await;
                    bk.forwarded.insert(target.clone(), value);
                }
                Err(e) => {
                    let err = GraphError::propagated(child.id.clone(), e);
                    tracing::warn!(node = %child.id, error = %err, "forwarding transform failed");
                    state.errors.lock().await.push((child.id.clone(), Arc::new(err)));
                    state.stop.store(true, Ordering::SeqCst);
                    continue;
                }
            }
        }

        let ready_now = {
            let mut bk = state.book[&child.seq()].lock().await;
            if bk.pending_parents > 0 {
                bk.pending_parents -= 1;
            }
            bk.pending_parents == 0
        };
        if ready_now {
            state.ready.lock().await.push_back(child.clone());
        }
    }
}
