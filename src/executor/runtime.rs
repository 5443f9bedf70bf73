//! Builds a one-shot snapshot of the reachable graph at launch: which nodes
//! are reachable from the roots, each node's children, how many of its
//! parents are themselves reachable (its initial pending-parents count), and
//! its level (longest distance from any root), via a breadth-first,
//! Kahn's-algorithm-style pass — the same technique used elsewhere in the
//! corpus for topological-level computation over a DAG.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::node::Node;

pub(crate) struct GraphSnapshot<E> {
    pub nodes: HashMap<u64, Arc<Node<E>>>,
    pub children_of: HashMap<u64, Vec<Arc<Node<E>>>>,
    pub indegree: HashMap<u64, usize>,
}

pub(crate) async fn build_snapshot<E: Clone + Send + Sync + 'static>(roots: &[Arc<Node<E>>]) -> GraphSnapshot<E> {
    let mut nodes: HashMap<u64, Arc<Node<E>>> = HashMap::new();
    let mut queue: VecDeque<Arc<Node<E>>> = roots.iter().cloned().collect();
    while let Some(n) = queue.pop_front() {
        if nodes.contains_key(&n.seq()) {
            continue;
        }
        let kids = n.children_snapshot().await;
        nodes.insert(n.seq(), n.clone());
        for k in kids {
            if !nodes.contains_key(&k.seq()) {
                queue.push_back(k);
            }
        }
    }

    let mut children_of = HashMap::new();
    let mut indegree = HashMap::new();
    for (seq, node) in &nodes {
        let kids = node.children_snapshot().await;
        children_of.insert(*seq, kids);
        let parents = node.parents_snapshot().await;
        let cnt = parents.iter().filter(|p| nodes.contains_key(&p.seq())).count();
        indegree.insert(*seq, cnt);
    }

    let root_seqs: HashSet<u64> = roots.iter().map(|r| r.seq()).collect();
    let mut levels: HashMap<u64, usize> = HashMap::new();
    let mut remaining = indegree.clone();
    let mut dq: VecDeque<u64> = VecDeque::new();
    for seq in &root_seqs {
        levels.insert(*seq, 0);
        remaining.insert(*seq, 0);
        dq.push_back(*seq);
    }
    let mut settled: HashSet<u64> = root_seqs.clone();
    while let Some(seq) = dq.pop_front() {
        let lvl = *levels.get(&seq).unwrap_or(&0);
        if let Some(kids) = children_of.get(&seq) {
            for child in kids {
                let cseq = child.seq();
                let new_level = lvl + 1;
                levels
                    .entry(cseq)
                    .and_modify(|l| *l = (*l).max(new_level))
                    .or_insert(new_level);
                if let Some(e) = remaining.get_mut(&cseq) {
                    if *e > 0 {
                        *e -= 1;
                    }
                    if *e == 0 && settled.insert(cseq) {
                        dq.push_back(cseq);
                    }
                }
            }
        }
    }

    for (seq, node) in &nodes {
        node.set_level(*levels.get(seq).unwrap_or(&0)).await;
    }

    GraphSnapshot {
        nodes,
        children_of,
        indegree,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBuilder;
    use crate::forward::ForwardAs;

    #[tokio::test]
    async fn levels_follow_longest_path_from_any_root() {
        let a = NodeBuilder::single("a", |_args| Box::pin(async move { Ok::<_, crate::error::BoxError>(0i64) })).build();
        let b = NodeBuilder::single("b", |_args| Box::pin(async move { Ok::<_, crate::error::BoxError>(0i64) })).build();
        let c = NodeBuilder::single("c", |_args| Box::pin(async move { Ok::<_, crate::error::BoxError>(0i64) })).build();
        let d = NodeBuilder::single("d", |_args| Box::pin(async move { Ok::<_, crate::error::BoxError>(0i64) })).build();

        // a -> b -> d, a -> c; d's longest path (through b) is 2, not 1
        // (the short path through c does not win).
        a.connect(&b, ForwardAs::None, None).await.unwrap();
        a.connect(&c, ForwardAs::None, None).await.unwrap();
        b.connect(&d, ForwardAs::None, None).await.unwrap();
        c.connect(&d, ForwardAs::None, None).await.unwrap();

        build_snapshot(&[a.clone()]).await;

        assert_eq!(a.metadata().await.level, 0);
        assert_eq!(b.metadata().await.level, 1);
        assert_eq!(c.metadata().await.level, 1);
        assert_eq!(d.metadata().await.level, 2);
    }

    #[tokio::test]
    async fn indegree_counts_only_reachable_parents() {
        let root = NodeBuilder::single("root", |_args| Box::pin(async move { Ok::<_, crate::error::BoxError>(0i64) })).build();
        let leaf = NodeBuilder::single("leaf", |_args| Box::pin(async move { Ok::<_, crate::error::BoxError>(0i64) })).build();
        root.connect(&leaf, ForwardAs::None, None).await.unwrap();

        let snap = build_snapshot(&[root.clone()]).await;
        assert_eq!(*snap.indegree.get(&root.seq()).unwrap(), 0);
        assert_eq!(*snap.indegree.get(&leaf.seq()).unwrap(), 1);
        assert!(snap.children_of.get(&leaf.seq()).unwrap().is_empty());
    }
}
