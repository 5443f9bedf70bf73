//! Property-based tests over randomly generated layered DAGs: acyclicity is
//! enforced at connect time, and every reachable node's level equals one
//! plus the maximum level among its parents (zero for roots) — checked
//! against a level computed independently from the edge list the test
//! built, not from any internal executor state.

use std::collections::HashMap;
use std::sync::Arc;

use dagflow::{ForwardAs, Node, NodeBuilder};
use proptest::prelude::*;

/// Builds a layered DAG (edges only ever point from an earlier layer to a
/// later one, so the result is acyclic by construction) and returns the
/// nodes alongside the edge list used to wire them, keyed by index.
async fn build_layered_dag(layer_sizes: &[usize], edge_picks: &[u8]) -> (Vec<Arc<Node<i64>>>, Vec<(usize, usize)>) {
    let mut nodes: Vec<Arc<Node<i64>>> = Vec::new();
    let mut layer_bounds: Vec<(usize, usize)> = Vec::new();
    for (layer_idx, &size) in layer_sizes.iter().enumerate() {
        let start = nodes.len();
        for i in 0..size {
            let id = format!("n{layer_idx}_{i}");
            nodes.push(NodeBuilder::single(id, |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>(0i64) })).build());
        }
        layer_bounds.push((start, nodes.len()));
    }

    let mut edges = Vec::new();
    let mut pick_idx = 0;
    for w in layer_bounds.windows(2) {
        let (prev_start, prev_end) = w[0];
        let (cur_start, cur_end) = w[1];
        for child_idx in cur_start..cur_end {
            for parent_idx in prev_start..prev_end {
                let connect = if edge_picks.is_empty() {
                    true
                } else {
                    let pick = edge_picks[pick_idx % edge_picks.len()];
                    pick_idx += 1;
                    pick % 2 == 0
                };
                if connect {
                    nodes[parent_idx].connect(&nodes[child_idx], ForwardAs::None, None).await.unwrap();
                    edges.push((parent_idx, child_idx));
                }
            }
        }
    }
    (nodes, edges)
}

fn expected_levels(edges: &[(usize, usize)], roots: &[usize]) -> HashMap<usize, usize> {
    let mut children_of: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut parents_of: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(p, c) in edges {
        children_of.entry(p).or_default().push(c);
        parents_of.entry(c).or_default().push(p);
    }

    let mut reachable: std::collections::HashSet<usize> = roots.iter().copied().collect();
    let mut queue: std::collections::VecDeque<usize> = roots.iter().copied().collect();
    while let Some(n) = queue.pop_front() {
        for &c in children_of.get(&n).unwrap_or(&Vec::new()) {
            if reachable.insert(c) {
                queue.push_back(c);
            }
        }
    }

    let mut levels: HashMap<usize, usize> = HashMap::new();
    for &r in roots {
        levels.insert(r, 0);
    }
    let mut remaining: HashMap<usize, usize> = HashMap::new();
    for &n in &reachable {
        let cnt = parents_of
            .get(&n)
            .map(|ps| ps.iter().filter(|p| reachable.contains(p)).count())
            .unwrap_or(0);
        remaining.insert(n, if roots.contains(&n) { 0 } else { cnt });
    }
    let mut queue: std::collections::VecDeque<usize> = roots.iter().copied().collect();
    let mut settled: std::collections::HashSet<usize> = roots.iter().copied().collect();
    while let Some(n) = queue.pop_front() {
        let lvl = *levels.get(&n).unwrap_or(&0);
        for &c in children_of.get(&n).unwrap_or(&Vec::new()) {
            if !reachable.contains(&c) {
                continue;
            }
            let new_level = lvl + 1;
            levels.entry(c).and_modify(|l| *l = (*l).max(new_level)).or_insert(new_level);
            if let Some(e) = remaining.get_mut(&c) {
                if *e > 0 {
                    *e -= 1;
                }
                if *e == 0 && settled.insert(c) {
                    queue.push_back(c);
                }
            }
        }
    }
    levels.retain(|n, _| reachable.contains(n));
    levels
}

proptest! {
    #[test]
    fn connecting_an_ancestor_as_a_child_always_fails(_seed in 0u64..10_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let a = NodeBuilder::single("a", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>(0i64) })).build();
            let b = NodeBuilder::single("b", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>(0i64) })).build();
            let c = NodeBuilder::single("c", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>(0i64) })).build();

            a.connect(&b, ForwardAs::None, None).await.unwrap();
            b.connect(&c, ForwardAs::None, None).await.unwrap();

            let before_a = a.children().await.len();
            let before_c = c.children().await.len();
            let err = c.connect(&a, ForwardAs::None, None).await;
            prop_assert!(err.is_err());
            prop_assert_eq!(a.children().await.len(), before_a);
            prop_assert_eq!(c.children().await.len(), before_c);
            Ok(())
        })?;
    }

    #[test]
    fn levels_match_an_independently_computed_longest_path(
        widths in prop::collection::vec(1usize..4, 2..5),
        picks in prop::collection::vec(0u8..2, 0..64),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let (nodes, edges) = build_layered_dag(&widths, &picks).await;
            let roots: Vec<usize> = (0..widths[0]).collect();
            let root_nodes: Vec<Arc<Node<i64>>> = roots.iter().map(|&i| nodes[i].clone()).collect();

            let executor = dagflow::Executor::new("levels", root_nodes);
            let _ = executor.leaves().await;

            let expected = expected_levels(&edges, &roots);
            for (idx, expected_level) in &expected {
                prop_assert_eq!(nodes[*idx].metadata().await.level, *expected_level);
            }
            Ok(())
        })?;
    }
}
