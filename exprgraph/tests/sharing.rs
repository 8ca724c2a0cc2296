use std::collections::{HashMap, HashSet};

use exprgraph::prelude::*;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha20Rng;

/// Build a random DAG of `size` nodes. Composites pick their children among earlier nodes, with
/// repeats, so sharing and duplicated operands both show up.
fn random_graph(rng: &mut impl Rng, size: usize) -> (ExprGraph, Vec<NodeId>) {
    let mut graph = ExprGraph::new();
    let mut nodes: Vec<NodeId> = Vec::with_capacity(size);
    let mut expected: HashMap<NodeId, u32> = HashMap::new();

    for _ in 0..size {
        if nodes.len() < 2 || rng.random_bool(0.3) {
            let id = if rng.random_bool(0.5) {
                graph.int_literal(rng.random_range(-100..100))
            } else {
                graph.var_use(format!("v{}", rng.random_range(0..8)))
            };
            nodes.push(id);
            continue;
        }

        let arity = match rng.random_range(0..3) {
            0 => 2,
            _ => rng.random_range(0..6),
        };
        let children: Vec<NodeId> = (0..arity)
            .map(|_| nodes[rng.random_range(0..nodes.len())])
            .collect();

        let increments_before = graph.stats().increments;
        let id = match rng.random_range(0..3) {
            0 if children.len() == 2 => graph
                .comparison(ComparisonOp::Le, children[0], children[1])
                .unwrap(),
            1 => graph
                .arithmetic(ArithmeticOp::Div, children.iter().copied())
                .unwrap(),
            _ => graph.call("f", children.iter().copied()).unwrap(),
        };
        // One increment per edge, repeats included.
        assert_eq!(
            graph.stats().increments - increments_before,
            children.len()
        );
        for child in &children {
            *expected.entry(*child).or_insert(0) += 1;
        }
        nodes.push(id);
    }

    for &id in &nodes {
        assert_eq!(
            graph.reference_count(id),
            Some(expected.get(&id).copied().unwrap_or(0))
        );
    }
    (graph, nodes)
}

fn reach(graph: &ExprGraph, id: NodeId) -> HashSet<NodeId> {
    reachable(graph, id).unwrap().into_iter().collect()
}

#[test]
fn random_dags_release_exactly_once() {
    let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);

    for _ in 0..32 {
        let size = rng.random_range(1..200);
        let (mut graph, nodes) = random_graph(&mut rng, size);
        assert!(graph.check_invariants().is_empty());

        // Every unreferenced node is a top-level expression owned from outside.
        let tops: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|&id| graph.is_unreferenced(id).unwrap())
            .collect();
        let mut roots: Vec<Root> = tops.into_iter().map(|id| graph.root(id).unwrap()).collect();
        roots.shuffle(&mut rng);

        let mut released = HashSet::new();
        while let Some(root) = roots.pop() {
            let mut expected = reach(&graph, root.id());
            for other in &roots {
                for id in reach(&graph, other.id()) {
                    expected.remove(&id);
                }
            }

            let report = graph.release(root).unwrap();
            let got: HashSet<NodeId> = report.released.iter().copied().collect();
            assert_eq!(got.len(), report.len(), "a node was released twice");
            assert_eq!(got, expected);
            for id in got {
                assert!(released.insert(id), "node {id:?} released by two roots");
            }

            assert!(graph.defects().is_empty());
            assert!(graph.check_invariants().is_empty());
        }

        assert!(graph.is_empty());
        assert_eq!(released.len(), nodes.len());
        let stats = graph.stats();
        assert_eq!(stats.released, stats.constructed);
        assert_eq!(stats.decrements, stats.increments);
    }
}

#[test]
fn releasing_one_parent_decrements_shared_child_once() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);

    for _ in 0..64 {
        let mut graph = ExprGraph::new();
        let child = graph.var_use("shared");
        let extra = graph.int_literal(rng.random_range(0..10));
        let left = graph.call("g", [child, extra]).unwrap();
        let right = graph.arithmetic(ArithmeticOp::Add, [extra, child]).unwrap();

        let (first, second) = if rng.random_bool(0.5) {
            (left, right)
        } else {
            (right, left)
        };
        let r1 = graph.root(first).unwrap();
        let r2 = graph.root(second).unwrap();

        let report = graph.release(r1).unwrap();
        assert_eq!(report.released, vec![first]);
        assert_eq!(graph.reference_count(child), Some(1));
        assert_eq!(graph.reference_count(extra), Some(1));

        let report = graph.release(r2).unwrap();
        assert_eq!(report.len(), 3);
        assert!(graph.is_empty());
        assert!(graph.defects().is_empty());
    }
}
