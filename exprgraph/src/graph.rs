//! Arena-backed expression graph with per-node reference counting.
//!
//! Role
//! - Own every node of one or more expressions in a single slot map addressed by [`NodeId`].
//! - Keep, for every node, the number of parent edges pointing into it. Composite constructors
//!   add one edge per child occurrence; reclaiming a composite removes them again.
//! - Reclaim nodes explicitly: [`ExprGraph::release`] drops an external [`Root`] and runs the
//!   cascading release, which frees every node whose last reference disappeared and leaves shared
//!   nodes alone.
//!
//! Ownership
//! - Nodes are shared between parents by count, never exclusively owned by one parent.
//! - A node additionally carries at most one external root reference, taken with
//!   [`ExprGraph::root`]. [`Root`] is neither `Clone` nor `Copy` and is consumed by
//!   [`ExprGraph::release`], so a root cannot be released twice.
//! - Reading the graph (views, walkers, printers) never changes a counter.
//!
//! Example: two parents sharing one operand
//! ```
//! use exprgraph::prelude::*;
//!
//! let mut graph = ExprGraph::new();
//! let v = graph.var_use("v");
//! let zero = graph.int_literal(0);
//! let c1 = graph.comparison(ComparisonOp::Lt, v, zero).unwrap();
//! let c2 = graph.arithmetic(ArithmeticOp::Add, [v]).unwrap();
//! assert_eq!(graph.reference_count(v), Some(2));
//!
//! let r1 = graph.root(c1).unwrap();
//! let r2 = graph.root(c2).unwrap();
//!
//! let report = graph.release(r1).unwrap();
//! assert!(report.contains(zero) && !report.contains(v));
//! assert_eq!(graph.reference_count(v), Some(1));
//!
//! let report = graph.release(r2).unwrap();
//! assert!(report.contains(v));
//! assert!(graph.is_empty());
//! ```
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, error};
use slotmap::{Key, SlotMap, new_key_type};
use smallvec::{SmallVec, smallvec};

use crate::{
    config::{DefectPolicy, GraphConfig},
    error::{GraphError, GraphResult},
    node::{ArithmeticOp, ComparisonOp, ExprNode, ExprType, ExprView, Operands},
    refcount::{RefCount, Underflow},
    trace::{TraceEvent, TraceLevel, graph_trace},
};

new_key_type! {
    struct SlotKey;
}

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one [`ExprGraph`]. Never shared by two graphs of the same process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId(u64);

impl GraphId {
    fn fresh() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a node stored in an [`ExprGraph`].
///
/// The handle is branded with the graph that created it: stale handles and handles coming from
/// another graph are both rejected as [`GraphError::UnknownNode`]. The default handle names no
/// node in any graph.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    graph: GraphId,
    key: SlotKey,
}

impl NodeId {
    /// Graph that created this node.
    #[inline]
    pub fn graph(&self) -> GraphId {
        self.graph
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({}:{:?})", self.graph.0, self.key.data())
    }
}

#[derive(Debug)]
struct NodeSlot {
    node: ExprNode,
    refs: RefCount,
    rooted: bool,
}

/// Running totals of lifecycle operations performed on a graph.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub constructed: usize,
    pub released: usize,
    pub increments: usize,
    pub decrements: usize,
}

/// The external reference on a node. Consumed by [`ExprGraph::release`].
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "a root that is dropped without being released keeps its subgraph alive"]
pub struct Root(NodeId);

impl Root {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.0
    }
}

/// Nodes reclaimed by one call to [`ExprGraph::release`], in reclamation order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: Vec<NodeId>,
}

impl ReleaseReport {
    #[inline]
    pub fn len(&self) -> usize {
        self.released.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.released.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.released.contains(&id)
    }
}

/// Expression DAG with explicit, reference-counted reclamation.
#[derive(Debug)]
pub struct ExprGraph {
    id: GraphId,
    nodes: SlotMap<SlotKey, NodeSlot>,
    config: GraphConfig,
    defects: Vec<GraphError>,
    stats: GraphStats,
}

impl ExprGraph {
    /// Empty graph with a discarding trace sink and the default defect policy.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            id: GraphId::fresh(),
            nodes: SlotMap::with_key(),
            config,
            defects: Vec::new(),
            stats: GraphStats::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Empty graph configured from the process environment (see [`GraphConfig::from_env`]).
    pub fn from_env() -> GraphResult<Self> {
        Ok(Self::with_config(GraphConfig::from_env()?))
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn int_literal(&mut self, value: i64) -> NodeId {
        self.insert(ExprNode::IntLiteral(value))
    }

    pub fn var_use(&mut self, name: impl Into<String>) -> NodeId {
        self.insert(ExprNode::VarUse(name.into()))
    }

    /// Build `(op left right)`. Each of `left` and `right` gains one reference; passing the same
    /// node twice gives it two.
    pub fn comparison(
        &mut self,
        op: ComparisonOp,
        left: NodeId,
        right: NodeId,
    ) -> GraphResult<NodeId> {
        self.ensure_live(&[left, right])?;
        let id = self.insert(ExprNode::Comparison {
            op,
            operands: [left, right],
        });
        self.reference_children(id)?;
        Ok(id)
    }

    /// Build `(op operands...)`, keeping operand order.
    pub fn arithmetic<I>(&mut self, op: ArithmeticOp, operands: I) -> GraphResult<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let operands: Operands = operands.into_iter().collect();
        self.ensure_live(&operands)?;
        let id = self.insert(ExprNode::Arithmetic { op, operands });
        self.reference_children(id)?;
        Ok(id)
    }

    /// Build `(name args...)`, keeping argument order.
    pub fn call<I>(&mut self, name: impl Into<String>, args: I) -> GraphResult<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let args: Operands = args.into_iter().collect();
        self.ensure_live(&args)?;
        let id = self.insert(ExprNode::Call {
            name: name.into(),
            args,
        });
        self.reference_children(id)?;
        Ok(id)
    }

    fn insert(&mut self, node: ExprNode) -> NodeId {
        let kind = node.kind();
        let key = self.nodes.insert(NodeSlot {
            node,
            refs: RefCount::ZERO,
            rooted: false,
        });
        let id = self.node_id(key);
        self.stats.constructed += 1;
        graph_trace!(
            self.config.trace,
            TraceLevel::Debug,
            TraceEvent::Constructed { node: id, kind },
            "constructed {kind} node {id:?}"
        );
        id
    }

    fn ensure_live(&self, ids: &[NodeId]) -> GraphResult<()> {
        match ids.iter().find(|id| !self.contains(**id)) {
            Some(missing) => Err(GraphError::UnknownNode(*missing)),
            None => Ok(()),
        }
    }

    /// Add one reference per outgoing edge of `parent`. Children must have passed `ensure_live`.
    fn reference_children(&mut self, parent: NodeId) -> GraphResult<()> {
        let children: Operands = self
            .slot(parent)
            .ok_or(GraphError::UnknownNode(parent))?
            .node
            .children()
            .iter()
            .copied()
            .collect();
        for child in children {
            self.increase_reference(child)?;
        }
        Ok(())
    }

    #[inline]
    fn node_id(&self, key: SlotKey) -> NodeId {
        NodeId { graph: self.id, key }
    }

    #[inline]
    fn slot(&self, id: NodeId) -> Option<&NodeSlot> {
        if id.graph != self.id {
            return None;
        }
        self.nodes.get(id.key)
    }

    #[inline]
    fn slot_mut(&mut self, id: NodeId) -> Option<&mut NodeSlot> {
        if id.graph != self.id {
            return None;
        }
        self.nodes.get_mut(id.key)
    }

    // ------------------------------------------------------------------
    // Reference counting
    // ------------------------------------------------------------------

    /// Record one more parent edge into `id` and return the new count.
    ///
    /// Constructors already do this for every child edge; call it directly only when an edge is
    /// created outside of them.
    pub fn increase_reference(&mut self, id: NodeId) -> GraphResult<u32> {
        let slot = self.slot_mut(id).ok_or(GraphError::UnknownNode(id))?;
        let count = slot.refs.increment();
        self.stats.increments += 1;
        graph_trace!(
            self.config.trace,
            TraceLevel::Trace,
            TraceEvent::Referenced { node: id, count },
            "reference to node {id:?} added, count is now {count}"
        );
        Ok(count)
    }

    /// Remove one parent edge into `id` and return the new count.
    ///
    /// A decrement on a zero count is a [`GraphError::BookkeepingDefect`]: it is reported, the
    /// counter stays at zero, and the configured [`DefectPolicy`] decides whether to return the
    /// error or panic.
    pub fn decrease_reference(&mut self, id: NodeId) -> GraphResult<u32> {
        let slot = self.slot_mut(id).ok_or(GraphError::UnknownNode(id))?;
        match slot.refs.decrement() {
            Ok(count) => {
                self.stats.decrements += 1;
                graph_trace!(
                    self.config.trace,
                    TraceLevel::Trace,
                    TraceEvent::Dereferenced { node: id, count },
                    "reference to node {id:?} dropped, count is now {count}"
                );
                Ok(count)
            }
            Err(Underflow) => {
                let count = slot.refs.get();
                self.report_defect(id, GraphError::BookkeepingDefect { node: id, count });
                Err(GraphError::BookkeepingDefect { node: id, count })
            }
        }
    }

    /// `true` when no parent edge points into `id`. The external root is not counted.
    pub fn is_unreferenced(&self, id: NodeId) -> GraphResult<bool> {
        self.slot(id)
            .map(|slot| slot.refs.is_zero())
            .ok_or(GraphError::UnknownNode(id))
    }

    pub fn reference_count(&self, id: NodeId) -> Option<u32> {
        self.slot(id).map(|slot| slot.refs.get())
    }

    pub fn is_rooted(&self, id: NodeId) -> Option<bool> {
        self.slot(id).map(|slot| slot.rooted)
    }

    fn report_defect(&mut self, node: NodeId, defect: GraphError) {
        error!("{defect}");
        graph_trace!(
            self.config.trace,
            TraceLevel::Error,
            TraceEvent::Defect { node },
            "{defect}"
        );
        if self.config.defect_policy == DefectPolicy::Panic {
            panic!("{defect}");
        }
        self.defects.push(defect);
    }

    // ------------------------------------------------------------------
    // Ownership and release
    // ------------------------------------------------------------------

    /// Take the external reference on `id`.
    pub fn root(&mut self, id: NodeId) -> GraphResult<Root> {
        let slot = self.slot_mut(id).ok_or(GraphError::UnknownNode(id))?;
        if slot.rooted {
            return Err(GraphError::AlreadyRooted(id));
        }
        slot.rooted = true;
        graph_trace!(
            self.config.trace,
            TraceLevel::Debug,
            TraceEvent::Rooted { node: id },
            "node {id:?} rooted"
        );
        Ok(Root(id))
    }

    /// Drop the external reference held by `root` and reclaim everything that became
    /// unreferenced.
    ///
    /// A root taken from another graph is rejected with [`GraphError::UnknownNode`] and leaves
    /// this graph untouched.
    ///
    /// If parents inside the graph still reference the root node, it stays live and is reclaimed
    /// later by the release of its last parent. Shared descendants are decremented once per edge
    /// and survive as long as another parent holds them.
    pub fn release(&mut self, root: Root) -> GraphResult<ReleaseReport> {
        let id = root.0;
        let slot = match self.slot_mut(id) {
            Some(slot) if slot.rooted => slot,
            _ => return Err(GraphError::UnknownNode(id)),
        };
        slot.rooted = false;

        let mut report = ReleaseReport::default();
        if !slot.refs.is_zero() {
            let count = slot.refs.get();
            graph_trace!(
                self.config.trace,
                TraceLevel::Debug,
                TraceEvent::Unrooted { node: id, count },
                "node {id:?} unrooted, still referenced by {count} parent edge(s)"
            );
            return Ok(report);
        }

        self.cascade(id, &mut report);
        debug!(
            "released root {:?}: {} node(s) reclaimed, {} live",
            id,
            report.len(),
            self.nodes.len()
        );
        Ok(report)
    }

    /// Reclaim `start` and, transitively, every child whose last reference was the one just
    /// dropped. Iterative so that deep operand chains cannot exhaust the call stack.
    fn cascade(&mut self, start: NodeId, report: &mut ReleaseReport) {
        let mut pending: SmallVec<[NodeId; 16]> = smallvec![start];

        while let Some(id) = pending.pop() {
            // Only ids of this graph are ever pushed.
            let Some(slot) = self.nodes.remove(id.key) else {
                continue;
            };
            let kind = slot.node.kind();
            self.stats.released += 1;
            report.released.push(id);
            graph_trace!(
                self.config.trace,
                TraceLevel::Debug,
                TraceEvent::Released { node: id, kind },
                "released {kind} node {id:?}"
            );

            for &child in slot.node.children() {
                match self.decrease_reference(child) {
                    Ok(0) => {
                        if self.slot(child).is_some_and(|c| !c.rooted) {
                            pending.push(child);
                        }
                    }
                    Ok(_) => {}
                    Err(GraphError::UnknownNode(_)) => {
                        self.report_defect(child, GraphError::DanglingEdge { parent: id, child });
                    }
                    // Already reported by `decrease_reference`.
                    Err(_) => {}
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Read-only access
    // ------------------------------------------------------------------

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&ExprNode> {
        self.slot(id).map(|slot| &slot.node)
    }

    #[inline]
    pub fn view(&self, id: NodeId) -> Option<ExprView<'_>> {
        self.get(id).map(ExprNode::view)
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.get(id).map(ExprNode::children)
    }

    #[inline]
    pub fn node_type(&self, id: NodeId) -> Option<ExprType> {
        self.get(id).map(ExprNode::kind)
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ExprNode)> {
        self.nodes
            .iter()
            .map(move |(key, slot)| (self.node_id(key), &slot.node))
    }

    /// Ids of the nodes currently held by an external [`Root`].
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, slot)| slot.rooted)
            .map(move |(key, _)| self.node_id(key))
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Defects reported so far under [`DefectPolicy::Report`].
    pub fn defects(&self) -> &[GraphError] {
        &self.defects
    }

    pub fn take_defects(&mut self) -> Vec<GraphError> {
        std::mem::take(&mut self.defects)
    }

    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Recompute every node's in-degree from the live edges and compare it to the stored count.
    ///
    /// Returns one [`GraphError::DanglingEdge`] per edge into a reclaimed node and one
    /// [`GraphError::CountMismatch`] per node whose counter disagrees. Empty means consistent.
    pub fn check_invariants(&self) -> Vec<GraphError> {
        let mut problems = Vec::new();
        let mut in_degree: HashMap<NodeId, u32> = HashMap::with_capacity(self.nodes.len());

        for (key, slot) in &self.nodes {
            let parent = self.node_id(key);
            for &child in slot.node.children() {
                if self.contains(child) {
                    *in_degree.entry(child).or_insert(0) += 1;
                } else {
                    problems.push(GraphError::DanglingEdge { parent, child });
                }
            }
        }

        for (key, slot) in &self.nodes {
            let node = self.node_id(key);
            let actual = in_degree.get(&node).copied().unwrap_or(0);
            let stored = slot.refs.get();
            if actual != stored {
                problems.push(GraphError::CountMismatch {
                    node,
                    stored,
                    actual,
                });
            }
        }

        problems
    }
}

impl Default for ExprGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporting_graph() -> ExprGraph {
        ExprGraph::with_config(GraphConfig::default().with_defect_policy(DefectPolicy::Report))
    }

    #[test]
    fn leaves_start_unreferenced() {
        let mut graph = ExprGraph::new();
        let one = graph.int_literal(1);
        let x = graph.var_use("x");
        assert_eq!(graph.reference_count(one), Some(0));
        assert_eq!(graph.reference_count(x), Some(0));
        assert!(graph.is_unreferenced(one).unwrap());
        assert_eq!(graph.node_type(x), Some(ExprType::VarUse));
        assert_eq!(graph.stats().increments, 0);
    }

    #[test]
    fn constructors_reject_stale_children_without_counting() {
        let mut graph = ExprGraph::new();
        let one = graph.int_literal(1);
        let gone = graph.int_literal(2);
        let root = graph.root(gone).unwrap();
        graph.release(root).unwrap();

        let err = graph.comparison(ComparisonOp::Lt, one, gone).unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(id) if id == gone));
        assert_eq!(graph.reference_count(one), Some(0));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn decrement_on_zero_is_reported_not_stored() {
        let mut graph = reporting_graph();
        let one = graph.int_literal(1);
        let err = graph.decrease_reference(one).unwrap_err();
        assert!(err.is_bookkeeping_defect());
        assert_eq!(graph.reference_count(one), Some(0));
        assert_eq!(graph.defects().len(), 1);
        assert!(graph.defects()[0].is_bookkeeping_defect());
        assert_eq!(graph.stats().decrements, 0);
    }

    #[test]
    #[should_panic(expected = "would go negative")]
    fn panic_policy_aborts_on_defect() {
        let mut graph =
            ExprGraph::with_config(GraphConfig::default().with_defect_policy(DefectPolicy::Panic));
        let one = graph.int_literal(1);
        let _ = graph.decrease_reference(one);
    }

    #[test]
    fn graphs_get_distinct_ids() {
        let a = ExprGraph::new();
        let b = ExprGraph::default();
        assert_ne!(a.id(), b.id());
        assert_ne!(NodeId::default().graph(), a.id());
    }

    #[test]
    fn root_is_taken_once() {
        let mut graph = ExprGraph::new();
        let one = graph.int_literal(1);
        let root = graph.root(one).unwrap();
        assert!(graph.root(one).unwrap_err().is_already_rooted());
        assert_eq!(graph.roots().collect::<Vec<_>>(), vec![one]);
        let report = graph.release(root).unwrap();
        assert_eq!(report.released, vec![one]);
        assert!(graph.is_empty());
    }

    #[test]
    fn releasing_a_referenced_root_only_unroots_it() {
        let mut graph = ExprGraph::new();
        let x = graph.var_use("x");
        let sum = graph.arithmetic(ArithmeticOp::Add, [x]).unwrap();
        let inner = graph.root(x).unwrap();
        let outer = graph.root(sum).unwrap();

        assert!(graph.release(inner).unwrap().is_empty());
        assert_eq!(graph.is_rooted(x), Some(false));
        assert!(graph.contains(x));

        let report = graph.release(outer).unwrap();
        assert_eq!(report.released, vec![sum, x]);
        assert!(graph.is_empty());
    }

    #[test]
    fn cascade_spares_rooted_children() {
        let mut graph = ExprGraph::new();
        let x = graph.var_use("x");
        let call = graph.call("f", [x]).unwrap();
        let keep = graph.root(x).unwrap();
        let root = graph.root(call).unwrap();

        let report = graph.release(root).unwrap();
        assert_eq!(report.released, vec![call]);
        assert_eq!(graph.reference_count(x), Some(0));
        assert!(graph.check_invariants().is_empty());

        assert_eq!(graph.release(keep).unwrap().released, vec![x]);
    }

    #[test]
    fn manual_decrement_is_caught_by_invariant_check() {
        let mut graph = ExprGraph::new();
        let one = graph.int_literal(1);
        let two = graph.int_literal(2);
        let _lt = graph.comparison(ComparisonOp::Lt, one, two).unwrap();
        assert!(graph.check_invariants().is_empty());

        graph.decrease_reference(one).unwrap();
        let problems = graph.check_invariants();
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            problems[0],
            GraphError::CountMismatch { node, stored: 0, actual: 1 } if node == one
        ));
    }

    #[test]
    fn corrupted_count_is_reported_during_cascade() {
        let mut graph = reporting_graph();
        let one = graph.int_literal(1);
        let two = graph.int_literal(2);
        let lt = graph.comparison(ComparisonOp::Lt, one, two).unwrap();
        graph.decrease_reference(one).unwrap();

        let root = graph.root(lt).unwrap();
        let report = graph.release(root).unwrap();

        // `one` hit zero early and is left behind; the underflow is recorded.
        assert_eq!(report.released, vec![lt, two]);
        assert!(graph.contains(one));
        assert_eq!(graph.defects().len(), 1);
        assert!(graph.defects()[0].is_bookkeeping_defect());
    }
}
