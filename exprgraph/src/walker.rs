//! Read-only walkers over an [`ExprGraph`].
//!
//! Walking never touches a reference count: it is the interface offered to passes such as code
//! generation, which visit the graph between construction and release.
//!
//! - [`walk`]: thread an input of any type through the visitor; every node decides which children
//!   are visited next and with which input.
//! - [`walk_no_input`]: the same without user state.
//! - [`reachable`] and [`postorder`]: distinct nodes below a root, each listed once even when it
//!   is shared by several parents.
//!
//! Traversal strategy
//! - Explicit deque, no recursion. Only children you schedule are visited, which makes pruning
//!   and guided searches straightforward.
//! - A node shared by two parents is visited once per edge that schedules it, as in a tree
//!   unfolding of the DAG. Use [`reachable`] when each node must be seen once.
//!
//! Example: count edges below a root
//! ```
//! use exprgraph::prelude::*;
//!
//! let mut graph = ExprGraph::new();
//! let x = graph.int_literal(5);
//! let sum = graph.arithmetic(ArithmeticOp::Add, [x, x]).unwrap();
//!
//! let mut visits = 0usize;
//! walk_no_input(&graph, sum, |node| {
//!     node.schedule_children(());
//!     visits += 1;
//! })
//! .unwrap();
//! assert_eq!(visits, 3); // the sum, then `x` once per edge
//! assert_eq!(reachable(&graph, sum).unwrap().len(), 2);
//! ```
use std::{
    cell::RefCell,
    collections::{HashSet, VecDeque},
    ops::Deref,
};

use crate::{
    error::{GraphError, GraphResult},
    graph::{ExprGraph, NodeId},
    node::ExprView,
};

/// A visit waiting in the agenda.
struct Visit<I> {
    node: NodeId,
    /// `None` only for the walk's starting node.
    parent: Option<NodeId>,
    input: I,
}

/// Pending visits. The front is visited next.
type Agenda<I> = RefCell<VecDeque<Visit<I>>>;

/// Handle to one child of the node being visited.
pub struct WalkerNodeHandle<'a, I> {
    agenda: &'a Agenda<I>,
    parent: NodeId,
    child: NodeId,
    position: usize,
}

impl<'a, I> WalkerNodeHandle<'a, I> {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.child
    }

    fn visit(&self, input: I) -> Visit<I> {
        Visit {
            node: self.child,
            parent: Some(self.parent),
            input,
        }
    }

    /// Index of this child in its parent's operand list.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Visit this child before anything scheduled earlier (depth-first).
    #[inline]
    pub fn schedule_immediate(&self, input: I) {
        let visit = self.visit(input);
        self.agenda.borrow_mut().push_front(visit);
    }

    /// Visit this child after everything already pending (breadth-first).
    #[inline]
    pub fn schedule_deferred(&self, input: I) {
        let visit = self.visit(input);
        self.agenda.borrow_mut().push_back(visit);
    }

    /// Shorthand for [`schedule_immediate`](Self::schedule_immediate).
    #[inline]
    pub fn schedule_visit(&self, input: I) {
        self.schedule_immediate(input)
    }

    /// Drop every pending visit. Visits scheduled after this call still happen.
    #[inline]
    pub fn break_(&self) {
        self.agenda.borrow_mut().clear();
    }
}

/// Handle to the node being visited. Derefs to its [`ExprView`].
pub struct WalkerHandle<'a, I> {
    agenda: &'a Agenda<I>,
    id: NodeId,
    parent: Option<NodeId>,
    view: ExprView<'a>,
    children: &'a [NodeId],
}

impl<'a, I> WalkerHandle<'a, I> {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent through which this visit was scheduled; `None` for the walk's root.
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn view(&self) -> ExprView<'a> {
        self.view
    }

    /// Revisit this node right after the visits it schedules from now on.
    #[inline]
    pub fn schedule_self_immediate(&self, input: I) {
        self.agenda.borrow_mut().push_front(Visit {
            node: self.id,
            parent: self.parent,
            input,
        });
    }

    pub fn child(&self, position: usize) -> Option<WalkerNodeHandle<'a, I>> {
        self.children.get(position).map(|&child| WalkerNodeHandle {
            agenda: self.agenda,
            parent: self.id,
            child,
            position,
        })
    }

    /// Children in source order.
    pub fn children(&self) -> impl Iterator<Item = WalkerNodeHandle<'a, I>> + '_ {
        (0..self.children.len()).filter_map(move |position| self.child(position))
    }

    /// Schedule every child depth-first so that they are visited in source order.
    pub fn schedule_children(&self, input: I)
    where
        I: Clone,
    {
        for position in (0..self.children.len()).rev() {
            if let Some(child) = self.child(position) {
                child.schedule_immediate(input.clone());
            }
        }
    }
}

impl<'a, I> Deref for WalkerHandle<'a, I> {
    type Target = ExprView<'a>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

/// Walk the graph below `root` in a user-scheduled manner.
///
/// Fails with [`GraphError::UnknownNode`] if `root` is not live and with
/// [`GraphError::DanglingEdge`] if a scheduled child has been reclaimed.
pub fn walk<F, I>(graph: &ExprGraph, root: NodeId, input: I, mut walker: F) -> GraphResult<()>
where
    F: FnMut(I, WalkerHandle<'_, I>),
{
    if !graph.contains(root) {
        return Err(GraphError::UnknownNode(root));
    }

    let agenda: Agenda<I> = RefCell::new(VecDeque::new());
    agenda.borrow_mut().push_front(Visit {
        node: root,
        parent: None,
        input,
    });

    loop {
        // The borrow must end before the visitor schedules through the same cell.
        let next = agenda.borrow_mut().pop_front();
        let Some(Visit {
            node: id,
            parent,
            input,
        }) = next
        else {
            break;
        };

        let Some(node) = graph.get(id) else {
            return Err(match parent {
                Some(parent) => GraphError::DanglingEdge { parent, child: id },
                None => GraphError::UnknownNode(id),
            });
        };

        walker(
            input,
            WalkerHandle {
                agenda: &agenda,
                id,
                parent,
                view: node.view(),
                children: node.children(),
            },
        );
    }

    Ok(())
}

#[inline]
pub fn walk_no_input<F>(graph: &ExprGraph, root: NodeId, mut walker: F) -> GraphResult<()>
where
    F: FnMut(WalkerHandle<'_, ()>),
{
    walk(graph, root, (), |(), node| walker(node))
}

/// Distinct nodes reachable from `root`, in pre-order.
pub fn reachable(graph: &ExprGraph, root: NodeId) -> GraphResult<Vec<NodeId>> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    walk_no_input(graph, root, |node| {
        if seen.insert(node.id()) {
            order.push(node.id());
            node.schedule_children(());
        }
    })?;
    Ok(order)
}

/// Distinct nodes reachable from `root`, children before parents.
///
/// This is the order in which a code generator can emit every shared subexpression once before
/// its first use.
pub fn postorder(graph: &ExprGraph, root: NodeId) -> GraphResult<Vec<NodeId>> {
    #[derive(Debug, Clone, Copy)]
    enum WalkState {
        Enter,
        Exit,
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    walk(graph, root, WalkState::Enter, |state, node| match state {
        WalkState::Enter => {
            if seen.insert(node.id()) {
                node.schedule_self_immediate(WalkState::Exit);
                node.schedule_children(WalkState::Enter);
            }
        }
        WalkState::Exit => order.push(node.id()),
    })?;
    Ok(order)
}

/// Compare two expressions for structural equality, possibly across graphs.
///
/// Node identity is ignored: two distinct `IntLiteral(1)` nodes are equal. A missing node is
/// never equal to anything.
pub fn compare_expressions(
    graph_a: &ExprGraph,
    a: NodeId,
    graph_b: &ExprGraph,
    b: NodeId,
) -> bool {
    let mut pending = vec![(a, b)];

    while let Some((a, b)) = pending.pop() {
        let (Some(view_a), Some(view_b)) = (graph_a.view(a), graph_b.view(b)) else {
            return false;
        };

        match (view_a, view_b) {
            (ExprView::IntLiteral(x), ExprView::IntLiteral(y)) if x == y => {}
            (ExprView::VarUse(x), ExprView::VarUse(y)) if x == y => {}
            (
                ExprView::Comparison {
                    op: op_a,
                    left: left_a,
                    right: right_a,
                },
                ExprView::Comparison {
                    op: op_b,
                    left: left_b,
                    right: right_b,
                },
            ) if op_a == op_b => {
                pending.push((right_a, right_b));
                pending.push((left_a, left_b));
            }
            (
                ExprView::Arithmetic {
                    op: op_a,
                    operands: list_a,
                },
                ExprView::Arithmetic {
                    op: op_b,
                    operands: list_b,
                },
            ) if op_a == op_b && list_a.len() == list_b.len() => {
                pending.extend(list_a.iter().copied().zip(list_b.iter().copied()));
            }
            (
                ExprView::Call {
                    name: name_a,
                    args: list_a,
                },
                ExprView::Call {
                    name: name_b,
                    args: list_b,
                },
            ) if name_a == name_b && list_a.len() == list_b.len() => {
                pending.extend(list_a.iter().copied().zip(list_b.iter().copied()));
            }
            _ => return false,
        }
    }

    true
}
