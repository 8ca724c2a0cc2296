//! Node shapes of the expression language.
//!
//! Every node stored in an [`ExprGraph`](crate::graph::ExprGraph) is one [`ExprNode`]. Leaves
//! carry scalar data only; composites carry the ids of their children. A child id may appear in
//! several composites (or several times in the same one), which is what makes the graph a DAG
//! rather than a tree.
//!
//! [`ExprView`] is the borrowed, read-only shape handed to traversals and printers: it names the
//! children of each variant explicitly and never exposes the storage.
use smallvec::SmallVec;
use strum::{AsRefStr, Display, EnumDiscriminants, EnumIs, EnumIter, EnumString, IntoStaticStr};

use crate::graph::NodeId;

/// Inline capacity for operand and argument lists before spilling to the heap.
pub const INLINE_OPERANDS: usize = 4;

/// Ordered child list of a variadic node.
pub type Operands = SmallVec<[NodeId; INLINE_OPERANDS]>;

/// Comparison operators. Parses from and displays as the source symbol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, AsRefStr, IntoStaticStr,
)]
pub enum ComparisonOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

/// Arithmetic operators. Parses from and displays as the source symbol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, AsRefStr, IntoStaticStr,
)]
pub enum ArithmeticOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
}

/// Stored form of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, EnumIs, EnumDiscriminants)]
#[strum_discriminants(derive(Hash, EnumIter, Display))]
#[strum_discriminants(name(ExprType))]
#[strum_discriminants(vis(pub))]
pub enum ExprNode {
    IntLiteral(i64),
    /// `operands` is `[left, right]`.
    Comparison {
        op: ComparisonOp,
        operands: [NodeId; 2],
    },
    Arithmetic {
        op: ArithmeticOp,
        operands: Operands,
    },
    VarUse(String),
    Call {
        name: String,
        args: Operands,
    },
}

impl ExprNode {
    /// Kind of this node.
    #[inline]
    pub fn kind(&self) -> ExprType {
        ExprType::from(self)
    }

    /// Outgoing edges in source order. A child referenced twice appears twice.
    #[inline]
    pub fn children(&self) -> &[NodeId] {
        match self {
            ExprNode::IntLiteral(_) | ExprNode::VarUse(_) => &[],
            ExprNode::Comparison { operands, .. } => operands.as_slice(),
            ExprNode::Arithmetic { operands, .. } => operands.as_slice(),
            ExprNode::Call { args, .. } => args.as_slice(),
        }
    }

    /// `true` for variants that can never hold children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, ExprNode::IntLiteral(_) | ExprNode::VarUse(_))
    }

    #[inline]
    pub fn literal(&self) -> Option<i64> {
        match self {
            ExprNode::IntLiteral(value) => Some(*value),
            _ => None,
        }
    }

    /// Variable name of a `VarUse`, or callee name of a `Call`.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        match self {
            ExprNode::VarUse(name) | ExprNode::Call { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Operator symbol of a comparison or arithmetic node.
    pub fn operator(&self) -> Option<&'static str> {
        let symbol: &'static str = match self {
            ExprNode::Comparison { op, .. } => op.into(),
            ExprNode::Arithmetic { op, .. } => op.into(),
            _ => return None,
        };
        Some(symbol)
    }

    /// Borrow this node as an [`ExprView`].
    pub fn view(&self) -> ExprView<'_> {
        match self {
            ExprNode::IntLiteral(value) => ExprView::IntLiteral(*value),
            ExprNode::Comparison {
                op,
                operands: [left, right],
            } => ExprView::Comparison {
                op: *op,
                left: *left,
                right: *right,
            },
            ExprNode::Arithmetic { op, operands } => ExprView::Arithmetic {
                op: *op,
                operands,
            },
            ExprNode::VarUse(name) => ExprView::VarUse(name),
            ExprNode::Call { name, args } => ExprView::Call { name, args },
        }
    }
}

/// Describes the outer constructor of a node and borrows its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum ExprView<'a> {
    IntLiteral(i64),
    Comparison {
        op: ComparisonOp,
        left: NodeId,
        right: NodeId,
    },
    Arithmetic {
        op: ArithmeticOp,
        operands: &'a [NodeId],
    },
    VarUse(&'a str),
    Call {
        name: &'a str,
        args: &'a [NodeId],
    },
}

impl<'a> ExprView<'a> {
    #[inline]
    pub fn type_(&self) -> ExprType {
        match self {
            ExprView::IntLiteral(_) => ExprType::IntLiteral,
            ExprView::Comparison { .. } => ExprType::Comparison,
            ExprView::Arithmetic { .. } => ExprType::Arithmetic,
            ExprView::VarUse(_) => ExprType::VarUse,
            ExprView::Call { .. } => ExprType::Call,
        }
    }

    /// Visit every child in source order together with its position.
    pub fn for_each_child<F: FnMut(NodeId, usize)>(&self, mut f: F) {
        match *self {
            ExprView::IntLiteral(_) | ExprView::VarUse(_) => {}
            ExprView::Comparison { left, right, .. } => {
                f(left, 0);
                f(right, 1);
            }
            ExprView::Arithmetic { operands: list, .. } | ExprView::Call { args: list, .. } => {
                for (i, child) in list.iter().enumerate() {
                    f(*child, i);
                }
            }
        }
    }
}
