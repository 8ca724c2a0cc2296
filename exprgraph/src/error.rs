use strum::EnumIs;
use thiserror::Error;

use crate::graph::NodeId;

#[derive(Debug, EnumIs, Error)]
pub enum GraphError {
    /// A decrement was requested on a node whose structural count is already zero.
    #[error(
        "Reference count of node {node:?} would go negative (count is {count}). A decrement was not paired with a construction edge."
    )]
    BookkeepingDefect { node: NodeId, count: u32 },

    /// The id does not name a live node of this graph (never created here, or already reclaimed).
    #[error("Node {0:?} is not a live node of this graph.")]
    UnknownNode(NodeId),

    /// The node already has its external root reference taken.
    #[error("Node {0:?} is already held as a root. A node has at most one external owner.")]
    AlreadyRooted(NodeId),

    /// The stored counter disagrees with the number of live edges pointing into the node.
    #[error("Node {node:?} stores a reference count of {stored} but {actual} live edges point to it.")]
    CountMismatch {
        node: NodeId,
        stored: u32,
        actual: u32,
    },

    /// A live node holds an edge to a node that has been reclaimed.
    #[error("Node {parent:?} references node {child:?}, which is no longer live.")]
    DanglingEdge { parent: NodeId, child: NodeId },

    /// The allocation trace file could not be opened.
    #[error("Failed to open allocation trace file '{path}': {source}")]
    TraceSinkIo {
        path: String,
        source: std::io::Error,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;
