//! Exprgraph: in-memory expression graphs with reference-counted reclamation.
//!
//! A parser builds expressions bottom-up (integer literals, variable uses, comparisons,
//! arithmetic and calls) into an [`ExprGraph`](graph::ExprGraph). Subexpressions may be shared:
//! the same node can be an operand of several parents, or appear twice in one operand list. The
//! structure is therefore a DAG, and a node is reclaimed only when the last reference to it goes
//! away.
//!
//! Lifecycle
//!  - Construction: composite constructors bump every child's counter once per edge. Leaves touch
//!    no counter. Children must already exist, so a node can never reference itself.
//!  - Traversal: views, [`walker`] and [`pretty`] are read-only.
//!  - Release: the owner takes a [`Root`](graph::Root) on the expression it keeps and releases it
//!    exactly once; the cascade frees everything that became unreferenced.
//!
//! Diagnostics
//!  - Every lifecycle event can be observed through an injected [`TraceSink`](trace::TraceSink);
//!    the default sink discards everything.
//!  - Counting defects are reported, recorded and, depending on
//!    [`DefectPolicy`](config::DefectPolicy), returned as errors or turned into panics.
//!
//! Example
//! ```
//! use exprgraph::prelude::*;
//!
//! let mut graph = ExprGraph::new();
//! let one = graph.int_literal(1);
//! let two = graph.int_literal(2);
//! let lt = graph.comparison(ComparisonOp::Lt, one, two).unwrap();
//! assert_eq!(graph.pretty(lt).to_string(), "(< 1 2)");
//! assert_eq!(graph.reference_count(one), Some(1));
//!
//! let root = graph.root(lt).unwrap();
//! let report = graph.release(root).unwrap();
//! assert_eq!(report.len(), 3);
//! assert!(graph.is_empty());
//! assert!(graph.defects().is_empty());
//! ```

/// Configuration: trace sink and defect policy, programmatic or from the environment.
pub mod config;
/// Error type shared by every fallible operation.
pub mod error;
/// The arena, reference counting and cascading release.
pub mod graph;
/// Node variants, operators and borrowed views.
pub mod node;
/// S-expression pretty printer.
pub mod pretty;
/// Per-node structural reference counter.
pub mod refcount;
/// Diagnostics channel for lifecycle events.
pub mod trace;
/// Read-only traversals.
pub mod walker;

pub mod prelude {
    //! Convenient re-exports for end users.
    pub use crate::config::{DefectPolicy, GraphConfig};
    pub use crate::error::{GraphError, GraphResult};
    pub use crate::graph::{ExprGraph, GraphId, GraphStats, NodeId, ReleaseReport, Root};
    pub use crate::node::{ArithmeticOp, ComparisonOp, ExprNode, ExprType, ExprView};
    pub use crate::pretty::PrettyNode;
    pub use crate::trace::{TraceEvent, TraceLevel, TraceMessage, TraceSink};
    pub use crate::walker::{
        WalkerHandle, WalkerNodeHandle, compare_expressions, postorder, reachable, walk,
        walk_no_input,
    };
}
