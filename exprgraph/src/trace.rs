//! Diagnostics channel for node lifecycle events.
//!
//! The graph reports every construction, counter change, root hand-off and reclamation to a
//! [`TraceSink`] it was given at creation time. The default sink discards everything, and emitting
//! never changes what the graph does: the sink only observes.
//!
//! Example: collect events in memory
//! ```
//! use std::{cell::RefCell, rc::Rc};
//! use exprgraph::prelude::*;
//!
//! let events = Rc::new(RefCell::new(Vec::new()));
//! let sink = {
//!     let events = events.clone();
//!     TraceSink::from_callback(move |msg| events.borrow_mut().push(msg.event))
//! };
//! let mut graph = ExprGraph::with_config(GraphConfig::default().with_trace(sink));
//! let one = graph.int_literal(1);
//! assert!(matches!(events.borrow()[0], TraceEvent::Constructed { node, .. } if node == one));
//! ```
use std::{
    cell::RefCell,
    fs::File,
    io::{LineWriter, Write},
};

use strum::{Display, FromRepr};

use crate::{
    error::{GraphError, GraphResult},
    graph::NodeId,
    node::ExprType,
};

/// Severity of a trace message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr, Display)]
#[repr(u32)]
pub enum TraceLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

/// Structured lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A node was allocated in the graph.
    Constructed { node: NodeId, kind: ExprType },
    /// A parent edge into `node` was created; `count` is the new structural count.
    Referenced { node: NodeId, count: u32 },
    /// A parent edge into `node` was destroyed; `count` is the new structural count.
    Dereferenced { node: NodeId, count: u32 },
    /// The external root reference on `node` was taken.
    Rooted { node: NodeId },
    /// The external root reference on `node` was dropped while parents still hold it.
    Unrooted { node: NodeId, count: u32 },
    /// The node was reclaimed.
    Released { node: NodeId, kind: ExprType },
    /// A reference-count defect was detected on `node`.
    Defect { node: NodeId },
}

impl TraceEvent {
    pub fn node(&self) -> NodeId {
        match *self {
            TraceEvent::Constructed { node, .. }
            | TraceEvent::Referenced { node, .. }
            | TraceEvent::Dereferenced { node, .. }
            | TraceEvent::Rooted { node }
            | TraceEvent::Unrooted { node, .. }
            | TraceEvent::Released { node, .. }
            | TraceEvent::Defect { node } => node,
        }
    }
}

/// One message delivered to a sink.
#[derive(Debug, Clone)]
pub struct TraceMessage {
    pub level: TraceLevel,
    pub event: TraceEvent,
    pub message: String,
    pub module: &'static str,
    pub line: u32,
}

/// Callback invoked for every message that passes the sink's level filter.
pub type TraceCallback = Box<dyn Fn(&TraceMessage)>;

/// Destination of trace messages. Inert unless a callback is installed.
pub struct TraceSink {
    callback: Option<TraceCallback>,
    min_level: TraceLevel,
}

impl TraceSink {
    /// Sink that drops every message.
    pub fn discard() -> Self {
        Self {
            callback: None,
            min_level: TraceLevel::Trace,
        }
    }

    pub fn from_callback<F>(callback: F) -> Self
    where
        F: Fn(&TraceMessage) + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
            min_level: TraceLevel::Trace,
        }
    }

    /// Write one line per message to standard error.
    pub fn stderr() -> Self {
        Self::from_callback(|msg| eprintln!("{}", format_line(msg)))
    }

    /// Write one line per message to the file at `path`, truncating it first.
    pub fn file(path: &str) -> GraphResult<Self> {
        let file = File::create(path).map_err(|source| GraphError::TraceSinkIo {
            path: path.to_string(),
            source,
        })?;
        let out = RefCell::new(LineWriter::new(file));
        Ok(Self::from_callback(move |msg| {
            // Write failures are dropped: tracing must not alter graph behaviour.
            let _ = writeln!(out.borrow_mut(), "{}", format_line(msg));
        }))
    }

    /// Drop messages below `level`.
    pub fn with_min_level(mut self, level: TraceLevel) -> Self {
        self.min_level = level;
        self
    }

    #[inline]
    pub fn is_enabled(&self, level: TraceLevel) -> bool {
        self.callback.is_some() && level >= self.min_level
    }

    pub fn emit(&self, msg: &TraceMessage) {
        if let Some(callback) = &self.callback {
            if msg.level >= self.min_level {
                callback(msg);
            }
        }
    }
}

impl Default for TraceSink {
    fn default() -> Self {
        Self::discard()
    }
}

impl std::fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSink")
            .field("enabled", &self.callback.is_some())
            .field("min_level", &self.min_level)
            .finish()
    }
}

fn format_line(msg: &TraceMessage) -> String {
    format!("[{:<5}] {}", msg.level.to_string(), msg.message)
}

/// Emit a lifecycle event; the message is only formatted when the sink accepts `level`.
macro_rules! graph_trace {
    (
        $sink:expr,
        $level:expr,
        $event:expr,
        $( $arg:tt )*
    ) => {
        {
            let sink: &$crate::trace::TraceSink = &$sink;
            let level = $level;
            if sink.is_enabled(level) {
                sink.emit(&$crate::trace::TraceMessage {
                    level,
                    event: $event,
                    message: format!($($arg)*),
                    module: module_path!(),
                    line: line!(),
                });
            }
        }
    };
}

pub(crate) use graph_trace;
