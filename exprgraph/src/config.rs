//! Graph configuration: where lifecycle traces go and how counting defects are handled.
use crate::{error::GraphResult, trace::TraceSink};

/// Environment variable naming the allocation trace file (`-` for standard error).
pub const ALLOC_TRACE_ENV: &str = "EXPRGRAPH_ALLOC_TRACE";

/// Environment variable selecting [`DefectPolicy::Panic`] when set to `1` or `true`.
pub const STRICT_REFCOUNT_ENV: &str = "EXPRGRAPH_STRICT_REFCOUNT";

/// What the graph does after reporting a reference-count defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectPolicy {
    /// Report the defect, leave the counter at zero and return an error to the caller.
    Report,
    /// Report the defect, then panic.
    Panic,
}

impl Default for DefectPolicy {
    fn default() -> Self {
        if cfg!(feature = "strict-refcount") {
            DefectPolicy::Panic
        } else {
            DefectPolicy::Report
        }
    }
}

#[derive(Debug, Default)]
pub struct GraphConfig {
    pub trace: TraceSink,
    pub defect_policy: DefectPolicy,
}

impl GraphConfig {
    pub fn with_trace(mut self, trace: TraceSink) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_defect_policy(mut self, policy: DefectPolicy) -> Self {
        self.defect_policy = policy;
        self
    }

    /// Build a configuration from [`ALLOC_TRACE_ENV`] and [`STRICT_REFCOUNT_ENV`].
    ///
    /// Unset variables keep the defaults (discarding sink, compile-time default policy).
    pub fn from_env() -> GraphResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable lookup.
    pub fn from_lookup<F>(lookup: F) -> GraphResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = GraphConfig::default();

        match lookup(ALLOC_TRACE_ENV).as_deref() {
            None | Some("") => {}
            Some("-") => config.trace = TraceSink::stderr(),
            Some(path) => config.trace = TraceSink::file(path)?,
        }

        if let Some(value) = lookup(STRICT_REFCOUNT_ENV) {
            if matches!(value.trim(), "1" | "true" | "TRUE" | "True") {
                config.defect_policy = DefectPolicy::Panic;
            }
        }

        Ok(config)
    }
}
