use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Limits and switches for a single `run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Deepest statement/expression nesting the parser accepts.
    pub max_nesting_depth: usize,
    /// Deepest chain of active procedure calls.
    pub max_call_depth: usize,
    /// Consecutive runtime errors tolerated before execution stops.
    /// `None` never stops.
    pub fault_ceiling: Option<usize>,
    /// Statements executed before the run is cut off.
    pub max_steps: Option<u64>,
    /// Raised by the host to abandon a run between two statements.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: crate::parser::DEFAULT_MAX_DEPTH,
            max_call_depth: 64,
            fault_ceiling: Some(100),
            max_steps: Some(1_000_000),
            cancel: None,
        }
    }
}
