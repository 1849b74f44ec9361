//! Evaluation metrics.
//!
//! Every [`Evaluation`](super::Evaluation) carries an [`EvalMetrics`] so hosts
//! can observe how expensive a turn was without installing a tracing
//! subscriber.
//!
//! ## Design notes
//!
//! - Counters cover the whole evaluation, srai-nested templates included.
//! - `total` is wall-clock time and includes time spent in collaborators.

use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvalMetrics {
    /// Total elapsed time for the evaluation.
    pub total: Duration,
    /// Template nodes evaluated, at every depth.
    pub nodes_visited: usize,
    /// Srai nodes evaluated, including the ones refused at the depth limit.
    pub srai_calls: usize,
    /// External-call nodes evaluated.
    pub external_calls: usize,
    /// Deepest srai nesting reached (0 = top-level template only).
    pub max_depth: usize,
}

impl EvalMetrics {
    pub(crate) fn enter_depth(&mut self, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
    }
}
