/*
 * Analyzer Contract
 *
 * An analysis plugin supplies the flow-function space and inspects
 * newly propagated edges for findings. Backward analyzers set
 * `save_summary_and_cross_unit` to false: their summary edges are not
 * published to the store and they never initiate cross-unit calls
 * (the bidirectional runner exchanges their summaries directly).
 */

use super::edge::{Edge, Vulnerability};
use super::space::{FlowFunctionSpace, IdentityFlowSpace};
use super::SolverState;
use std::sync::Arc;

/// Fact derived from a freshly added edge or from the settled edge set.
#[derive(Debug, Clone)]
pub enum SummaryFact {
    /// A finding at a sink vertex.
    Vulnerability(Vulnerability),

    /// An extra summary edge the analysis wants published.
    SummaryEdge(Edge),
}

/// Analysis plugin driven by the solver.
pub trait Analyzer: Send + Sync {
    /// Identifier used in reports and finding provenance.
    fn id(&self) -> &str;

    /// The four flow-function families plus the start oracle.
    fn flow_space(&self) -> Arc<dyn FlowFunctionSpace>;

    /// When false, automatic summary-edge publication and cross-unit
    /// propagation are suppressed.
    fn save_summary_and_cross_unit(&self) -> bool {
        true
    }

    /// Called once per newly added edge.
    fn summary_facts(&self, edge: &Edge) -> Vec<SummaryFact> {
        let _ = edge;
        Vec::new()
    }

    /// Called once per runner after quiescence, with the runner's full
    /// residual state, for post-hoc detections.
    fn summary_facts_post(&self, state: &SolverState) -> Vec<SummaryFact> {
        let _ = state;
        Vec::new()
    }
}

/// Analyzer whose flow functions are identity everywhere and which
/// reports nothing. Exercises pure reachability.
pub struct TautologyAnalyzer {
    space: Arc<dyn FlowFunctionSpace>,
}

impl TautologyAnalyzer {
    pub fn new() -> Self {
        Self {
            space: Arc::new(IdentityFlowSpace),
        }
    }
}

impl Default for TautologyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for TautologyAnalyzer {
    fn id(&self) -> &str {
        "tautology"
    }

    fn flow_space(&self) -> Arc<dyn FlowFunctionSpace> {
        self.space.clone()
    }
}
