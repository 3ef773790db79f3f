//! Events exchanged between runners through the summary store.

use crate::features::solver::edge::{Edge, Vertex, Vulnerability};
use crate::shared::MethodId;

/// Cross-runner event.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// A start-to-exit summary edge became known for a method.
    NewSummaryEdge { method: MethodId, edge: Edge },

    /// A finding was reported.
    NewVulnerability(Vulnerability),

    /// A path edge destined for the runner owning its method's unit.
    EdgeForOtherRunner { edge: Edge },

    /// A caller requests analysis of a callee owned by another unit.
    CrossUnitCall {
        caller: Vertex,
        callee_start: Vertex,
    },
}
