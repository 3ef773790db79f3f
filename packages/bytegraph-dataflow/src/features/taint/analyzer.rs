/*
 * Taint Analyzer
 *
 * The analysis plugin instantiating the solver for mark-carrying access
 * paths. Sinks are detected per newly added edge: a call whose matched
 * sink position is covered by the edge's fact (either direction of the
 * prefix relation, so whole-object taint reaches field sinks and field
 * taint reaches object sinks) reports a vulnerability with the matched
 * rule's CWE and matcher as provenance.
 */

use super::config::{Position, TaintConfig};
use super::flows::TaintFlowSpace;
use crate::features::facts::{Fact, Mark};
use crate::features::solver::analyzer::{Analyzer, SummaryFact};
use crate::features::solver::edge::{Edge, Vulnerability};
use crate::features::solver::space::FlowFunctionSpace;
use crate::features::supergraph::{ApplicationGraph, InstructionKind};
use std::sync::Arc;

/// Forward taint analysis.
pub struct TaintAnalyzer {
    graph: Arc<dyn ApplicationGraph>,
    config: Arc<TaintConfig>,
    space: Arc<TaintFlowSpace>,
    id: String,
}

impl TaintAnalyzer {
    pub fn new(graph: Arc<dyn ApplicationGraph>, config: Arc<TaintConfig>) -> Self {
        let space = Arc::new(TaintFlowSpace::new(graph.clone(), config.clone()));
        Self {
            graph,
            config,
            space,
            id: "taint".to_string(),
        }
    }

    pub fn with_max_depth(
        graph: Arc<dyn ApplicationGraph>,
        config: Arc<TaintConfig>,
        max_depth: usize,
    ) -> Self {
        let space = Arc::new(TaintFlowSpace::with_max_depth(
            graph.clone(),
            config.clone(),
            max_depth,
        ));
        Self {
            graph,
            config,
            space,
            id: "taint".to_string(),
        }
    }

    /// Access paths truncated to the depth bound so far.
    pub fn truncation_count(&self) -> usize {
        self.space.truncation_count()
    }
}

impl Analyzer for TaintAnalyzer {
    fn id(&self) -> &str {
        &self.id
    }

    fn flow_space(&self) -> Arc<dyn FlowFunctionSpace> {
        self.space.clone()
    }

    fn summary_facts(&self, edge: &Edge) -> Vec<SummaryFact> {
        let stmt = edge.to.stmt;
        let InstructionKind::Call(call) = self.graph.instruction(stmt) else {
            return Vec::new();
        };
        let Fact::Tainted { path, marks } = &edge.to.fact else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for rule in self.config.sinks_for(&call.signature) {
            let Some(position) = Position::parse(&rule.position_matcher) else {
                continue;
            };
            let Some(sink_path) = position.resolve(&call) else {
                continue;
            };
            let mark = Mark::new(rule.mark.clone());
            if !marks.contains(&mark) {
                continue;
            }
            if path.starts_with(&sink_path) || sink_path.starts_with(path) {
                out.push(SummaryFact::Vulnerability(Vulnerability {
                    method: self.graph.method_of(stmt),
                    sink: edge.to.clone(),
                    rule: self.id.clone(),
                    cwe: rule.cwe.clone(),
                    config_rule: Some(rule.method_matcher.clone()),
                }));
            }
        }
        out
    }
}

/// Backward taint analysis over the reversed graph. Summary publication
/// and cross-unit propagation stay off: the bidirectional runner feeds
/// its summaries straight to the forward sibling.
pub struct BackwardTaintAnalyzer {
    space: Arc<TaintFlowSpace>,
    id: String,
}

impl BackwardTaintAnalyzer {
    pub fn new(reversed_graph: Arc<dyn ApplicationGraph>, config: Arc<TaintConfig>) -> Self {
        let space = Arc::new(TaintFlowSpace::new(reversed_graph, config));
        Self {
            space,
            id: "taint-backward".to_string(),
        }
    }
}

impl Analyzer for BackwardTaintAnalyzer {
    fn id(&self) -> &str {
        &self.id
    }

    fn flow_space(&self) -> Arc<dyn FlowFunctionSpace> {
        self.space.clone()
    }

    fn save_summary_and_cross_unit(&self) -> bool {
        false
    }
}
