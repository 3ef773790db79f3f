/*
 * Trace-Graph Reconstruction
 *
 * Recovers a witness for a sink vertex by walking the reason DAG
 * backward: sources are the `Initial`/`External` roots, the edge
 * relation captures how facts moved between vertices, and entry points
 * are the method-entry vertices the sink is reachable from.
 *
 * Reasons reference edges by value identity; `ThroughSummary` can
 * re-enter an edge through a different tail vertex, so the traversal is
 * keyed on `(edge, current-tail-vertex)` and stops on revisit. Both
 * passes are iterative: witness chains grow with method length and must
 * not be bounded by the call stack.
 */

use crate::features::solver::edge::{Edge, Reason, Vertex};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

/// A reconstructed witness for one sink.
#[derive(Debug, Clone, Serialize)]
pub struct TraceGraph {
    /// `Initial`/`External` root vertices.
    pub sources: Vec<Vertex>,

    /// Directed fact-movement relation over vertices.
    pub edges: Vec<(Vertex, Vertex)>,

    /// Method-entry vertices from which the sink is reachable.
    pub entry_points: Vec<Vertex>,
}

/// Rebuilds witnesses from the aggregated reason map.
pub struct TraceGraphBuilder<'a> {
    reasons: &'a FxHashMap<Edge, Vec<Reason>>,
    edges_by_to: FxHashMap<&'a Vertex, Vec<&'a Edge>>,
    method_local: bool,
}

impl<'a> TraceGraphBuilder<'a> {
    pub fn new(reasons: &'a FxHashMap<Edge, Vec<Reason>>) -> Self {
        let mut edges_by_to: FxHashMap<&'a Vertex, Vec<&'a Edge>> = FxHashMap::default();
        for edge in reasons.keys() {
            edges_by_to.entry(&edge.to).or_default().push(edge);
        }
        Self {
            reasons,
            edges_by_to,
            method_local: false,
        }
    }

    /// Restrict witnesses to the sink's own method: call-to-start
    /// reasons terminate the walk instead of descending into callers.
    pub fn method_local(mut self, flag: bool) -> Self {
        self.method_local = flag;
        self
    }

    /// Build the trace graph for one sink vertex.
    pub fn build(&self, sink: &Vertex) -> TraceGraph {
        let mut sources: FxHashSet<Vertex> = FxHashSet::default();
        let mut edges: FxHashSet<(Vertex, Vertex)> = FxHashSet::default();
        let mut visited: FxHashSet<(Edge, Vertex)> = FxHashSet::default();
        let mut stack: Vec<(Edge, Vertex)> = Vec::new();

        for edge in self.edges_by_to.get(sink).into_iter().flatten() {
            stack.push(((*edge).clone(), sink.clone()));
        }

        while let Some((edge, last)) = stack.pop() {
            if !visited.insert((edge.clone(), last.clone())) {
                continue;
            }
            for reason in self.reasons.get(&edge).into_iter().flatten() {
                match reason {
                    Reason::Initial | Reason::External => {
                        sources.insert(edge.from.clone());
                    }
                    Reason::Sequent { pred } => {
                        if pred.to.fact == edge.to.fact {
                            stack.push((pred.clone(), last.clone()));
                        } else {
                            edges.insert((pred.to.clone(), last.clone()));
                            stack.push((pred.clone(), pred.to.clone()));
                        }
                    }
                    Reason::CallToStart { pred } => {
                        if self.method_local {
                            sources.insert(edge.from.clone());
                        } else {
                            edges.insert((pred.to.clone(), last.clone()));
                            stack.push((pred.clone(), pred.to.clone()));
                        }
                    }
                    Reason::ThroughSummary { pred, summary } => {
                        edges.insert((summary.to.clone(), last.clone()));
                        edges.insert((pred.to.clone(), summary.from.clone()));
                        stack.push((summary.clone(), summary.to.clone()));
                        stack.push((pred.clone(), pred.to.clone()));
                    }
                }
            }
        }

        let entry_points = self.entry_points(sink);

        let mut sources: Vec<Vertex> = sources.into_iter().collect();
        sources.sort_by_key(|v| (v.stmt, v.fact.stable_key()));
        let mut edges: Vec<(Vertex, Vertex)> = edges.into_iter().collect();
        edges.sort_by_key(|(a, b)| (a.stmt, a.fact.stable_key(), b.stmt, b.fact.stable_key()));
        TraceGraph {
            sources,
            edges,
            entry_points,
        }
    }

    /// Second pass: walk reasons until `Initial`/`External`-terminal
    /// edges; their from vertices are the entry points.
    fn entry_points(&self, sink: &Vertex) -> Vec<Vertex> {
        let mut entry_points: FxHashSet<Vertex> = FxHashSet::default();
        let mut visited: FxHashSet<Edge> = FxHashSet::default();
        let mut stack: Vec<Edge> = self
            .edges_by_to
            .get(sink)
            .into_iter()
            .flatten()
            .map(|e| (*e).clone())
            .collect();

        while let Some(edge) = stack.pop() {
            if !visited.insert(edge.clone()) {
                continue;
            }
            for reason in self.reasons.get(&edge).into_iter().flatten() {
                match reason {
                    Reason::Initial | Reason::External => {
                        entry_points.insert(edge.from.clone());
                    }
                    Reason::Sequent { pred } | Reason::CallToStart { pred } => {
                        stack.push(pred.clone());
                    }
                    Reason::ThroughSummary { pred, summary } => {
                        stack.push(pred.clone());
                        stack.push(summary.clone());
                    }
                }
            }
        }

        let mut entry_points: Vec<Vertex> = entry_points.into_iter().collect();
        entry_points.sort_by_key(|v| (v.stmt, v.fact.stable_key()));
        entry_points
    }
}
