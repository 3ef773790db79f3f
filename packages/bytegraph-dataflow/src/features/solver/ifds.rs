/*
 * IFDS Tabulation Solver
 *
 * Worklist-based path-edge propagation with summary-edge caching,
 * following the tabulation algorithm of Reps, Horwitz, Sagiv (1995)
 * extended for dynamically discovered supergraphs per Naeem, Lhoták,
 * Rodriguez (2010): callees are entered as they are resolved, and
 * summaries discovered later resume the callers recorded so far.
 *
 * Algorithm:
 * 1. Seed (s, f) -> (s, f) for every entry statement s and start fact f
 *    of the runner's start methods.
 * 2. Pop edge (u, v) from the FIFO worklist, v = (stmt, fact):
 *    - call statement: apply call-to-return to every return site, enter
 *      callees (or publish a cross-unit request), and apply already
 *      cached summaries,
 *    - exit statement: record the summary edge, resume every recorded
 *      caller, then fall through to sequent transfer (exit statements
 *      can have exceptional successors),
 *    - otherwise: sequent transfer to each successor.
 * 3. Repeat until the worklist drains.
 *
 * The solver is single-threaded and side-effect free: cross-task work
 * (subscriptions, publications, cross-unit requests) is emitted as
 * `SolverEffect`s for the owning runner to perform.
 *
 * References:
 * - Reps, Horwitz, Sagiv (1995): "Precise Interprocedural Dataflow
 *   Analysis via Graph Reachability"
 * - Naeem, Lhoták, Rodriguez (2010): "Practical Extensions to the IFDS
 *   Algorithm"
 */

use super::analyzer::{Analyzer, SummaryFact};
use super::edge::{Edge, Reason, SolverStats, Vertex, Vulnerability};
use super::space::FlowFunctionSpace;
use crate::errors::{EngineError, Result};
use crate::features::supergraph::ApplicationGraph;
use crate::features::units::resolver::{Unit, UnitResolver};
use crate::shared::{MethodId, StatementId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Cross-task work emitted by the solver, performed by the runner.
#[derive(Debug, Clone)]
pub enum SolverEffect {
    /// Subscribe to the summary store for a method's events.
    Subscribe(MethodId),

    /// Publish a start-to-exit summary edge.
    PublishSummary { method: MethodId, edge: Edge },

    /// Publish a finding.
    PublishVulnerability(Vulnerability),

    /// Request analysis of a callee owned by another unit.
    CrossUnitCall { caller: Vertex, callee_start: Vertex },
}

/// Residual solver state, harvested after quiescence.
#[derive(Debug)]
pub struct SolverState {
    pub unit: Unit,
    pub path_edges: FxHashSet<Edge>,
    pub reasons: FxHashMap<Edge, Vec<Reason>>,
    pub summary_edges: FxHashMap<MethodId, FxHashMap<Vertex, FxHashSet<Vertex>>>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub stats: SolverStats,
}

/// Worklist-based IFDS solver for one unit.
pub struct IfdsSolver {
    graph: Arc<dyn ApplicationGraph>,
    analyzer: Arc<dyn Analyzer>,
    space: Arc<dyn FlowFunctionSpace>,
    unit: Unit,
    resolver: UnitResolver,

    path_edges: FxHashSet<Edge>,
    reasons: FxHashMap<Edge, Vec<Reason>>,
    summary_edges: FxHashMap<MethodId, FxHashMap<Vertex, FxHashSet<Vertex>>>,
    call_sites_of: FxHashMap<Vertex, FxHashSet<Edge>>,
    worklist: VecDeque<Edge>,
    subscribed: FxHashSet<MethodId>,
    cross_unit_calls: FxHashSet<(Vertex, Vertex)>,
    vulnerabilities: Vec<Vulnerability>,
    effects: Vec<SolverEffect>,
    stats: SolverStats,
}

impl IfdsSolver {
    pub fn new(
        graph: Arc<dyn ApplicationGraph>,
        analyzer: Arc<dyn Analyzer>,
        unit: Unit,
        resolver: UnitResolver,
    ) -> Self {
        let space = analyzer.flow_space();
        Self {
            graph,
            analyzer,
            space,
            unit,
            resolver,
            path_edges: FxHashSet::default(),
            reasons: FxHashMap::default(),
            summary_edges: FxHashMap::default(),
            call_sites_of: FxHashMap::default(),
            worklist: VecDeque::new(),
            subscribed: FxHashSet::default(),
            cross_unit_calls: FxHashSet::default(),
            vulnerabilities: Vec::new(),
            effects: Vec::new(),
            stats: SolverStats::default(),
        }
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Seed every entry statement of the given start methods with the
    /// start-fact oracle.
    pub fn seed(&mut self, start_methods: &[MethodId]) -> Result<()> {
        let mut methods: Vec<MethodId> = start_methods.to_vec();
        methods.sort();
        for method in methods {
            for stmt in self.graph.entry_points(method) {
                let facts = self.space.start_facts(method, stmt);
                let mut facts: Vec<_> = facts.into_iter().collect();
                facts.sort_by_key(|f| f.stable_key());
                for fact in facts {
                    let vertex = Vertex::new(stmt, fact);
                    self.propagate(Edge::seed(vertex), Reason::Initial)?;
                }
            }
        }
        Ok(())
    }

    /// Register an edge with a reason; new edges enter the worklist.
    ///
    /// An edge enters the worklist at most once in its lifetime: repeat
    /// propagations only accumulate reasons.
    pub fn propagate(&mut self, edge: Edge, reason: Reason) -> Result<()> {
        let from_method = self.graph.method_of(edge.from.stmt);
        let to_method = self.graph.method_of(edge.to.stmt);
        if from_method != to_method {
            return Err(EngineError::invariant(format!(
                "cross-method path edge {edge}: {from_method} vs {to_method}"
            )));
        }

        let reasons = self.reasons.entry(edge.clone()).or_default();
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }

        if !self.path_edges.insert(edge.clone()) {
            return Ok(());
        }
        self.stats.path_edges += 1;
        self.worklist.push_back(edge.clone());

        // Summary publication happens as soon as the edge exists; the
        // worklist pass records it and resumes callers. The runner
        // decides where the effect goes (store, bidi sibling, nowhere).
        if self.graph.is_exit(edge.to.stmt)
            && self.graph.is_entry(edge.from.stmt)
            && self.resolver.resolve(self.graph.as_ref(), to_method) == self.unit
        {
            self.effects.push(SolverEffect::PublishSummary {
                method: to_method,
                edge: edge.clone(),
            });
        }

        for fact in self.analyzer.summary_facts(&edge) {
            match fact {
                SummaryFact::Vulnerability(v) => {
                    debug!(sink = %v.sink, rule = %v.rule, "vulnerability");
                    self.vulnerabilities.push(v.clone());
                    self.effects.push(SolverEffect::PublishVulnerability(v));
                }
                SummaryFact::SummaryEdge(e) => {
                    let method = self.graph.method_of(e.to.stmt);
                    self.effects
                        .push(SolverEffect::PublishSummary { method, edge: e });
                }
            }
        }
        Ok(())
    }

    /// Inject a path edge received from the summary store. Only edges
    /// rooted at a method entry are accepted.
    pub fn inject_external(&mut self, edge: Edge) -> Result<()> {
        if !self.graph.is_entry(edge.from.stmt) {
            return Ok(());
        }
        self.stats.external_edges += 1;
        self.propagate(edge, Reason::External)
    }

    /// Seed a callee start vertex requested by another unit.
    pub fn inject_cross_unit_start(&mut self, callee_start: Vertex) -> Result<()> {
        self.propagate(Edge::seed(callee_start), Reason::External)
    }

    pub fn next_edge(&mut self) -> Option<Edge> {
        self.worklist.pop_front()
    }

    pub fn worklist_len(&self) -> usize {
        self.worklist.len()
    }

    pub fn path_edge_count(&self) -> usize {
        self.path_edges.len()
    }

    /// Discard pending work. Already-recorded edges and summaries stay.
    pub fn clear_worklist(&mut self) {
        self.worklist.clear();
    }

    /// Process one dequeued edge (one tabulation step).
    pub fn process(&mut self, edge: Edge) -> Result<()> {
        self.stats.iterations += 1;

        let stmt = edge.to.stmt;
        let method = self.graph.method_of(stmt);
        if self.subscribed.insert(method) {
            self.effects.push(SolverEffect::Subscribe(method));
        }

        let callees = self.graph.callees(stmt);
        if !callees.is_empty() {
            self.process_call(&edge, stmt, &callees)?;
        } else {
            if self.graph.is_exit(stmt) {
                self.process_exit(&edge, stmt, method)?;
            }
            // Sequent transfer also covers exit statements: exceptional
            // flow can continue past them.
            self.process_sequent(&edge, stmt)?;
        }
        Ok(())
    }

    /// Call branch: bypass flow, callee entry, cached summaries.
    fn process_call(&mut self, edge: &Edge, stmt: StatementId, callees: &[MethodId]) -> Result<()> {
        let return_sites = self.graph.successors(stmt);

        for ret in &return_sites {
            let flow = self.space.call_to_return(stmt, *ret);
            for fact in flow.compute(&edge.to.fact) {
                self.propagate(
                    Edge::new(edge.from.clone(), Vertex::new(*ret, fact)),
                    Reason::Sequent { pred: edge.clone() },
                )?;
            }
        }

        for callee in callees {
            let cross_unit = self.resolver.resolve(self.graph.as_ref(), *callee) != self.unit;
            for entry in self.graph.entry_points(*callee) {
                let flow = self.space.call_to_start(stmt, *callee);
                for fact in flow.compute(&edge.to.fact) {
                    let start = Vertex::new(entry, fact);
                    self.call_sites_of
                        .entry(start.clone())
                        .or_default()
                        .insert(edge.clone());

                    if cross_unit {
                        if self.analyzer.save_summary_and_cross_unit() {
                            if self.subscribed.insert(*callee) {
                                self.effects.push(SolverEffect::Subscribe(*callee));
                            }
                            let key = (edge.to.clone(), start.clone());
                            if self.cross_unit_calls.insert(key) {
                                self.effects.push(SolverEffect::CrossUnitCall {
                                    caller: edge.to.clone(),
                                    callee_start: start.clone(),
                                });
                            }
                        }
                    } else {
                        self.propagate(
                            Edge::seed(start.clone()),
                            Reason::CallToStart { pred: edge.clone() },
                        )?;
                    }

                    // Apply summaries already cached for this start vertex.
                    let exits: Vec<Vertex> = self
                        .summary_edges
                        .get(callee)
                        .and_then(|per_start| per_start.get(&start))
                        .map(|set| set.iter().cloned().collect())
                        .unwrap_or_default();
                    for exit in exits {
                        self.stats.summary_reuses += 1;
                        let summary = Edge::new(start.clone(), exit);
                        self.apply_summary(edge, stmt, &return_sites, &summary)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Exit branch: record the summary edge and resume recorded callers.
    fn process_exit(&mut self, edge: &Edge, stmt: StatementId, method: MethodId) -> Result<()> {
        if !self.graph.is_entry(edge.from.stmt) {
            return Ok(());
        }
        let newly_recorded = self
            .summary_edges
            .entry(method)
            .or_default()
            .entry(edge.from.clone())
            .or_default()
            .insert(edge.to.clone());
        if !newly_recorded {
            return Ok(());
        }
        self.stats.summary_edges += 1;

        let callers: Vec<Edge> = self
            .call_sites_of
            .get(&edge.from)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for caller in callers {
            let call_stmt = caller.to.stmt;
            let return_sites = self.graph.successors(call_stmt);
            self.apply_summary(&caller, call_stmt, &return_sites, edge)?;
        }
        Ok(())
    }

    /// Map a summary's exit facts into the caller at every return site.
    fn apply_summary(
        &mut self,
        caller: &Edge,
        call_stmt: StatementId,
        return_sites: &[StatementId],
        summary: &Edge,
    ) -> Result<()> {
        for ret in return_sites {
            let flow = self.space.exit_to_return(call_stmt, *ret, summary.to.stmt);
            for fact in flow.compute(&summary.to.fact) {
                self.propagate(
                    Edge::new(caller.from.clone(), Vertex::new(*ret, fact)),
                    Reason::ThroughSummary {
                        pred: caller.clone(),
                        summary: summary.clone(),
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Intraprocedural step.
    fn process_sequent(&mut self, edge: &Edge, stmt: StatementId) -> Result<()> {
        for next in self.graph.successors(stmt) {
            let flow = self.space.sequent(stmt, next);
            for fact in flow.compute(&edge.to.fact) {
                self.propagate(
                    Edge::new(edge.from.clone(), Vertex::new(next, fact)),
                    Reason::Sequent { pred: edge.clone() },
                )?;
            }
        }
        Ok(())
    }

    /// Drain pending cross-task work.
    pub fn drain_effects(&mut self) -> Vec<SolverEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Run post-quiescence detections and collect their findings.
    pub fn finish_post_facts(&mut self) {
        let snapshot = self.snapshot();
        for fact in self.analyzer.summary_facts_post(&snapshot) {
            match fact {
                SummaryFact::Vulnerability(v) => {
                    self.vulnerabilities.push(v.clone());
                    self.effects.push(SolverEffect::PublishVulnerability(v));
                }
                SummaryFact::SummaryEdge(e) => {
                    let method = self.graph.method_of(e.to.stmt);
                    self.effects
                        .push(SolverEffect::PublishSummary { method, edge: e });
                }
            }
        }
    }

    fn snapshot(&self) -> SolverState {
        SolverState {
            unit: self.unit.clone(),
            path_edges: self.path_edges.clone(),
            reasons: self.reasons.clone(),
            summary_edges: self.summary_edges.clone(),
            vulnerabilities: self.vulnerabilities.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn into_state(self) -> SolverState {
        SolverState {
            unit: self.unit,
            path_edges: self.path_edges,
            reasons: self.reasons,
            summary_edges: self.summary_edges,
            vulnerabilities: self.vulnerabilities,
            stats: self.stats,
        }
    }

    /// Drive the worklist to exhaustion on the current task. Used by
    /// synchronous tests; runners interleave `next_edge`/`process` with
    /// event handling instead.
    pub fn run_to_exhaustion(&mut self) -> Result<()> {
        while let Some(edge) = self.next_edge() {
            self.process(edge)?;
        }
        Ok(())
    }
}
