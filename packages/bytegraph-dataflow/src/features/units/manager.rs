/*
 * Unit Manager
 *
 * Resolves start methods into units, spawns one runner per unit, routes
 * cross-unit events, detects global quiescence, enforces the deadline,
 * and harvests results.
 *
 * Quiescence: a send to any mailbox bumps the shared in-flight counter,
 * acknowledged only after the event is processed; runners advertise
 * worklist emptiness through idle flags and bump a shared activity
 * counter per processed item. The run is quiescent when every runner is
 * idle, nothing is in flight, and the activity counter is unchanged
 * across two consecutive polls. Both the deadline and quiescence may
 * fire around shutdown; cancelling an already-quiescent runner is
 * harmless and results are reported once.
 *
 * Routing: `EdgeForOtherRunner` and `CrossUnitCall` are dispatched to
 * the runner owning the target method's unit; events for units without
 * a runner are dropped with a log entry.
 */

use super::resolver::{Unit, UnitResolver};
use super::runner::{self, RunnerHandle, RunnerSpawn};
use crate::errors::Result;
use crate::features::solver::{
    Analyzer, Edge, Reason, SolverState, SolverStats, Vertex, Vulnerability,
};
use crate::features::summary::{event_channel, AnalysisEvent, EventSink, SummaryStore};
use crate::features::supergraph::ApplicationGraph;
use crate::shared::MethodId;
use futures::future::join_all;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Tunables for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub resolver: UnitResolver,

    /// Hard deadline; on expiry runners are cancelled and the partial
    /// result is surfaced.
    pub deadline: Duration,

    /// Per-topic replay-buffer cap.
    pub replay_capacity: usize,

    /// Per-runner path-edge cap; exceeding it downgrades the result to
    /// partial.
    pub max_path_edges: Option<usize>,

    /// Cadence of the operator-facing progress log.
    pub progress_interval: Duration,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            resolver: UnitResolver::default(),
            deadline: Duration::from_secs(100),
            replay_capacity: crate::features::summary::DEFAULT_REPLAY_CAPACITY,
            max_path_edges: None,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Quiescence reached.
    Complete,

    /// Deadline hit; findings so far are surfaced.
    Partial,

    /// A runner failed on an internal invariant.
    Aborted,
}

/// Residual state merged across all runners.
#[derive(Debug, Default)]
pub struct AggregateState {
    pub path_edges: FxHashSet<Edge>,
    pub reasons: FxHashMap<Edge, Vec<Reason>>,
    pub summary_edges: FxHashMap<MethodId, FxHashMap<Vertex, FxHashSet<Vertex>>>,
    pub stats: SolverStats,
    pub runner_count: usize,
}

impl AggregateState {
    fn absorb(&mut self, state: SolverState) {
        self.path_edges.extend(state.path_edges);
        for (edge, reasons) in state.reasons {
            let merged = self.reasons.entry(edge).or_default();
            for reason in reasons {
                if !merged.contains(&reason) {
                    merged.push(reason);
                }
            }
        }
        for (method, per_start) in state.summary_edges {
            let target = self.summary_edges.entry(method).or_default();
            for (start, exits) in per_start {
                target.entry(start).or_default().extend(exits);
            }
        }
        self.stats.merge(&state.stats);
        self.runner_count += 1;
    }
}

/// Everything the run produced.
#[derive(Debug)]
pub struct AnalysisResult {
    pub outcome: Outcome,

    /// Findings in the stable order (method id, sink statement id, fact
    /// hash).
    pub vulnerabilities: Vec<Vulnerability>,

    pub state: AggregateState,
    pub elapsed: Duration,
    pub replay_overflow: bool,
    pub abort_diagnostic: Option<String>,
}

/// Coordinates runners over a shared summary store.
pub struct UnitManager {
    graph: Arc<dyn ApplicationGraph>,
    options: AnalysisOptions,
}

impl UnitManager {
    pub fn new(graph: Arc<dyn ApplicationGraph>, options: AnalysisOptions) -> Self {
        Self { graph, options }
    }

    /// Run a unidirectional analysis over the given start methods.
    pub async fn run(
        &self,
        analyzer: Arc<dyn Analyzer>,
        start_methods: Vec<MethodId>,
    ) -> Result<AnalysisResult> {
        self.run_inner(analyzer, None, start_methods).await
    }

    /// Run a bidirectional analysis: per unit, a forward runner over the
    /// natural graph and a backward runner over the reversed graph,
    /// exchanging summary edges as `EdgeForOtherRunner` events. The pair
    /// quiesces when both inner runners quiesce.
    pub async fn run_bidirectional(
        &self,
        forward: Arc<dyn Analyzer>,
        backward: Arc<dyn Analyzer>,
        backward_graph: Arc<dyn ApplicationGraph>,
        start_methods: Vec<MethodId>,
    ) -> Result<AnalysisResult> {
        self.run_inner(forward, Some((backward, backward_graph)), start_methods)
            .await
    }

    async fn run_inner(
        &self,
        analyzer: Arc<dyn Analyzer>,
        backward: Option<(Arc<dyn Analyzer>, Arc<dyn ApplicationGraph>)>,
        start_methods: Vec<MethodId>,
    ) -> Result<AnalysisResult> {
        let started = Instant::now();
        let store = Arc::new(SummaryStore::new(self.options.replay_capacity));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let activity = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (router_sink, mut router_mailbox) = event_channel(in_flight.clone());
        let capped = Arc::new(AtomicBool::new(false));

        // Group start methods per unit, deterministically.
        let mut units: BTreeMap<Unit, Vec<MethodId>> = BTreeMap::new();
        let mut sorted_starts = start_methods;
        sorted_starts.sort();
        sorted_starts.dedup();
        for method in sorted_starts {
            let unit = self.options.resolver.resolve(self.graph.as_ref(), method);
            units.entry(unit).or_default().push(method);
        }

        let mut handles: Vec<RunnerHandle> = Vec::new();
        let mut registry: FxHashMap<Unit, EventSink> = FxHashMap::default();
        for (unit, methods) in units {
            let (sink, mailbox) = event_channel(in_flight.clone());
            registry.insert(unit.clone(), sink.clone());

            match &backward {
                None => {
                    handles.push(runner::spawn(RunnerSpawn {
                        graph: self.graph.clone(),
                        analyzer: analyzer.clone(),
                        unit,
                        resolver: self.options.resolver,
                        start_methods: methods,
                        store: store.clone(),
                        router: router_sink.clone(),
                        shutdown: shutdown_rx.clone(),
                        activity: activity.clone(),
                        sink,
                        mailbox,
                        sibling: None,
                        max_path_edges: self.options.max_path_edges,
                        capped: capped.clone(),
                    })?);
                }
                Some((backward_analyzer, backward_graph)) => {
                    // Forward/backward pair over the same unit, sibling
                    // sinks crossed.
                    let (back_sink, back_mailbox) = event_channel(in_flight.clone());
                    let forward_sink = sink.clone();
                    handles.push(runner::spawn(RunnerSpawn {
                        graph: self.graph.clone(),
                        analyzer: analyzer.clone(),
                        unit: unit.clone(),
                        resolver: self.options.resolver,
                        start_methods: methods.clone(),
                        store: store.clone(),
                        router: router_sink.clone(),
                        shutdown: shutdown_rx.clone(),
                        activity: activity.clone(),
                        sink,
                        mailbox,
                        sibling: Some(back_sink.clone()),
                        max_path_edges: self.options.max_path_edges,
                        capped: capped.clone(),
                    })?);
                    handles.push(runner::spawn(RunnerSpawn {
                        graph: backward_graph.clone(),
                        analyzer: backward_analyzer.clone(),
                        unit,
                        resolver: self.options.resolver,
                        start_methods: methods,
                        store: store.clone(),
                        router: router_sink.clone(),
                        shutdown: shutdown_rx.clone(),
                        activity: activity.clone(),
                        sink: back_sink,
                        mailbox: back_mailbox,
                        sibling: Some(forward_sink),
                        max_path_edges: self.options.max_path_edges,
                        capped: capped.clone(),
                    })?);
                }
            }
        }
        info!(runners = handles.len(), "analysis started");

        let progress = self.spawn_progress_task(&handles, in_flight.clone(), shutdown_rx.clone());

        // Route events, poll for quiescence, enforce the deadline.
        let deadline = tokio::time::sleep(self.options.deadline);
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(Duration::from_millis(10));
        let mut last_activity: Option<u64> = None;

        let mut outcome = loop {
            tokio::select! {
                Some(event) = router_mailbox.recv() => {
                    self.route(&registry, event);
                    router_mailbox.ack();
                }
                _ = poll.tick() => {
                    let all_idle = handles.iter().all(|h| h.idle.load(Ordering::SeqCst));
                    let current = activity.load(Ordering::SeqCst);
                    if all_idle && in_flight.load(Ordering::SeqCst) == 0 {
                        if last_activity == Some(current) {
                            break Outcome::Complete;
                        }
                        last_activity = Some(current);
                    } else {
                        last_activity = None;
                    }
                }
                _ = &mut deadline => {
                    warn!(deadline = ?self.options.deadline, "analysis deadline reached, cancelling runners");
                    break Outcome::Partial;
                }
            }
        };

        // Rendezvous: signal shutdown, await graceful exits.
        let _ = shutdown_tx.send(true);
        let mut state = AggregateState::default();
        let mut abort_diagnostic = None;
        for joined in join_all(handles.into_iter().map(|h| h.join)).await {
            match joined {
                Ok(Ok(solver_state)) => state.absorb(solver_state),
                Ok(Err(e)) => {
                    warn!(error = %e, "runner aborted");
                    outcome = Outcome::Aborted;
                    abort_diagnostic.get_or_insert_with(|| e.to_string());
                }
                Err(e) => {
                    warn!(error = %e, "runner task failed");
                    outcome = Outcome::Aborted;
                    abort_diagnostic.get_or_insert_with(|| e.to_string());
                }
            }
        }
        let _ = progress.await;
        if outcome == Outcome::Complete && capped.load(Ordering::SeqCst) {
            outcome = Outcome::Partial;
        }

        let mut vulnerabilities = store.vulnerabilities();
        vulnerabilities.sort_by_key(|v| v.sort_key());

        info!(
            outcome = ?outcome,
            findings = vulnerabilities.len(),
            path_edges = state.stats.path_edges,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );
        Ok(AnalysisResult {
            outcome,
            vulnerabilities,
            state,
            elapsed: started.elapsed(),
            replay_overflow: store.overflowed(),
            abort_diagnostic,
        })
    }

    /// Dispatch one routed event to the runner owning its target unit.
    fn route(&self, registry: &FxHashMap<Unit, EventSink>, event: AnalysisEvent) {
        let target_method = match &event {
            AnalysisEvent::CrossUnitCall { callee_start, .. } => {
                self.graph.method_of(callee_start.stmt)
            }
            AnalysisEvent::EdgeForOtherRunner { edge } => self.graph.method_of(edge.to.stmt),
            _ => {
                warn!("unroutable event kind, dropping");
                return;
            }
        };
        let unit = self.options.resolver.resolve(self.graph.as_ref(), target_method);
        match registry.get(&unit) {
            Some(sink) => {
                sink.send(event);
            }
            None => {
                warn!(%unit, %target_method, "no runner for unit, dropping event");
            }
        }
    }

    fn spawn_progress_task(
        &self,
        handles: &[RunnerHandle],
        in_flight: Arc<AtomicUsize>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let depths: Vec<(Unit, Arc<AtomicUsize>)> = handles
            .iter()
            .map(|h| (h.unit.clone(), h.worklist_depth.clone()))
            .collect();
        let interval = self.options.progress_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        let total: usize = depths.iter().map(|(_, d)| d.load(Ordering::Relaxed)).sum();
                        info!(
                            pending_edges = total,
                            in_flight = in_flight.load(Ordering::SeqCst),
                            "analysis progress"
                        );
                    }
                }
            }
        })
    }
}
