/*
 * Unit Runner
 *
 * One cooperative task per unit driving an `IfdsSolver`. The loop
 * alternates between draining the solver worklist (yielding after every
 * edge so the pool stays fair) and awaiting mailbox events; worklist
 * emptiness is advertised through an idle flag the manager polls for
 * global quiescence.
 *
 * Cancellation is cooperative: the shutdown watch is observed between
 * edges and at every await. Events still queued at shutdown stay
 * unprocessed; whatever reached the summary store is final.
 */

use crate::errors::Result;
use crate::features::solver::{Analyzer, IfdsSolver, SolverEffect, SolverState};
use crate::features::summary::{AnalysisEvent, EventMailbox, EventSink, SummaryStore};
use crate::features::supergraph::ApplicationGraph;
use crate::features::units::resolver::{Unit, UnitResolver};
use crate::shared::MethodId;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a runner needs at spawn time.
pub struct RunnerSpawn {
    pub graph: Arc<dyn ApplicationGraph>,
    pub analyzer: Arc<dyn Analyzer>,
    pub unit: Unit,
    pub resolver: UnitResolver,
    pub start_methods: Vec<MethodId>,
    pub store: Arc<SummaryStore>,
    pub router: EventSink,
    pub shutdown: watch::Receiver<bool>,
    pub activity: Arc<AtomicU64>,
    pub sink: EventSink,
    pub mailbox: EventMailbox,
    pub sibling: Option<EventSink>,

    /// Per-runner path-edge cap; when hit, pending work is discarded and
    /// the shared flag downgrades the run.
    pub max_path_edges: Option<usize>,
    pub capped: Arc<AtomicBool>,
}

/// Manager-side view of a spawned runner.
pub struct RunnerHandle {
    pub unit: Unit,
    pub sink: EventSink,
    pub idle: Arc<AtomicBool>,
    pub worklist_depth: Arc<AtomicUsize>,
    pub join: JoinHandle<Result<SolverState>>,
}

struct UnitRunner {
    solver: IfdsSolver,
    mailbox: EventMailbox,
    self_sink: EventSink,
    store: Arc<SummaryStore>,
    router: EventSink,
    shutdown: watch::Receiver<bool>,
    idle: Arc<AtomicBool>,
    worklist_depth: Arc<AtomicUsize>,
    activity: Arc<AtomicU64>,
    sibling: Option<EventSink>,
    publish_summaries: bool,
    max_path_edges: Option<usize>,
    capped: Arc<AtomicBool>,
}

/// Seed and spawn a runner task for one unit.
pub fn spawn(params: RunnerSpawn) -> Result<RunnerHandle> {
    let RunnerSpawn {
        graph,
        analyzer,
        unit,
        resolver,
        start_methods,
        store,
        router,
        shutdown,
        activity,
        sink,
        mailbox,
        sibling,
        max_path_edges,
        capped,
    } = params;

    let publish_summaries = analyzer.save_summary_and_cross_unit();
    let mut solver = IfdsSolver::new(graph, analyzer, unit.clone(), resolver);
    solver.seed(&start_methods)?;

    let idle = Arc::new(AtomicBool::new(false));
    let worklist_depth = Arc::new(AtomicUsize::new(solver.worklist_len()));

    let runner = UnitRunner {
        solver,
        mailbox,
        self_sink: sink.clone(),
        store,
        router,
        shutdown,
        idle: idle.clone(),
        worklist_depth: worklist_depth.clone(),
        activity,
        sibling,
        publish_summaries,
        max_path_edges,
        capped,
    };

    info!(%unit, starts = start_methods.len(), "runner spawned");
    let join = tokio::spawn(runner.run());

    Ok(RunnerHandle {
        unit,
        sink,
        idle,
        worklist_depth,
        join,
    })
}

impl UnitRunner {
    async fn run(mut self) -> Result<SolverState> {
        self.flush_effects();

        'outer: loop {
            // Drain the worklist, one edge per cooperative step.
            while let Some(edge) = self.solver.next_edge() {
                if *self.shutdown.borrow() {
                    break 'outer;
                }
                if let Some(cap) = self.max_path_edges {
                    if self.solver.path_edge_count() >= cap {
                        if !self.capped.swap(true, Ordering::SeqCst) {
                            warn!(cap, unit = %self.solver.unit(),
                                "path-edge cap reached, discarding pending work");
                        }
                        self.solver.clear_worklist();
                        break;
                    }
                }
                self.solver.process(edge)?;
                self.activity.fetch_add(1, Ordering::SeqCst);
                self.flush_effects();
                self.worklist_depth
                    .store(self.solver.worklist_len(), Ordering::Relaxed);

                // Fold in any events that arrived meanwhile.
                while let Some(event) = self.mailbox.try_recv() {
                    let applied = self.apply_event(event);
                    self.mailbox.ack();
                    applied?;
                    self.flush_effects();
                }
                tokio::task::yield_now().await;
            }

            self.worklist_depth.store(0, Ordering::Relaxed);
            self.idle.store(true, Ordering::SeqCst);

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break 'outer;
                    }
                }
                event = self.mailbox.recv() => {
                    match event {
                        Some(event) => {
                            self.idle.store(false, Ordering::SeqCst);
                            let applied = self.apply_event(event);
                            self.mailbox.ack();
                            applied?;
                            self.activity.fetch_add(1, Ordering::SeqCst);
                            self.flush_effects();
                        }
                        None => break 'outer,
                    }
                }
            }
        }

        // Post-quiescence detections over the settled edge set.
        self.solver.finish_post_facts();
        self.flush_effects();
        self.idle.store(true, Ordering::SeqCst);
        debug!(unit = %self.solver.unit(), "runner stopped");
        Ok(self.solver.into_state())
    }

    /// Inject one mailbox event into the solver.
    fn apply_event(&mut self, event: AnalysisEvent) -> Result<()> {
        match event {
            AnalysisEvent::NewSummaryEdge { edge, .. }
            | AnalysisEvent::EdgeForOtherRunner { edge } => self.solver.inject_external(edge),
            AnalysisEvent::CrossUnitCall { callee_start, .. } => {
                self.solver.inject_cross_unit_start(callee_start)
            }
            // Findings are already in the store.
            AnalysisEvent::NewVulnerability(_) => Ok(()),
        }
    }

    /// Perform the solver's pending cross-task work.
    fn flush_effects(&mut self) {
        for effect in self.solver.drain_effects() {
            match effect {
                SolverEffect::Subscribe(method) => {
                    self.store.subscribe(method, self.self_sink.clone());
                }
                SolverEffect::PublishSummary { method, edge } => {
                    if let Some(sibling) = &self.sibling {
                        sibling.send(AnalysisEvent::EdgeForOtherRunner { edge: edge.clone() });
                    }
                    if self.publish_summaries {
                        self.store
                            .publish(method, AnalysisEvent::NewSummaryEdge { method, edge });
                    }
                }
                SolverEffect::PublishVulnerability(vulnerability) => {
                    let method = vulnerability.method;
                    if self.store.add_vulnerability(vulnerability.clone()) {
                        self.store
                            .publish(method, AnalysisEvent::NewVulnerability(vulnerability));
                    }
                }
                SolverEffect::CrossUnitCall {
                    caller,
                    callee_start,
                } => {
                    self.router.send(AnalysisEvent::CrossUnitCall {
                        caller,
                        callee_start,
                    });
                }
            }
        }
    }
}
