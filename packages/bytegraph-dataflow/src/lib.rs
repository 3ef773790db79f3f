/*
 * Bytegraph Dataflow - Interprocedural IFDS Engine
 *
 * Worklist-based IFDS/IDE tabulation (Reps-Horwitz-Sagiv, with the
 * Naeem-Lhotak-Rodriguez extension for dynamically discovered
 * supergraphs) over JVM bytecode application graphs, with a taint
 * instantiation on top.
 *
 * Feature-first layout:
 * - shared/       : Method/Statement handles
 * - supergraph/   : application-graph interface + in-memory program
 * - facts/        : access paths, marks, the Zero fact
 * - solver/       : path-edge tabulation with summary caching + reasons
 * - summary/      : per-method topics with replay (the event bus)
 * - units/        : unit partitioning, async runners, the manager
 * - trace/        : witness reconstruction from the reason DAG
 * - taint/        : configuration-driven taint flow functions
 * - report/       : JSON/SARIF emission
 */

pub mod errors;
pub mod features;
pub mod shared;

pub use errors::{EngineError, Result};
pub use features::facts::{AccessPath, AccessRoot, Fact, Mark};
pub use features::report::{build_report, write_report, Report};
pub use features::solver::{
    Analyzer, Edge, IfdsSolver, Reason, SolverState, SolverStats, TautologyAnalyzer, Vertex,
    Vulnerability,
};
pub use features::summary::{AnalysisEvent, SummaryStore};
pub use features::supergraph::{
    ApplicationGraph, CallSite, InstructionKind, Program, ProgramBuilder, ReversedGraph,
};
pub use features::taint::{BackwardTaintAnalyzer, TaintAnalyzer, TaintConfig, TaintRules};
pub use features::trace::{TraceGraph, TraceGraphBuilder};
pub use features::units::{
    AnalysisOptions, AnalysisResult, Outcome, Unit, UnitManager, UnitResolver,
};
pub use shared::{MethodId, StatementId};
