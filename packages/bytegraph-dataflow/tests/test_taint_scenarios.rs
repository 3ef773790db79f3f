//! End-to-end taint scenarios over the in-memory program model, single
//! unit: reachability, source-to-sink, interprocedural pass-through,
//! sanitizers, and recursion.

mod common;

use bytegraph_dataflow::features::taint::config::TaintRules;
use bytegraph_dataflow::{
    AccessPath, AnalysisOptions, ApplicationGraph, CallSite, Fact, InstructionKind, Mark,
    Outcome, Program, ProgramBuilder, Reason, StatementId, TaintAnalyzer, TautologyAnalyzer,
    UnitManager, Vertex,
};
use common::{config_of, sanitizer_rule, sink_rule, source_rule};
use std::sync::Arc;

fn manager(graph: Arc<Program>) -> UnitManager {
    UnitManager::new(graph, AnalysisOptions::default())
}

fn call(signature: &str, args: Vec<AccessPath>, result: Option<AccessPath>) -> InstructionKind {
    InstructionKind::Call(CallSite {
        signature: signature.to_string(),
        receiver: None,
        args,
        result,
    })
}

/// Scenario: identity flow functions over a branching method reach every
/// statement with Zero and report nothing.
#[tokio::test]
async fn test_tautology_covers_reachable_statements() {
    let mut b = ProgramBuilder::new();
    let m = b.method("com.example.Main#m");
    let s0 = b.statement(m, InstructionKind::Nop);
    let s1 = b.statement(m, InstructionKind::Nop);
    let s2 = b.statement(m, InstructionKind::Nop);
    let s3 = b.statement(m, InstructionKind::Return { value: None });
    b.edge(s0, s1);
    b.edge(s0, s2);
    b.edge(s1, s3);
    b.edge(s2, s3);
    let graph = Arc::new(b.finish());

    let result = manager(graph.clone())
        .run(Arc::new(TautologyAnalyzer::new()), vec![m])
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Complete);
    assert!(result.vulnerabilities.is_empty());
    let entry = Vertex::new(s0, Fact::Zero);
    for stmt in [s0, s1, s2, s3] {
        assert!(
            result
                .state
                .path_edges
                .iter()
                .any(|e| e.from == entry && e.to == Vertex::new(stmt, Fact::Zero)),
            "missing zero edge at {stmt}"
        );
    }
}

/// Scenario: x = source(); sink(x) inside one method.
#[tokio::test]
async fn test_single_taint_no_call() {
    let mut b = ProgramBuilder::new();
    let m = b.method("com.example.Main#m");
    let s0 = b.statement(
        m,
        call("com.example.In#source", vec![], Some(AccessPath::local("x"))),
    );
    let s1 = b.statement(m, call("com.example.Out#sink", vec![AccessPath::local("x")], None));
    let s2 = b.statement(m, InstructionKind::Return { value: None });
    b.edge(s0, s1);
    b.edge(s1, s2);
    let graph = Arc::new(b.finish());

    let config = config_of(TaintRules {
        sources: vec![source_rule("com.example.In#source")],
        sinks: vec![sink_rule("com.example.Out#sink")],
        ..TaintRules::default()
    });
    let analyzer = Arc::new(TaintAnalyzer::new(graph.clone(), config));
    let result = manager(graph.clone()).run(analyzer, vec![m]).await.unwrap();

    assert_eq!(result.outcome, Outcome::Complete);
    assert_eq!(result.vulnerabilities.len(), 1);
    let finding = &result.vulnerabilities[0];
    let tainted_x = Fact::tainted(AccessPath::local("x"), Mark::taint());
    assert_eq!(finding.sink, Vertex::new(s1, tainted_x.clone()));
    assert_eq!(finding.cwe.as_deref(), Some("CWE-89"));

    // Witness: (s0, Zero) -> (s1, Tainted(x, T)).
    let report = bytegraph_dataflow::build_report("taint", &result, graph.as_ref());
    let trace = &report.findings[0].trace;
    assert_eq!(trace.sources, vec![Vertex::new(s0, Fact::Zero)]);
    assert!(trace
        .edges
        .contains(&(Vertex::new(s0, Fact::Zero), Vertex::new(s1, tainted_x))));
    assert_eq!(trace.entry_points, vec![Vertex::new(s0, Fact::Zero)]);
}

/// Builds: m() { a = source(); b = id(a); sink(b); }  with
/// id(p) { return p; } resolved in-program.
fn pass_through_program() -> (Arc<Program>, ProgramIds) {
    let mut b = ProgramBuilder::new();
    let m = b.method("com.example.Main#m");
    let id = b.method("com.example.Main#id");

    let s0 = b.statement(
        m,
        call("com.example.In#source", vec![], Some(AccessPath::local("a"))),
    );
    let s1 = b.statement(
        m,
        call(
            "com.example.Main#id",
            vec![AccessPath::local("a")],
            Some(AccessPath::local("b")),
        ),
    );
    let s2 = b.statement(m, call("com.example.Out#sink", vec![AccessPath::local("b")], None));
    let s3 = b.statement(m, InstructionKind::Return { value: None });
    b.edge(s0, s1);
    b.edge(s1, s2);
    b.edge(s2, s3);
    b.call_target(s1, id);

    let t0 = b.statement(
        id,
        InstructionKind::Return {
            value: Some(AccessPath::arg(0)),
        },
    );
    let t1 = b.statement(id, InstructionKind::Nop);
    b.edge(t0, t1);

    (
        Arc::new(b.finish()),
        ProgramIds {
            m,
            id,
            s2,
            t0,
            t1,
        },
    )
}

struct ProgramIds {
    m: bytegraph_dataflow::MethodId,
    id: bytegraph_dataflow::MethodId,
    s2: StatementId,
    t0: StatementId,
    t1: StatementId,
}

/// Scenario: taint survives an identity callee through its summary edge.
#[tokio::test]
async fn test_interprocedural_pass_through() {
    let (graph, ids) = pass_through_program();
    let config = config_of(TaintRules {
        sources: vec![source_rule("com.example.In#source")],
        sinks: vec![sink_rule("com.example.Out#sink")],
        ..TaintRules::default()
    });
    let analyzer = Arc::new(TaintAnalyzer::new(graph.clone(), config));
    let result = manager(graph.clone())
        .run(analyzer, vec![ids.m, ids.id])
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Complete);
    assert_eq!(result.vulnerabilities.len(), 1);
    assert_eq!(result.vulnerabilities[0].sink.stmt, ids.s2);

    // The callee's summary: (entry, Tainted(arg0)) -> (exit, Tainted(return)).
    let tainted_arg = Fact::tainted(AccessPath::arg(0), Mark::taint());
    let tainted_ret = Fact::tainted(AccessPath::ret(), Mark::taint());
    let per_start = &result.state.summary_edges[&ids.id];
    let exits = &per_start[&Vertex::new(ids.t0, tainted_arg)];
    assert!(exits.contains(&Vertex::new(ids.t1, tainted_ret)));

    // The witness goes through a summary.
    assert!(result
        .state
        .reasons
        .values()
        .flatten()
        .any(|r| matches!(r, Reason::ThroughSummary { .. })));

    // Trace soundness: entry points sit at the start method's entries.
    let report = bytegraph_dataflow::build_report("taint", &result, graph.as_ref());
    let starts: Vec<StatementId> = graph
        .entry_points(ids.m)
        .into_iter()
        .chain(graph.entry_points(ids.id))
        .collect();
    for entry in &report.findings[0].trace.entry_points {
        assert!(starts.contains(&entry.stmt));
    }
}

/// Scenario: id(p) { return sanitize(p); } with sanitize configured for
/// the mark kills the flow.
#[tokio::test]
async fn test_sanitizer_blocks_flow() {
    let mut b = ProgramBuilder::new();
    let m = b.method("com.example.Main#m");
    let id = b.method("com.example.Main#id");

    let s0 = b.statement(
        m,
        call("com.example.In#source", vec![], Some(AccessPath::local("a"))),
    );
    let s1 = b.statement(
        m,
        call(
            "com.example.Main#id",
            vec![AccessPath::local("a")],
            Some(AccessPath::local("b")),
        ),
    );
    let s2 = b.statement(m, call("com.example.Out#sink", vec![AccessPath::local("b")], None));
    let s3 = b.statement(m, InstructionKind::Return { value: None });
    b.edge(s0, s1);
    b.edge(s1, s2);
    b.edge(s2, s3);
    b.call_target(s1, id);

    let t0 = b.statement(
        id,
        call(
            "com.example.San#sanitize",
            vec![AccessPath::arg(0)],
            Some(AccessPath::local("r")),
        ),
    );
    let t1 = b.statement(
        id,
        InstructionKind::Return {
            value: Some(AccessPath::local("r")),
        },
    );
    b.edge(t0, t1);
    let graph = Arc::new(b.finish());

    let config = config_of(TaintRules {
        sources: vec![source_rule("com.example.In#source")],
        sinks: vec![sink_rule("com.example.Out#sink")],
        sanitizers: vec![sanitizer_rule("com.example.San#sanitize")],
        ..TaintRules::default()
    });
    let analyzer = Arc::new(TaintAnalyzer::new(graph.clone(), config));
    let result = manager(graph.clone()).run(analyzer, vec![m, id]).await.unwrap();

    assert_eq!(result.outcome, Outcome::Complete);
    assert!(result.vulnerabilities.is_empty());
}

/// Scenario: f(x) { if (*) sink(x); else f(x); } with arg0 tainted at
/// entry terminates with exactly one finding.
#[tokio::test]
async fn test_recursive_call_terminates() {
    let mut b = ProgramBuilder::new();
    let f = b.method("com.example.Rec#f");
    let s0 = b.statement(f, InstructionKind::Nop);
    let s1 = b.statement(f, call("com.example.Out#sink", vec![AccessPath::arg(0)], None));
    let s2 = b.statement(f, call("com.example.Rec#f", vec![AccessPath::arg(0)], None));
    let s3 = b.statement(f, InstructionKind::Return { value: None });
    b.edge(s0, s1);
    b.edge(s0, s2);
    b.edge(s1, s3);
    b.edge(s2, s3);
    b.call_target(s2, f);
    let graph = Arc::new(b.finish());

    let config = config_of(TaintRules {
        sources: vec![common::arg_source_rule("com.example.Rec#f", "arg0")],
        sinks: vec![sink_rule("com.example.Out#sink")],
        ..TaintRules::default()
    });
    let analyzer = Arc::new(TaintAnalyzer::new(graph.clone(), config));
    let result = manager(graph.clone()).run(analyzer, vec![f]).await.unwrap();

    assert_eq!(result.outcome, Outcome::Complete);
    assert_eq!(result.vulnerabilities.len(), 1);
    // One summary per reachable start fact, nothing unbounded.
    let summaries: usize = result.state.summary_edges[&f]
        .values()
        .map(|exits| exits.len())
        .sum();
    assert!(summaries >= 1 && summaries <= 4);
}

/// Boundary: an empty start-method list exits cleanly with no findings.
#[tokio::test]
async fn test_empty_start_methods() {
    let mut b = ProgramBuilder::new();
    let m = b.method("com.example.Main#m");
    b.statement(m, InstructionKind::Return { value: None });
    let graph = Arc::new(b.finish());

    let result = manager(graph.clone())
        .run(Arc::new(TautologyAnalyzer::new()), vec![])
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Complete);
    assert!(result.vulnerabilities.is_empty());
    assert!(result.state.path_edges.is_empty());
}

/// Boundary: an exit statement with (exceptional) successors both
/// records a summary and keeps propagating sequentially.
#[tokio::test]
async fn test_exit_with_successors() {
    let mut b = ProgramBuilder::new();
    let m = b.method("com.example.Main#m");
    let s0 = b.statement(m, InstructionKind::Nop);
    let s1 = b.statement(m, InstructionKind::Nop);
    let s2 = b.statement(m, InstructionKind::Return { value: None });
    b.edge(s0, s1);
    b.edge(s1, s2);
    b.mark_exit(s1); // exceptional exit that still flows on
    let graph = Arc::new(b.finish());

    let result = manager(graph.clone())
        .run(Arc::new(TautologyAnalyzer::new()), vec![m])
        .await
        .unwrap();

    let per_start = &result.state.summary_edges[&m];
    let exits = &per_start[&Vertex::new(s0, Fact::Zero)];
    assert!(exits.contains(&Vertex::new(s1, Fact::Zero)));
    assert!(exits.contains(&Vertex::new(s2, Fact::Zero)));
    // Propagation continued past the exceptional exit.
    assert!(result
        .state
        .path_edges
        .iter()
        .any(|e| e.to == Vertex::new(s2, Fact::Zero)));
}

/// Algebraic law: enlarging the start-fact set never removes findings.
#[tokio::test]
async fn test_monotonicity_of_sources() {
    let build = || {
        let mut b = ProgramBuilder::new();
        let m = b.method("com.example.Main#m");
        let s0 = b.statement(
            m,
            call("com.example.In#source", vec![], Some(AccessPath::local("x"))),
        );
        let s1 = b.statement(
            m,
            call("com.example.In#other", vec![], Some(AccessPath::local("y"))),
        );
        let s2 = b.statement(m, call("com.example.Out#sink", vec![AccessPath::local("x")], None));
        let s3 = b.statement(m, call("com.example.Out#sink", vec![AccessPath::local("y")], None));
        let s4 = b.statement(m, InstructionKind::Return { value: None });
        b.edge(s0, s1);
        b.edge(s1, s2);
        b.edge(s2, s3);
        b.edge(s3, s4);
        (Arc::new(b.finish()), m)
    };

    let (graph, m) = build();
    let narrow = config_of(TaintRules {
        sources: vec![source_rule("com.example.In#source")],
        sinks: vec![sink_rule("com.example.Out#sink")],
        ..TaintRules::default()
    });
    let wide = config_of(TaintRules {
        sources: vec![
            source_rule("com.example.In#source"),
            source_rule("com.example.In#other"),
        ],
        sinks: vec![sink_rule("com.example.Out#sink")],
        ..TaintRules::default()
    });

    let narrow_result = manager(graph.clone())
        .run(Arc::new(TaintAnalyzer::new(graph.clone(), narrow)), vec![m])
        .await
        .unwrap();
    let wide_result = manager(graph.clone())
        .run(Arc::new(TaintAnalyzer::new(graph.clone(), wide)), vec![m])
        .await
        .unwrap();

    for finding in &narrow_result.vulnerabilities {
        assert!(wide_result.vulnerabilities.contains(finding));
    }
    assert!(wide_result.vulnerabilities.len() > narrow_result.vulnerabilities.len());
}

/// Invariants over the settled state: reasons are non-empty, edges stay
/// within one method, summaries connect entry to exit.
#[tokio::test]
async fn test_settled_state_invariants() {
    let (graph, ids) = pass_through_program();
    let config = config_of(TaintRules {
        sources: vec![source_rule("com.example.In#source")],
        sinks: vec![sink_rule("com.example.Out#sink")],
        ..TaintRules::default()
    });
    let analyzer = Arc::new(TaintAnalyzer::new(graph.clone(), config));
    let result = manager(graph.clone())
        .run(analyzer, vec![ids.m, ids.id])
        .await
        .unwrap();

    for edge in &result.state.path_edges {
        let reasons = result.state.reasons.get(edge).expect("edge without reasons");
        assert!(!reasons.is_empty());
        assert_eq!(graph.method_of(edge.from.stmt), graph.method_of(edge.to.stmt));
    }
    for (method, per_start) in &result.state.summary_edges {
        for (start, exits) in per_start {
            assert!(graph.entry_points(*method).contains(&start.stmt));
            for exit in exits {
                assert!(graph.exit_points(*method).contains(&exit.stmt));
            }
        }
    }
}
