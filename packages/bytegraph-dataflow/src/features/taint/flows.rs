/*
 * Taint Flow Functions
 *
 * The four flow-function families instantiated for mark-carrying access
 * paths. Kill/gen decisions are field-sensitive through access-path
 * prefix checks; call boundaries substitute actuals for formals and
 * back. The domain stays finite per method through the configured
 * selector-depth bound: over-deep paths are truncated and the analysis
 * proceeds (never fails) on them.
 *
 * Statement semantics:
 * - Assign  kills the lhs sub-tree, rebases rhs-reachable facts onto lhs
 * - Const   kills the lhs sub-tree
 * - Return  additionally mirrors facts on the returned value onto the
 *           return pseudo-slot
 * - Call    applies source/sink/pass-through/sanitizer rules; resolved
 *           targets get the same treatment on the bypass edge while the
 *           callee is entered separately
 */

use super::config::{Position, TaintConfig};
use crate::features::facts::{AccessPath, Fact, Mark};
use crate::features::solver::flow_function::FlowFunction;
use crate::features::solver::space::FlowFunctionSpace;
use crate::features::supergraph::{ApplicationGraph, CallSite, InstructionKind};
use crate::shared::{MethodId, StatementId};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Context shared by every taint flow function.
#[derive(Clone)]
struct FlowCtx {
    config: Arc<TaintConfig>,
    max_depth: usize,
    truncations: Arc<AtomicUsize>,
}

impl FlowCtx {
    /// Enforce the access-path depth bound.
    fn bounded(&self, path: AccessPath) -> AccessPath {
        let (cut, truncated) = path.truncated(self.max_depth);
        if truncated {
            self.truncations.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path, depth = self.max_depth, "access path truncated to depth bound");
        }
        cut
    }

    /// Marks of `fact` minus those a sanitizer covers at positions whose
    /// path is a prefix of the fact's path.
    fn surviving_marks(&self, call: &CallSite, path: &AccessPath, marks: &BTreeSet<Mark>) -> BTreeSet<Mark> {
        let mut surviving = marks.clone();
        for rule in self.config.sanitizers_for(&call.signature) {
            let Some(pos) = Position::parse(&rule.position_matcher) else {
                continue;
            };
            if pos == Position::Return {
                continue;
            }
            if let Some(p) = pos.resolve(call) {
                if path.starts_with(&p) {
                    surviving.remove(&Mark::new(rule.mark.clone()));
                }
            }
        }
        surviving
    }

    /// Effect of a call on caller-side facts: the bypass transfer shared
    /// by `call_to_return` (resolved calls) and `sequent` (unresolved
    /// calls).
    fn call_transfer(&self, call: &CallSite, fact: &Fact) -> HashSet<Fact> {
        let Fact::Tainted { path, marks } = fact else {
            // Sources generate from the tautology.
            let mut out = HashSet::from([Fact::Zero]);
            for rule in self.config.sources_for(&call.signature) {
                let Some(pos) = Position::parse(&rule.position_matcher) else {
                    continue;
                };
                if let Some(p) = pos.resolve(call) {
                    out.insert(Fact::tainted(self.bounded(p), Mark::new(rule.mark.clone())));
                }
            }
            return out;
        };

        let mut out = HashSet::new();
        let surviving = self.surviving_marks(call, path, marks);
        let overwritten = call.result.as_ref().is_some_and(|r| path.starts_with(r));
        if !overwritten && !surviving.is_empty() {
            out.insert(Fact::with_marks(path.clone(), surviving.clone()));
        }

        for rule in self.config.pass_through_for(&call.signature) {
            let mark = Mark::new(rule.mark.clone());
            if !surviving.contains(&mark) {
                continue;
            }
            let (Some(from), Some(to)) = (Position::parse(&rule.from), Position::parse(&rule.to))
            else {
                continue;
            };
            let (Some(from_path), Some(to_path)) = (from.resolve(call), to.resolve(call)) else {
                continue;
            };
            if let Some(rebased) = path.rebase(&from_path, &to_path) {
                if !self.config.sanitizes(&call.signature, to, &mark) {
                    out.insert(Fact::tainted(self.bounded(rebased), mark));
                }
            }
        }
        out
    }
}

/// Transfer across one non-call CFG edge.
struct SequentTaint {
    instruction: InstructionKind,
    ctx: FlowCtx,
}

impl FlowFunction for SequentTaint {
    fn compute(&self, input: &Fact) -> HashSet<Fact> {
        match &self.instruction {
            InstructionKind::Assign { lhs, rhs } => {
                let Fact::Tainted { path, .. } = input else {
                    return HashSet::from([Fact::Zero]);
                };
                let mut out = HashSet::new();
                if !path.starts_with(lhs) {
                    out.insert(input.clone());
                }
                if let Some(rebased) = path.rebase(rhs, lhs) {
                    out.insert(input.at_path(self.ctx.bounded(rebased)));
                }
                out
            }
            InstructionKind::Const { lhs } => {
                let Fact::Tainted { path, .. } = input else {
                    return HashSet::from([Fact::Zero]);
                };
                if path.starts_with(lhs) {
                    HashSet::new()
                } else {
                    HashSet::from([input.clone()])
                }
            }
            InstructionKind::Return { value } => {
                let Fact::Tainted { path, .. } = input else {
                    return HashSet::from([Fact::Zero]);
                };
                let mut out = HashSet::from([input.clone()]);
                if let Some(v) = value {
                    if let Some(rebased) = path.rebase(v, &AccessPath::ret()) {
                        out.insert(input.at_path(self.ctx.bounded(rebased)));
                    }
                }
                out
            }
            // A call reaching the sequent family had no resolved targets;
            // its effect on the caller is the bypass transfer.
            InstructionKind::Call(call) => self.ctx.call_transfer(call, input),
            InstructionKind::Nop => HashSet::from([input.clone()]),
        }
    }
}

/// Actuals substituted into formals on method entry.
struct CallToStartTaint {
    call: Option<CallSite>,
    ctx: FlowCtx,
}

impl FlowFunction for CallToStartTaint {
    fn compute(&self, input: &Fact) -> HashSet<Fact> {
        let Fact::Tainted { path, .. } = input else {
            return HashSet::from([Fact::Zero]);
        };
        let Some(call) = &self.call else {
            return HashSet::new();
        };
        let mut out = HashSet::new();
        if path.is_static() {
            out.insert(input.clone());
        }
        for (i, actual) in call.args.iter().enumerate() {
            if let Some(rebased) = path.rebase(actual, &AccessPath::arg(i as u16)) {
                out.insert(input.at_path(self.ctx.bounded(rebased)));
            }
        }
        if let Some(receiver) = &call.receiver {
            if let Some(rebased) = path.rebase(receiver, &AccessPath::this()) {
                out.insert(input.at_path(self.ctx.bounded(rebased)));
            }
        }
        out
    }
}

/// Facts that bypass a resolved callee.
struct CallToReturnTaint {
    call: Option<CallSite>,
    ctx: FlowCtx,
}

impl FlowFunction for CallToReturnTaint {
    fn compute(&self, input: &Fact) -> HashSet<Fact> {
        match &self.call {
            Some(call) => self.ctx.call_transfer(call, input),
            None => {
                if input.is_zero() {
                    HashSet::from([Fact::Zero])
                } else {
                    HashSet::from([input.clone()])
                }
            }
        }
    }
}

/// Callee exit facts translated back into the caller.
struct ExitToReturnTaint {
    call: Option<CallSite>,
    exit_instruction: InstructionKind,
    ctx: FlowCtx,
}

impl ExitToReturnTaint {
    /// Map a fact onto the caller's result location, honoring return
    /// sanitizers mark by mark.
    fn to_result(&self, call: &CallSite, input: &Fact, rebased: AccessPath) -> Option<Fact> {
        let marks = input.marks()?;
        let surviving: BTreeSet<Mark> = marks
            .iter()
            .filter(|m| !self.ctx.config.sanitizes(&call.signature, Position::Return, m))
            .cloned()
            .collect();
        if surviving.is_empty() {
            return None;
        }
        Some(Fact::with_marks(self.ctx.bounded(rebased), surviving))
    }
}

impl FlowFunction for ExitToReturnTaint {
    fn compute(&self, input: &Fact) -> HashSet<Fact> {
        let Fact::Tainted { path, .. } = input else {
            return HashSet::from([Fact::Zero]);
        };
        let Some(call) = &self.call else {
            return HashSet::new();
        };
        let mut out = HashSet::new();

        match &path.root {
            crate::features::facts::AccessRoot::Return => {
                if let Some(result) = &call.result {
                    if let Some(rebased) = path.rebase(&AccessPath::ret(), result) {
                        if let Some(fact) = self.to_result(call, input, rebased) {
                            out.insert(fact);
                        }
                    }
                }
            }
            crate::features::facts::AccessRoot::Arg(i) => {
                if let Some(actual) = call.args.get(*i as usize) {
                    if let Some(rebased) = path.rebase(&AccessPath::arg(*i), actual) {
                        out.insert(input.at_path(self.ctx.bounded(rebased)));
                    }
                }
            }
            crate::features::facts::AccessRoot::This => {
                if let Some(receiver) = &call.receiver {
                    if let Some(rebased) = path.rebase(&AccessPath::this(), receiver) {
                        out.insert(input.at_path(self.ctx.bounded(rebased)));
                    }
                }
            }
            crate::features::facts::AccessRoot::Static { .. } => {
                out.insert(input.clone());
            }
            crate::features::facts::AccessRoot::Local(_) => {}
        }

        // Facts on the returned value bind to the call result when the
        // exit statement itself is the return.
        if let InstructionKind::Return { value: Some(v) } = &self.exit_instruction {
            if let Some(result) = &call.result {
                if let Some(rebased) = path.rebase(v, result) {
                    if let Some(fact) = self.to_result(call, input, rebased) {
                        out.insert(fact);
                    }
                }
            }
        }
        out
    }
}

/// The taint instantiation of the flow-function space.
pub struct TaintFlowSpace {
    graph: Arc<dyn ApplicationGraph>,
    config: Arc<TaintConfig>,
    max_depth: usize,
    truncations: Arc<AtomicUsize>,
}

/// Default access-path depth bound.
pub const DEFAULT_MAX_DEPTH: usize = 5;

impl TaintFlowSpace {
    pub fn new(graph: Arc<dyn ApplicationGraph>, config: Arc<TaintConfig>) -> Self {
        Self::with_max_depth(graph, config, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(
        graph: Arc<dyn ApplicationGraph>,
        config: Arc<TaintConfig>,
        max_depth: usize,
    ) -> Self {
        Self {
            graph,
            config,
            max_depth,
            truncations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Access paths truncated to the depth bound so far.
    pub fn truncation_count(&self) -> usize {
        self.truncations.load(Ordering::Relaxed)
    }

    fn ctx(&self) -> FlowCtx {
        FlowCtx {
            config: self.config.clone(),
            max_depth: self.max_depth,
            truncations: self.truncations.clone(),
        }
    }

    fn call_site(&self, stmt: StatementId) -> Option<CallSite> {
        match self.graph.instruction(stmt) {
            InstructionKind::Call(call) => Some(call),
            _ => None,
        }
    }
}

impl FlowFunctionSpace for TaintFlowSpace {
    fn start_facts(&self, method: MethodId, _stmt: StatementId) -> HashSet<Fact> {
        let mut facts = HashSet::from([Fact::Zero]);
        // Source rules matching the start method itself mark its formals.
        let signature = self.graph.method_signature(method);
        for rule in self.config.sources_for(&signature) {
            let path = match Position::parse(&rule.position_matcher) {
                Some(Position::Arg(n)) => AccessPath::arg(n),
                Some(Position::This) => AccessPath::this(),
                _ => continue,
            };
            facts.insert(Fact::tainted(path, Mark::new(rule.mark.clone())));
        }
        facts
    }

    fn sequent(&self, curr: StatementId, _next: StatementId) -> Box<dyn FlowFunction> {
        Box::new(SequentTaint {
            instruction: self.graph.instruction(curr),
            ctx: self.ctx(),
        })
    }

    fn call_to_start(&self, call: StatementId, _callee: MethodId) -> Box<dyn FlowFunction> {
        Box::new(CallToStartTaint {
            call: self.call_site(call),
            ctx: self.ctx(),
        })
    }

    fn call_to_return(&self, call: StatementId, _ret: StatementId) -> Box<dyn FlowFunction> {
        Box::new(CallToReturnTaint {
            call: self.call_site(call),
            ctx: self.ctx(),
        })
    }

    fn exit_to_return(
        &self,
        call: StatementId,
        _ret: StatementId,
        exit: StatementId,
    ) -> Box<dyn FlowFunction> {
        Box::new(ExitToReturnTaint {
            call: self.call_site(call),
            exit_instruction: self.graph.instruction(exit),
            ctx: self.ctx(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::supergraph::ProgramBuilder;
    use crate::features::taint::config::{SanitizerRule, SourceRule, TaintRules};

    fn call_site(signature: &str, args: Vec<AccessPath>, result: Option<AccessPath>) -> CallSite {
        CallSite {
            signature: signature.to_string(),
            receiver: None,
            args,
            result,
        }
    }

    fn space_over(
        instruction: InstructionKind,
        rules: TaintRules,
    ) -> (TaintFlowSpace, StatementId) {
        let mut b = ProgramBuilder::new();
        let m = b.method("com.example.T#t");
        let s = b.statement(m, instruction);
        let graph: Arc<dyn ApplicationGraph> = Arc::new(b.finish());
        let config = Arc::new(TaintConfig::from_layers(rules, None));
        (TaintFlowSpace::new(graph, config), s)
    }

    #[test]
    fn test_assign_kills_and_gens() {
        let (space, s) = space_over(
            InstructionKind::Assign {
                lhs: AccessPath::local("x"),
                rhs: AccessPath::local("y"),
            },
            TaintRules::default(),
        );
        let flow = space.sequent(s, s);

        // y tainted: both x and y tainted afterwards.
        let y = Fact::tainted(AccessPath::local("y"), Mark::taint());
        let out = flow.compute(&y);
        assert!(out.contains(&Fact::tainted(AccessPath::local("x"), Mark::taint())));
        assert!(out.contains(&y));

        // x tainted: overwritten.
        let x = Fact::tainted(AccessPath::local("x"), Mark::taint());
        assert!(flow.compute(&x).is_empty());

        // Zero survives every family.
        assert!(flow.compute(&Fact::Zero).contains(&Fact::Zero));
    }

    #[test]
    fn test_assign_is_field_sensitive() {
        let (space, s) = space_over(
            InstructionKind::Assign {
                lhs: AccessPath::local("o").field("a"),
                rhs: AccessPath::local("p"),
            },
            TaintRules::default(),
        );
        let flow = space.sequent(s, s);

        // o.b untouched by writing o.a.
        let ob = Fact::tainted(AccessPath::local("o").field("b"), Mark::taint());
        assert!(flow.compute(&ob).contains(&ob));

        // o.a.c killed by writing o.a.
        let oac = Fact::tainted(AccessPath::local("o").field("a").field("c"), Mark::taint());
        assert!(flow.compute(&oac).is_empty());
    }

    #[test]
    fn test_source_call_generates_taint() {
        let rules = TaintRules {
            sources: vec![SourceRule {
                method_matcher: "com.example.In#source".to_string(),
                position_matcher: "return".to_string(),
                mark: "TAINT".to_string(),
            }],
            ..TaintRules::default()
        };
        let (space, s) = space_over(
            InstructionKind::Call(call_site(
                "com.example.In#source",
                vec![],
                Some(AccessPath::local("x")),
            )),
            rules,
        );
        let out = space.sequent(s, s).compute(&Fact::Zero);
        assert!(out.contains(&Fact::Zero));
        assert!(out.contains(&Fact::tainted(AccessPath::local("x"), Mark::taint())));
    }

    #[test]
    fn test_unknown_call_kills_result() {
        let (space, s) = space_over(
            InstructionKind::Call(call_site(
                "com.example.Ext#opaque",
                vec![AccessPath::local("a")],
                Some(AccessPath::local("b")),
            )),
            TaintRules::default(),
        );
        let flow = space.sequent(s, s);

        let b = Fact::tainted(AccessPath::local("b"), Mark::taint());
        assert!(flow.compute(&b).is_empty());

        let a = Fact::tainted(AccessPath::local("a"), Mark::taint());
        assert!(flow.compute(&a).contains(&a));
    }

    #[test]
    fn test_sanitizer_kills_argument_mark() {
        let rules = TaintRules {
            sanitizers: vec![SanitizerRule {
                method_matcher: "com.example.Esc#cleanInPlace".to_string(),
                position_matcher: "arg0".to_string(),
                mark: "TAINT".to_string(),
            }],
            ..TaintRules::default()
        };
        let (space, s) = space_over(
            InstructionKind::Call(call_site(
                "com.example.Esc#cleanInPlace",
                vec![AccessPath::local("a")],
                None,
            )),
            rules,
        );
        let a = Fact::tainted(AccessPath::local("a"), Mark::taint());
        assert!(space.sequent(s, s).compute(&a).is_empty());
    }

    #[test]
    fn test_call_to_start_substitutes_formals() {
        let (space, s) = space_over(
            InstructionKind::Call(call_site(
                "com.example.A#id",
                vec![AccessPath::local("a")],
                Some(AccessPath::local("b")),
            )),
            TaintRules::default(),
        );
        let flow = space.call_to_start(s, MethodId(0));

        let fact = Fact::tainted(AccessPath::local("a").field("f"), Mark::taint());
        let out = flow.compute(&fact);
        assert_eq!(
            out,
            HashSet::from([Fact::tainted(AccessPath::arg(0).field("f"), Mark::taint())])
        );

        // Unrelated locals do not enter the callee.
        let other = Fact::tainted(AccessPath::local("z"), Mark::taint());
        assert!(flow.compute(&other).is_empty());
    }

    #[test]
    fn test_exit_to_return_binds_result_and_actuals() {
        let mut b = ProgramBuilder::new();
        let caller = b.method("com.example.A#m");
        let callee = b.method("com.example.A#id");
        let call = b.statement(
            caller,
            InstructionKind::Call(call_site(
                "com.example.A#id",
                vec![AccessPath::local("a")],
                Some(AccessPath::local("b")),
            )),
        );
        b.call_target(call, callee);
        let exit = b.statement(
            callee,
            InstructionKind::Return {
                value: Some(AccessPath::arg(0)),
            },
        );
        let graph: Arc<dyn ApplicationGraph> = Arc::new(b.finish());
        let space = TaintFlowSpace::new(graph, Arc::new(TaintConfig::from_layers(TaintRules::default(), None)));

        let flow = space.exit_to_return(call, call, exit);
        let fact = Fact::tainted(AccessPath::arg(0), Mark::taint());
        let out = flow.compute(&fact);

        // Taint flows back to the actual and binds to the call result.
        assert!(out.contains(&Fact::tainted(AccessPath::local("a"), Mark::taint())));
        assert!(out.contains(&Fact::tainted(AccessPath::local("b"), Mark::taint())));
    }

    #[test]
    fn test_depth_bound_truncates() {
        let (space, s) = space_over(
            InstructionKind::Assign {
                lhs: AccessPath::local("x"),
                rhs: AccessPath::local("y"),
            },
            TaintRules::default(),
        );
        let deep = AccessPath::local("y")
            .field("a")
            .field("b")
            .field("c")
            .field("d")
            .field("e")
            .field("f");
        let out = space.sequent(s, s).compute(&Fact::tainted(deep, Mark::taint()));

        // The fact rebased onto x is cut to the depth bound.
        let expected = AccessPath::local("x")
            .field("a")
            .field("b")
            .field("c")
            .field("d")
            .field("e");
        assert!(out.contains(&Fact::tainted(expected, Mark::taint())));
        assert!(space.truncation_count() > 0);
    }
}
