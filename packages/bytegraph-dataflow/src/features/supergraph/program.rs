/*
 * In-Memory Program Model
 *
 * A concrete `ApplicationGraph` backing tests and the CLI. The bytecode
 * database proper lives outside this crate; drivers hand the engine
 * either a programmatically built `Program` or one deserialized from a
 * JSON snapshot (`--dbLocation`).
 *
 * Builder conventions:
 * - the first statement added to a method is its entry,
 * - statements left without successors at `finish()` are exits,
 * - exits that keep successors (exceptional flow) are marked explicitly
 *   with `mark_exit`.
 */

use super::application_graph::{ApplicationGraph, InstructionKind};
use crate::shared::{MethodId, StatementId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MethodData {
    signature: String,
    entries: Vec<StatementId>,
    exits: Vec<StatementId>,
    statements: Vec<StatementId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatementData {
    method: MethodId,
    instruction: InstructionKind,
    successors: Vec<StatementId>,
    callees: Vec<MethodId>,
}

/// In-memory application graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    methods: Vec<MethodData>,
    statements: Vec<StatementData>,
}

impl Program {
    /// Load a program snapshot from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Program> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Methods whose class name starts with any of the given prefixes.
    pub fn methods_matching_class_prefixes(&self, prefixes: &[String]) -> Vec<MethodId> {
        self.methods()
            .into_iter()
            .filter(|m| {
                let signature = self.method_signature(*m);
                let class = super::application_graph::class_of(&signature);
                prefixes.iter().any(|p| class.starts_with(p.as_str()))
            })
            .collect()
    }
}

impl ApplicationGraph for Program {
    fn methods(&self) -> Vec<MethodId> {
        (0..self.methods.len() as u32).map(MethodId).collect()
    }

    fn method_signature(&self, method: MethodId) -> String {
        self.methods[method.index()].signature.clone()
    }

    fn entry_points(&self, method: MethodId) -> Vec<StatementId> {
        self.methods[method.index()].entries.clone()
    }

    fn exit_points(&self, method: MethodId) -> Vec<StatementId> {
        self.methods[method.index()].exits.clone()
    }

    fn statements(&self, method: MethodId) -> Vec<StatementId> {
        self.methods[method.index()].statements.clone()
    }

    fn successors(&self, stmt: StatementId) -> Vec<StatementId> {
        self.statements[stmt.index()].successors.clone()
    }

    fn callees(&self, stmt: StatementId) -> Vec<MethodId> {
        self.statements[stmt.index()].callees.clone()
    }

    fn method_of(&self, stmt: StatementId) -> MethodId {
        self.statements[stmt.index()].method
    }

    fn instruction(&self, stmt: StatementId) -> InstructionKind {
        self.statements[stmt.index()].instruction.clone()
    }
}

/// Fluent builder for `Program`.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method by qualified signature.
    pub fn method(&mut self, signature: impl Into<String>) -> MethodId {
        let id = MethodId(self.program.methods.len() as u32);
        self.program.methods.push(MethodData {
            signature: signature.into(),
            entries: Vec::new(),
            exits: Vec::new(),
            statements: Vec::new(),
        });
        id
    }

    /// Append a statement to a method. The first statement becomes the
    /// method's entry.
    pub fn statement(&mut self, method: MethodId, instruction: InstructionKind) -> StatementId {
        let id = StatementId(self.program.statements.len() as u32);
        self.program.statements.push(StatementData {
            method,
            instruction,
            successors: Vec::new(),
            callees: Vec::new(),
        });
        let data = &mut self.program.methods[method.index()];
        if data.statements.is_empty() {
            data.entries.push(id);
        }
        data.statements.push(id);
        id
    }

    /// Intraprocedural control-flow edge.
    pub fn edge(&mut self, from: StatementId, to: StatementId) -> &mut Self {
        self.program.statements[from.index()].successors.push(to);
        self
    }

    /// Resolve a call statement to a target method.
    pub fn call_target(&mut self, call: StatementId, callee: MethodId) -> &mut Self {
        self.program.statements[call.index()].callees.push(callee);
        self
    }

    /// Mark an exceptional exit.
    pub fn mark_exit(&mut self, stmt: StatementId) -> &mut Self {
        let method = self.program.statements[stmt.index()].method;
        let exits = &mut self.program.methods[method.index()].exits;
        if !exits.contains(&stmt) {
            exits.push(stmt);
        }
        self
    }

    /// Finalize: successor-less statements become exits.
    pub fn finish(mut self) -> Program {
        for (idx, stmt) in self.program.statements.iter().enumerate() {
            let id = StatementId(idx as u32);
            if stmt.successors.is_empty() {
                let exits = &mut self.program.methods[stmt.method.index()].exits;
                if !exits.contains(&id) {
                    exits.push(id);
                }
            }
        }
        self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::facts::AccessPath;
    use crate::features::supergraph::application_graph::CallSite;

    fn two_statement_method() -> (Program, MethodId, StatementId, StatementId) {
        let mut b = ProgramBuilder::new();
        let m = b.method("com.example.Main#main");
        let s0 = b.statement(
            m,
            InstructionKind::Assign {
                lhs: AccessPath::local("x"),
                rhs: AccessPath::arg(0),
            },
        );
        let s1 = b.statement(m, InstructionKind::Return { value: None });
        b.edge(s0, s1);
        (b.finish(), m, s0, s1)
    }

    #[test]
    fn test_entry_and_exit_detection() {
        let (program, m, s0, s1) = two_statement_method();

        assert_eq!(program.entry_points(m), vec![s0]);
        assert_eq!(program.exit_points(m), vec![s1]);
        assert!(program.is_entry(s0));
        assert!(program.is_exit(s1));
        assert!(!program.is_exit(s0));
    }

    #[test]
    fn test_method_of_and_successors() {
        let (program, m, s0, s1) = two_statement_method();

        assert_eq!(program.method_of(s0), m);
        assert_eq!(program.method_of(s1), m);
        assert_eq!(program.successors(s0), vec![s1]);
        assert!(program.successors(s1).is_empty());
    }

    #[test]
    fn test_call_targets() {
        let mut b = ProgramBuilder::new();
        let main = b.method("com.example.Main#main");
        let helper = b.method("com.example.Main#helper");
        let call = b.statement(
            main,
            InstructionKind::Call(CallSite {
                signature: "com.example.Main#helper".to_string(),
                receiver: None,
                args: vec![AccessPath::local("a")],
                result: Some(AccessPath::local("b")),
            }),
        );
        b.call_target(call, helper);
        let program = b.finish();

        assert_eq!(program.callees(call), vec![helper]);
    }

    #[test]
    fn test_json_round_trip() {
        let (program, m, _, _) = two_statement_method();
        let json = program.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();

        assert_eq!(back.method_count(), 1);
        assert_eq!(back.method_signature(m), "com.example.Main#main");
    }

    #[test]
    fn test_class_prefix_filter() {
        let mut b = ProgramBuilder::new();
        b.method("com.example.Main#main");
        b.method("org.other.Util#helper");
        let program = b.finish();

        let selected = program.methods_matching_class_prefixes(&["com.example".to_string()]);
        assert_eq!(selected, vec![MethodId(0)]);
    }
}
