/*
 * Application Graph Interface
 *
 * The engine's read-only view of the program under analysis: per-method
 * entry/exit statements, per-statement successors and resolved callees,
 * and the instruction behavior flow functions need. Implementations may
 * materialize CFGs lazily; the engine treats every observation as pure.
 *
 * A call statement is one whose callee list is non-empty; a call whose
 * targets were not resolved (yet) degrades to an intraprocedural step.
 * Exit statements are recognized by membership in `exit_points`, never
 * by the absence of successors: exceptional flow can give an exit
 * statement successors of its own.
 */

use crate::features::facts::AccessPath;
use crate::shared::{MethodId, StatementId};
use serde::{Deserialize, Serialize};

/// Invocation shape at a call statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Signature of the invoked target, `com.example.Cls#name`.
    pub signature: String,

    /// Receiver path for instance calls.
    pub receiver: Option<AccessPath>,

    /// Actual argument paths, in position order.
    pub args: Vec<AccessPath>,

    /// Path assigned the call result, when the value is used.
    pub result: Option<AccessPath>,
}

/// Instruction behavior visible to flow functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// `lhs = rhs` (copy between locations).
    Assign { lhs: AccessPath, rhs: AccessPath },

    /// `lhs = <constant>` (overwrites with an unmarked value).
    Const { lhs: AccessPath },

    /// Method invocation.
    Call(CallSite),

    /// `return value` (value absent for void returns).
    Return { value: Option<AccessPath> },

    /// No dataflow effect.
    Nop,
}

/// Read-only observations over the program under analysis.
pub trait ApplicationGraph: Send + Sync {
    /// Every method, in id order.
    fn methods(&self) -> Vec<MethodId>;

    /// Qualified signature of a method, `com.example.Cls#name`.
    fn method_signature(&self, method: MethodId) -> String;

    /// Statements a method starts at.
    fn entry_points(&self, method: MethodId) -> Vec<StatementId>;

    /// Statements a method exits from.
    fn exit_points(&self, method: MethodId) -> Vec<StatementId>;

    /// All statements of a method.
    fn statements(&self, method: MethodId) -> Vec<StatementId>;

    /// Control-flow successors of a statement.
    fn successors(&self, stmt: StatementId) -> Vec<StatementId>;

    /// Resolved call targets of a statement; empty for non-calls and for
    /// unresolved calls.
    fn callees(&self, stmt: StatementId) -> Vec<MethodId>;

    /// Enclosing method of a statement.
    fn method_of(&self, stmt: StatementId) -> MethodId;

    /// Instruction behavior of a statement.
    fn instruction(&self, stmt: StatementId) -> InstructionKind;

    /// Whether a statement is one of its method's exits.
    fn is_exit(&self, stmt: StatementId) -> bool {
        self.exit_points(self.method_of(stmt)).contains(&stmt)
    }

    /// Whether a statement is one of its method's entries.
    fn is_entry(&self, stmt: StatementId) -> bool {
        self.entry_points(self.method_of(stmt)).contains(&stmt)
    }
}

/// Class part of a qualified signature (`com.example.Cls#name`).
pub fn class_of(signature: &str) -> &str {
    signature.split('#').next().unwrap_or(signature)
}

/// Package part of a qualified signature; empty for the default package.
pub fn package_of(signature: &str) -> &str {
    let class = class_of(signature);
    match class.rfind('.') {
        Some(idx) => &class[..idx],
        None => "",
    }
}
