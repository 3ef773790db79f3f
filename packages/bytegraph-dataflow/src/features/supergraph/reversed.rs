/*
 * Reversed Graph View
 *
 * The same interface with predecessor/successor roles swapped, used by
 * backward solvers. Entry points become exit points and vice versa;
 * predecessor lists are materialized once at construction since the
 * underlying graph only exposes forward successors.
 */

use super::application_graph::{ApplicationGraph, InstructionKind};
use crate::shared::{MethodId, StatementId};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Backward view over an application graph.
pub struct ReversedGraph {
    inner: Arc<dyn ApplicationGraph>,
    predecessors: FxHashMap<StatementId, Vec<StatementId>>,
}

impl ReversedGraph {
    pub fn new(inner: Arc<dyn ApplicationGraph>) -> Self {
        let mut predecessors: FxHashMap<StatementId, Vec<StatementId>> = FxHashMap::default();
        for method in inner.methods() {
            for stmt in inner.statements(method) {
                for succ in inner.successors(stmt) {
                    predecessors.entry(succ).or_default().push(stmt);
                }
            }
        }
        Self {
            inner,
            predecessors,
        }
    }
}

impl ApplicationGraph for ReversedGraph {
    fn methods(&self) -> Vec<MethodId> {
        self.inner.methods()
    }

    fn method_signature(&self, method: MethodId) -> String {
        self.inner.method_signature(method)
    }

    fn entry_points(&self, method: MethodId) -> Vec<StatementId> {
        self.inner.exit_points(method)
    }

    fn exit_points(&self, method: MethodId) -> Vec<StatementId> {
        self.inner.entry_points(method)
    }

    fn statements(&self, method: MethodId) -> Vec<StatementId> {
        self.inner.statements(method)
    }

    fn successors(&self, stmt: StatementId) -> Vec<StatementId> {
        self.predecessors.get(&stmt).cloned().unwrap_or_default()
    }

    fn callees(&self, stmt: StatementId) -> Vec<MethodId> {
        self.inner.callees(stmt)
    }

    fn method_of(&self, stmt: StatementId) -> MethodId {
        self.inner.method_of(stmt)
    }

    fn instruction(&self, stmt: StatementId) -> InstructionKind {
        self.inner.instruction(stmt)
    }
}
