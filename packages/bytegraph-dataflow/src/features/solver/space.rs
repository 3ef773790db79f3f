/*
 * Flow-Function Space
 *
 * The four flow-function families of an IFDS problem plus the start-fact
 * oracle. The solver asks the space for a flow function per transition
 * and applies it fact by fact:
 *
 *   start(stmt)                      facts holding at a method entry
 *   sequent(curr, next)              non-call intraprocedural transfer
 *   call_to_start(call, callee)     actuals substituted into formals
 *   call_to_return(call, ret)       facts bypassing the callee
 *   exit_to_return(call, ret, exit) callee exit facts back into the caller
 *
 * `start` must contain Zero; every family must propagate Zero to at
 * least {Zero}.
 */

use super::flow_function::{FlowFunction, IdentityFlow};
use crate::features::facts::Fact;
use crate::shared::{MethodId, StatementId};
use std::collections::HashSet;

/// The flow functions of one analysis.
pub trait FlowFunctionSpace: Send + Sync {
    /// Facts that may hold at a method entry; must contain `Zero`.
    fn start_facts(&self, method: MethodId, stmt: StatementId) -> HashSet<Fact> {
        let _ = (method, stmt);
        HashSet::from([Fact::Zero])
    }

    /// Transfer across a single non-call CFG edge.
    fn sequent(&self, curr: StatementId, next: StatementId) -> Box<dyn FlowFunction>;

    /// Translate caller facts into callee start facts.
    fn call_to_start(&self, call: StatementId, callee: MethodId) -> Box<dyn FlowFunction>;

    /// Facts that bypass the callee.
    fn call_to_return(&self, call: StatementId, ret: StatementId) -> Box<dyn FlowFunction>;

    /// Translate callee exit facts back into caller vertices.
    fn exit_to_return(
        &self,
        call: StatementId,
        ret: StatementId,
        exit: StatementId,
    ) -> Box<dyn FlowFunction>;
}

/// Space where every family is identity. Propagates reachability of the
/// seeded facts and nothing else; used by the tautology analyzer and as
/// the backward default.
pub struct IdentityFlowSpace;

impl FlowFunctionSpace for IdentityFlowSpace {
    fn sequent(&self, _curr: StatementId, _next: StatementId) -> Box<dyn FlowFunction> {
        Box::new(IdentityFlow)
    }

    fn call_to_start(&self, _call: StatementId, _callee: MethodId) -> Box<dyn FlowFunction> {
        Box::new(IdentityFlow)
    }

    fn call_to_return(&self, _call: StatementId, _ret: StatementId) -> Box<dyn FlowFunction> {
        Box::new(IdentityFlow)
    }

    fn exit_to_return(
        &self,
        _call: StatementId,
        _ret: StatementId,
        _exit: StatementId,
    ) -> Box<dyn FlowFunction> {
        Box::new(IdentityFlow)
    }
}
