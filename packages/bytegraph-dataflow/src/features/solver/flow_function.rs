/*
 * Flow Functions
 *
 * A flow function maps one input fact to a set of output facts across a
 * single CFG edge or call transition. Required properties: deterministic
 * and idempotent on the same input, monotone over the input set, and
 * `Zero` always propagates to at least `{Zero}`.
 */

use crate::features::facts::Fact;
use std::collections::HashSet;

/// D -> 2^D over a single transition.
pub trait FlowFunction: Send + Sync {
    /// Compute output facts given one input fact.
    fn compute(&self, input: &Fact) -> HashSet<Fact>;

    /// Whether this flow function is identity (f(d) = {d}).
    fn is_identity(&self) -> bool {
        false
    }
}

/// Identity flow function: f(d) = {d}.
pub struct IdentityFlow;

impl FlowFunction for IdentityFlow {
    fn compute(&self, input: &Fact) -> HashSet<Fact> {
        HashSet::from([input.clone()])
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Kill flow function: f(d) = {} for non-zero d; Zero survives.
pub struct KillFlow;

impl FlowFunction for KillFlow {
    fn compute(&self, input: &Fact) -> HashSet<Fact> {
        if input.is_zero() {
            HashSet::from([Fact::Zero])
        } else {
            HashSet::new()
        }
    }
}

/// Gen flow function: f(d) = {d} ∪ {gen_fact}.
pub struct GenFlow {
    pub gen_fact: Fact,
}

impl FlowFunction for GenFlow {
    fn compute(&self, input: &Fact) -> HashSet<Fact> {
        HashSet::from([input.clone(), self.gen_fact.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::facts::{AccessPath, Mark};

    #[test]
    fn test_identity_flow() {
        let fact = Fact::tainted(AccessPath::local("x"), Mark::taint());
        let out = IdentityFlow.compute(&fact);
        assert_eq!(out, HashSet::from([fact]));
        assert!(IdentityFlow.is_identity());
    }

    #[test]
    fn test_kill_flow_preserves_zero() {
        let fact = Fact::tainted(AccessPath::local("x"), Mark::taint());
        assert!(KillFlow.compute(&fact).is_empty());
        assert_eq!(KillFlow.compute(&Fact::Zero), HashSet::from([Fact::Zero]));
    }

    #[test]
    fn test_gen_flow() {
        let gen = Fact::tainted(AccessPath::local("y"), Mark::taint());
        let flow = GenFlow {
            gen_fact: gen.clone(),
        };
        let out = flow.compute(&Fact::Zero);
        assert_eq!(out.len(), 2);
        assert!(out.contains(&Fact::Zero));
        assert!(out.contains(&gen));
    }
}
