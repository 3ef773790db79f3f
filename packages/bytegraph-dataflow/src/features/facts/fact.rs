/*
 * Dataflow Facts
 *
 * The abstract domain propagated by flow functions. `Zero` is the
 * tautological fact required by IFDS: it holds unconditionally and is
 * the source of all unconditional flow (seed facts are generated from
 * it). Every other fact is a marked access path.
 *
 * Facts are immutable and hash/equal structurally. Marks are kept in a
 * BTreeSet so equal fact values hash identically regardless of
 * insertion order.
 *
 * Reference:
 * - Reps, Horwitz, Sagiv (1995): "Precise Interprocedural Dataflow
 *   Analysis via Graph Reachability" (the Λ/zero fact)
 */

use super::access_path::AccessPath;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Symbolic tag denoting a kind of contamination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mark(pub String);

impl Mark {
    pub fn new(name: impl Into<String>) -> Self {
        Mark(name.into())
    }

    /// User-controlled data.
    pub fn taint() -> Self {
        Mark("TAINT".to_string())
    }

    /// Possibly-null value.
    pub fn nullness() -> Self {
        Mark("NULLNESS".to_string())
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element of the abstract domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fact {
    /// The always-holding tautology.
    Zero,

    /// A marked abstract location.
    Tainted {
        path: AccessPath,
        marks: BTreeSet<Mark>,
    },
}

impl Fact {
    pub fn zero() -> Self {
        Fact::Zero
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Fact::Zero)
    }

    /// Single-mark fact.
    pub fn tainted(path: AccessPath, mark: Mark) -> Self {
        Fact::Tainted {
            path,
            marks: BTreeSet::from([mark]),
        }
    }

    pub fn with_marks(path: AccessPath, marks: BTreeSet<Mark>) -> Self {
        Fact::Tainted { path, marks }
    }

    pub fn path(&self) -> Option<&AccessPath> {
        match self {
            Fact::Zero => None,
            Fact::Tainted { path, .. } => Some(path),
        }
    }

    pub fn marks(&self) -> Option<&BTreeSet<Mark>> {
        match self {
            Fact::Zero => None,
            Fact::Tainted { marks, .. } => Some(marks),
        }
    }

    pub fn has_mark(&self, mark: &Mark) -> bool {
        self.marks().is_some_and(|marks| marks.contains(mark))
    }

    /// Same marks, different path. `Zero` maps to itself.
    pub fn at_path(&self, path: AccessPath) -> Fact {
        match self {
            Fact::Zero => Fact::Zero,
            Fact::Tainted { marks, .. } => Fact::Tainted {
                path,
                marks: marks.clone(),
            },
        }
    }

    /// Deterministic 64-bit key used in the stable finding order.
    pub fn stable_key(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Zero => write!(f, "0"),
            Fact::Tainted { path, marks } => {
                let marks: Vec<String> = marks.iter().map(|m| m.0.clone()).collect();
                write!(f, "{path}[{}]", marks.join(","))
            }
        }
    }
}
