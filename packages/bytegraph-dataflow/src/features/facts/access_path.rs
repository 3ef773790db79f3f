/*
 * Access Paths
 *
 * An access path is a root (local, formal parameter, receiver, static
 * field, or the return pseudo-slot) followed by a chain of field
 * selectors. It names an abstract storage location for field-sensitive
 * tracking: obj.a.b vs obj.a.c can carry different taint.
 *
 * Prefix checks ("ap1 starts with ap2") drive kill/gen decisions, and
 * rebasing substitutes actuals for formals at call boundaries.
 *
 * Reference:
 * - "Field-Sensitive Program Analysis" (Whaley & Lam, 2004)
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of an access path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessRoot {
    /// Local variable, by name.
    Local(String),

    /// Formal parameter, encoded `argN`.
    Arg(u16),

    /// The receiver (`this`).
    This,

    /// Static field reference `owner.field`.
    Static { owner: String, field: String },

    /// Pseudo-slot holding a method's return value.
    Return,
}

impl fmt::Display for AccessRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRoot::Local(name) => write!(f, "{name}"),
            AccessRoot::Arg(n) => write!(f, "arg{n}"),
            AccessRoot::This => write!(f, "this"),
            AccessRoot::Static { owner, field } => write!(f, "{owner}.{field}"),
            AccessRoot::Return => write!(f, "return"),
        }
    }
}

/// A root plus a chain of field selectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessPath {
    pub root: AccessRoot,
    pub selectors: Vec<String>,
}

impl AccessPath {
    pub fn new(root: AccessRoot) -> Self {
        Self {
            root,
            selectors: Vec::new(),
        }
    }

    /// Local variable path.
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(AccessRoot::Local(name.into()))
    }

    /// Formal parameter path (`argN`).
    pub fn arg(index: u16) -> Self {
        Self::new(AccessRoot::Arg(index))
    }

    /// Receiver path.
    pub fn this() -> Self {
        Self::new(AccessRoot::This)
    }

    /// Return pseudo-slot path.
    pub fn ret() -> Self {
        Self::new(AccessRoot::Return)
    }

    /// Static field path.
    pub fn static_field(owner: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(AccessRoot::Static {
            owner: owner.into(),
            field: field.into(),
        })
    }

    /// Append a field selector (builder style).
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.selectors.push(name.into());
        self
    }

    /// Number of selectors on top of the root.
    pub fn depth(&self) -> usize {
        self.selectors.len()
    }

    /// Whether this path names a location reachable from a static root.
    pub fn is_static(&self) -> bool {
        matches!(self.root, AccessRoot::Static { .. })
    }

    /// `self` starts with `prefix`: same root and `prefix.selectors` is a
    /// prefix of `self.selectors`. A path starts with itself.
    pub fn starts_with(&self, prefix: &AccessPath) -> bool {
        self.root == prefix.root
            && self.selectors.len() >= prefix.selectors.len()
            && self.selectors[..prefix.selectors.len()] == prefix.selectors[..]
    }

    /// Replace the `from` prefix of `self` with `to`, keeping the selector
    /// remainder. Returns `None` when `self` does not start with `from`.
    pub fn rebase(&self, from: &AccessPath, to: &AccessPath) -> Option<AccessPath> {
        if !self.starts_with(from) {
            return None;
        }
        let mut selectors = to.selectors.clone();
        selectors.extend_from_slice(&self.selectors[from.selectors.len()..]);
        Some(AccessPath {
            root: to.root.clone(),
            selectors,
        })
    }

    /// Truncate the selector chain to `max_depth`. The second component
    /// reports whether truncation happened.
    pub fn truncated(&self, max_depth: usize) -> (AccessPath, bool) {
        if self.selectors.len() <= max_depth {
            return (self.clone(), false);
        }
        let mut out = self.clone();
        out.selectors.truncate(max_depth);
        (out, true)
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for sel in &self.selectors {
            write!(f, ".{sel}")?;
        }
        Ok(())
    }
}
