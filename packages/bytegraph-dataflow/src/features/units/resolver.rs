/*
 * Unit Resolution
 *
 * A unit is the equivalence class of methods analyzed by one runner.
 * The resolver fixes the partition of work: path edges inside a unit
 * stay local, edges crossing units travel as summary-store messages.
 */

use crate::features::supergraph::application_graph::{class_of, package_of, ApplicationGraph};
use crate::shared::MethodId;
use std::fmt;

/// Equivalence class of methods owned by one runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    /// All methods in one unit.
    Singleton,

    /// Methods of one class.
    Class(String),

    /// Methods of one package.
    Package(String),

    /// Every method is its own unit.
    Method(MethodId),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Singleton => write!(f, "singleton"),
            Unit::Class(name) => write!(f, "class:{name}"),
            Unit::Package(name) => write!(f, "package:{name}"),
            Unit::Method(id) => write!(f, "method:{id}"),
        }
    }
}

/// Strategy mapping methods onto units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UnitResolver {
    /// One runner for the whole program.
    #[default]
    Singleton,

    /// One runner per class.
    PerClass,

    /// One runner per package.
    PerPackage,

    /// One runner per method.
    PerMethod,
}

impl fmt::Display for UnitResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitResolver::Singleton => write!(f, "singleton"),
            UnitResolver::PerClass => write!(f, "per-class"),
            UnitResolver::PerPackage => write!(f, "per-package"),
            UnitResolver::PerMethod => write!(f, "per-method"),
        }
    }
}

impl UnitResolver {
    pub fn resolve(&self, graph: &dyn ApplicationGraph, method: MethodId) -> Unit {
        match self {
            UnitResolver::Singleton => Unit::Singleton,
            UnitResolver::PerClass => {
                Unit::Class(class_of(&graph.method_signature(method)).to_string())
            }
            UnitResolver::PerPackage => {
                Unit::Package(package_of(&graph.method_signature(method)).to_string())
            }
            UnitResolver::PerMethod => Unit::Method(method),
        }
    }
}
