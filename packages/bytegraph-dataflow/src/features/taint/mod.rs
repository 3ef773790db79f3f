//! Taint analysis instantiation: configuration, flow functions, and the
//! analyzer plugin.

pub mod analyzer;
pub mod config;
pub mod flows;

pub use analyzer::{BackwardTaintAnalyzer, TaintAnalyzer};
pub use config::{TaintConfig, TaintRules};
pub use flows::{TaintFlowSpace, DEFAULT_MAX_DEPTH};
