//! Witness-trace reconstruction from reason annotations.

pub mod builder;

pub use builder::{TraceGraph, TraceGraphBuilder};
