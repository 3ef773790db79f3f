//! Application-graph interface and the in-memory program model.

pub mod application_graph;
pub mod program;
pub mod reversed;

pub use application_graph::{ApplicationGraph, CallSite, InstructionKind};
pub use program::{Program, ProgramBuilder};
pub use reversed::ReversedGraph;
