//! Domain-fact model: access paths and taint facts.

pub mod access_path;
pub mod fact;

pub use access_path::{AccessPath, AccessRoot};
pub use fact::{Fact, Mark};
