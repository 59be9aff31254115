//! Graph primitives and dataflow analyses over the block graph.

mod digraph;
mod dominance;
mod liveness;

pub use digraph::Digraph;
pub use dominance::DominatorTree;
pub use liveness::{preserve_locations, LiveRange, Liveness};
