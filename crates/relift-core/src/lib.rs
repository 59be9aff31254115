//! relift-core: the mid-end of a binary decompiler.
//!
//! Consumes the control-flow graph and per-block lifted IR of a single
//! function and converts it into a simplified intermediate representation
//! in SSA form — phi placement over dominance frontiers, dominator-walk
//! renaming, def-use chains, algebraic simplification and selector-driven
//! propagation/pruning — annotated with recovered control-flow structure
//! for a back-end pseudo-source printer.
//!
//! The core is single-threaded and purely CPU-bound; each function is
//! processed in isolation. Instruction decoding, the analysis host and
//! the printer are external collaborators described by the contract types
//! in [`frontend`].

pub mod analysis;
pub mod cflow;
pub mod config;
pub mod error;
pub mod frontend;
pub mod ir;
pub mod passes;
pub mod pipeline;
pub mod simplify;
pub mod ssa;

pub use config::Config;
pub use error::{DecompileError, PassError};
pub use ir::{Function, FunctionBuilder};
pub use pipeline::{process, transform_out, DecompiledFunction};
