//! Error kinds of the decompiler mid-end.
//!
//! Passes never throw across the pass boundary: each returns a
//! changed/unchanged flag and recovers or logs internally. The types here
//! cover the failures that do surface to the caller.

use thiserror::Error;

/// Failures surfaced by the pipeline or the front-end contract.
#[derive(Debug, Error)]
pub enum DecompileError {
    /// No front-end lifter matches the architecture; no decompilation is
    /// emitted.
    #[error("no front-end lifter for architecture `{0}`")]
    UnknownArch(String),

    /// No calling-convention handler for a call site; fails the current
    /// function, not the whole run.
    #[error("no calling-convention handler `{conv}` for call at {addr:#x}")]
    UnknownCallConv { conv: String, addr: u64 },

    /// An IR-model invariant was violated badly enough that the function
    /// cannot be processed.
    #[error("malformed IR in function `{function}`: {detail}")]
    MalformedIr { function: String, detail: String },

    #[error("pass `{0}` failed")]
    Pass(&'static str, #[source] PassError),
}

/// Failure inside a single optimizer pass.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("malformed IR: {0}")]
    MalformedIr(String),
}
