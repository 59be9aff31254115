//! Configuration surface consumed by the core.
//!
//! Keys mirror the host-visible dotted names: `opt.noalias`,
//! `cflow.converge` and the `out.*` print options. The `out` section is
//! carried opaquely for the back-end printer; the core never reads it.

use serde::{Deserialize, Serialize};

use crate::simplify::ReduceOpts;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub opt: OptConfig,
    pub cflow: CflowConfig,
    pub out: OutConfig,
}

impl Config {
    pub fn reduce_opts(&self) -> ReduceOpts {
        ReduceOpts {
            converge: self.cflow.converge,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptConfig {
    /// Treat memory dereferences as non-aliasing for dead-store
    /// elimination.
    pub noalias: bool,
    /// Iteration cap per optimizer pass; exceeding it logs and leaves the
    /// IR in its current state.
    pub max_fixpoint_iterations: usize,
}

impl Default for OptConfig {
    fn default() -> Self {
        OptConfig {
            noalias: false,
            max_fixpoint_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CflowConfig {
    /// Enable converged-condition simplification (relational rank algebra).
    pub converge: bool,
}

impl Default for CflowConfig {
    fn default() -> Self {
        CflowConfig { converge: true }
    }
}

/// Back-end print options, parsed here but consumed by the printer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutConfig {
    pub offsets: bool,
    pub guides: bool,
    pub newline: String,
    pub tabsize: u32,
    pub theme: String,
}

impl Default for OutConfig {
    fn default() -> Self {
        OutConfig {
            offsets: false,
            guides: true,
            newline: "\n".to_string(),
            tabsize: 4,
            theme: "default".to_string(),
        }
    }
}
