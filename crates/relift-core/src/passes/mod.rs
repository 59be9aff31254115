//! Optimizer driver and the pass interface.
//!
//! The optimizer accepts a pass list and a context and runs each pass to
//! fixpoint before moving on. Passes report changed/unchanged; no errors
//! cross the pass boundary except genuinely malformed IR. A pass that
//! fails to stabilize within the configured iteration cap is abandoned
//! with a warning, leaving the IR in its current state.

mod propagation;
mod pruning;

pub use propagation::{CopyPropagation, RegisterPropagation};
pub use pruning::{DeadDerefs, DeadRegisters, DeadResults, PhiCycles};

use crate::analysis::Digraph;
use crate::config::Config;
use crate::error::PassError;
use crate::ir::{verify, Function};
use crate::simplify;
use crate::ssa::SsaContext;

/// A fixpoint transformation over a function's IR.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Runs one iteration. Returns whether anything changed.
    fn run(
        &mut self,
        func: &mut Function,
        ctx: &mut SsaContext,
        config: &Config,
    ) -> Result<bool, PassError>;
}

/// Runs a pass list, each to fixpoint, in order.
pub struct Optimizer {
    passes: Vec<Box<dyn Pass>>,
}

impl Optimizer {
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        Optimizer { passes }
    }

    /// The standard post-SSA pass schedule.
    pub fn default_passes() -> Vec<Box<dyn Pass>> {
        vec![
            Box::new(CopyPropagation),
            Box::new(SimplifyPass),
            Box::new(DeadResults),
            Box::new(DeadRegisters),
            Box::new(DeadDerefs),
            Box::new(PhiCycles),
        ]
    }

    pub fn run(
        &mut self,
        func: &mut Function,
        ctx: &mut SsaContext,
        config: &Config,
    ) -> Result<(), PassError> {
        for pass in &mut self.passes {
            let mut iterations = 0usize;
            loop {
                let changed = pass.run(func, ctx, config)?;
                ctx.apply_def_moves(func.body.take_def_moves());
                if !changed {
                    break;
                }
                iterations += 1;
                if iterations >= config.opt.max_fixpoint_iterations {
                    tracing::warn!(
                        target: "relift::opt",
                        pass = pass.name(),
                        function = %func.name,
                        iterations,
                        "fixpoint diverged; leaving IR in its current state"
                    );
                    break;
                }
            }
            if cfg!(debug_assertions) {
                verify::debug_verify(func, None, Some(ctx), pass.name());
            }
        }
        Ok(())
    }
}

/// Re-runs algebraic simplification over every reachable statement.
pub struct SimplifyPass;

impl Pass for SimplifyPass {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn run(
        &mut self,
        func: &mut Function,
        _ctx: &mut SsaContext,
        config: &Config,
    ) -> Result<bool, PassError> {
        let opts = config.reduce_opts();
        let graph = Digraph::from_function(func);
        let mut changed = false;
        for &block in graph.dfs_order() {
            let container = func.block(block).container;
            for sid in func.body.container(container).stmts.clone() {
                changed |= simplify::reduce_stmt(&mut func.body, sid, &opts);
            }
        }
        Ok(changed)
    }
}
