//! The mid-end pipeline: simplification, SSA waves, optimization,
//! preserved-location cleanup and control-flow recovery.
//!
//! Renaming runs in three waves — registers, local variables, then memory
//! dereferences — with stack-pointer/flags propagation and a full
//! simplification pass between waves so deref addresses are canonical
//! before memory locations are keyed by their rendered form.
//!
//! The pipeline commits to erasing SSA subscripts: the printer always
//! receives unsubscripted IR (phis, where they survive, are kept for the
//! printer to render as merges).

use crate::analysis::{preserve_locations, Digraph, DominatorTree};
use crate::cflow::{self, Shape};
use crate::config::Config;
use crate::error::DecompileError;
use crate::ir::{verify, Function};
use crate::passes::{DeadDerefs, DeadRegisters, Optimizer, Pass, RegisterPropagation, SimplifyPass};
use crate::simplify;
use crate::ssa::{build_wave, relax_phis, RenameClass, SsaContext};

/// The finished product handed to the back-end printer.
#[derive(Debug)]
pub struct DecompiledFunction {
    pub function: Function,
    /// Scope annotations and printable block order.
    pub shape: Shape,
    /// Final SSA bookkeeping (definition table, preserved pairs); useful
    /// to printers that render provenance.
    pub ssa: SsaContext,
}

/// Runs the full mid-end over a lifted function.
pub fn process(mut func: Function, config: &Config) -> Result<DecompiledFunction, DecompileError> {
    tracing::debug!(target: "relift::pipeline", function = %func.name, "mid-end start");

    if func.blocks.is_empty() {
        return Err(DecompileError::MalformedIr {
            function: func.name.clone(),
            detail: "function has no basic blocks".to_string(),
        });
    }

    let mut ctx = SsaContext::new(func.uninit);

    reduce_all(&mut func, config);
    ssa_transform(&mut func, &mut ctx, config)?;
    optimize(&mut func, &mut ctx, config)?;
    preserved_cleanup(&mut func, &mut ctx, config)?;

    transform_out(&mut func);
    debug_assert!(verify::subscripts_erased(&func));

    let shape = cflow::recover(&mut func);
    Ok(DecompiledFunction {
        function: func,
        shape,
        ssa: ctx,
    })
}

/// Simplifies every statement of every reachable block.
fn reduce_all(func: &mut Function, config: &Config) {
    let opts = config.reduce_opts();
    let graph = Digraph::from_function(func);
    for &block in graph.dfs_order() {
        let container = func.block(block).container;
        for sid in func.body.container(container).stmts.clone() {
            simplify::reduce_stmt(&mut func.body, sid, &opts);
        }
    }
}

/// The three renaming waves with inter-wave canonicalization.
fn ssa_transform(
    func: &mut Function,
    ctx: &mut SsaContext,
    config: &Config,
) -> Result<(), DecompileError> {
    let graph = Digraph::from_function(func);
    let dom = DominatorTree::build(&graph);

    build_wave(func, &graph, &dom, RenameClass::Registers, ctx);
    verify::debug_verify(func, Some(&graph), Some(ctx), "ssa-registers");
    relax_phis(func, ctx);

    // Canonicalize known locations so the later waves see stable names.
    if let Some(arch) = func.arch.clone() {
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(RegisterPropagation::stack_regs(&arch.sp_reg, &arch.bp_reg)),
            Box::new(RegisterPropagation::flag_regs(&arch.flag_regs)),
            Box::new(SimplifyPass),
        ];
        Optimizer::new(passes)
            .run(func, ctx, config)
            .map_err(|e| DecompileError::Pass("inter-wave-propagation", e))?;
    } else {
        reduce_all(func, config);
    }

    build_wave(func, &graph, &dom, RenameClass::Variables, ctx);
    relax_phis(func, ctx);

    build_wave(func, &graph, &dom, RenameClass::Memory, ctx);
    relax_phis(func, ctx);
    verify::debug_verify(func, None, Some(ctx), "ssa-complete");

    Ok(())
}

/// The main optimization schedule, run to per-pass fixpoint.
fn optimize(
    func: &mut Function,
    ctx: &mut SsaContext,
    config: &Config,
) -> Result<(), DecompileError> {
    Optimizer::new(Optimizer::default_passes())
        .run(func, ctx, config)
        .map_err(|e| DecompileError::Pass("optimize", e))?;
    Ok(())
}

/// Marks preserved save/restore chains and prunes what became removable.
fn preserved_cleanup(
    func: &mut Function,
    ctx: &mut SsaContext,
    config: &Config,
) -> Result<(), DecompileError> {
    let graph = Digraph::from_function(func);
    let dom = DominatorTree::build(&graph);
    let marked = preserve_locations(func, &graph, &dom, ctx);
    if marked == 0 {
        return Ok(());
    }
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(DeadRegisters), Box::new(DeadDerefs)];
    Optimizer::new(passes)
        .run(func, ctx, config)
        .map_err(|e| DecompileError::Pass("preserved-cleanup", e))?;
    Ok(())
}

/// Erases every SSA subscript, readying the IR for the printer.
pub fn transform_out(func: &mut Function) {
    let mut containers: Vec<_> = func.blocks.iter().map(|b| b.container).collect();
    containers.push(func.uninit);
    for cid in containers {
        for sid in func.body.container(cid).stmts.clone() {
            for top in func.body.stmt(sid).exprs.clone() {
                for n in func.body.subtree(top) {
                    func.body.expr_mut(n).idx = None;
                }
            }
        }
    }
}
