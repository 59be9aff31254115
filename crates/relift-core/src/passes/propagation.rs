//! Propagation passes: rewrite uses of a definition with its value.
//!
//! A propagation pass walks the context's definition table (snapshotting
//! keys up front), applies its selector, and rewrites every selected use
//! with a clone of the defining value. When all uses are replaced the
//! original assignment is plucked and the entry removed.

use super::Pass;
use crate::config::Config;
use crate::error::PassError;
use crate::ir::{ClonePreserve, Function};
use crate::ssa::SsaContext;

/// Conservative copy propagation over "safe" definitions: subscripted
/// (not entry-state), non-phi values with exactly one use.
pub struct CopyPropagation;

impl Pass for CopyPropagation {
    fn name(&self) -> &'static str {
        "propagate-safe-defs"
    }

    fn run(
        &mut self,
        func: &mut Function,
        ctx: &mut SsaContext,
        _config: &Config,
    ) -> Result<bool, PassError> {
        let mut changed = false;
        let keys: Vec<_> = ctx.defs.keys().cloned().collect();
        for key in keys {
            let Some(&def) = ctx.defs.get(&key) else {
                continue;
            };
            if func.body.expr(def).idx.unwrap_or(0) == 0 {
                continue;
            }
            let Some(val) = func.body.def_value(def) else {
                continue;
            };
            if func.body.expr(val).kind.is_phi() {
                continue;
            }
            let uses = func.body.expr(def).uses.clone();
            if uses.len() != 1 {
                continue;
            }
            // A use inside the defining statement would churn forever.
            if func.body.stmt_of(uses[0]) == func.body.stmt_of(def) {
                continue;
            }

            let copy = func.body.clone_expr(val, ClonePreserve::SSA);
            func.body.replace(uses[0], copy);
            changed = true;

            if func.body.expr(def).uses.is_empty() {
                if let Some(sid) = func.body.stmt_of(def) {
                    func.body.pluck_stmt(sid, true);
                }
                ctx.defs.shift_remove(&key);
            }
        }
        Ok(changed)
    }
}

/// Unconditional propagation of a fixed register set.
///
/// Used between renaming waves for the stack pointer and flags registers,
/// so deref addresses and branch conditions canonicalize before the next
/// wave keys locations by their rendered form.
pub struct RegisterPropagation {
    name: &'static str,
    regs: Vec<String>,
}

impl RegisterPropagation {
    pub fn new(name: &'static str, regs: Vec<String>) -> Self {
        RegisterPropagation { name, regs }
    }

    /// Stack-pointer and frame-base propagation for an architecture.
    pub fn stack_regs(sp: &str, bp: &str) -> Self {
        let mut regs = vec![sp.to_string()];
        if !bp.is_empty() && bp != sp {
            regs.push(bp.to_string());
        }
        RegisterPropagation::new("propagate-stack-regs", regs)
    }

    /// Flags-register propagation (condition codes into branch sites).
    pub fn flag_regs(flags: &[String]) -> Self {
        RegisterPropagation::new("propagate-flag-regs", flags.to_vec())
    }
}

impl Pass for RegisterPropagation {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(
        &mut self,
        func: &mut Function,
        ctx: &mut SsaContext,
        _config: &Config,
    ) -> Result<bool, PassError> {
        let mut changed = false;
        let keys: Vec<_> = ctx.defs.keys().cloned().collect();
        for key in keys {
            if !self.regs.iter().any(|r| r == &key.name) {
                continue;
            }
            let Some(&def) = ctx.defs.get(&key) else {
                continue;
            };
            if func.body.expr(def).idx.unwrap_or(0) == 0 {
                continue;
            }
            let Some(val) = func.body.def_value(def) else {
                continue;
            };
            if func.body.expr(val).kind.is_phi() || func.body.expr(val).kind.is_call() {
                continue;
            }

            for u in func.body.expr(def).uses.clone() {
                let copy = func.body.clone_expr(val, ClonePreserve::SSA);
                func.body.replace(u, copy);
                changed = true;
            }
            if func.body.expr(def).uses.is_empty() {
                if let Some(sid) = func.body.stmt_of(def) {
                    func.body.pluck_stmt(sid, true);
                }
                ctx.defs.shift_remove(&key);
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Digraph, DominatorTree};
    use crate::ir::{BinOp, BlockId, ExprKind, FunctionBuilder};
    use crate::ssa::{build_wave, RenameClass};

    /// a = 2; b = 3; c = a + b: copy propagation inlines a and b.
    #[test]
    fn test_single_use_defs_propagate() {
        let mut fb = FunctionBuilder::new(0, "t");
        let blk = fb.add_block(0);
        let a = fb.body().reg("eax", 32);
        let two = fb.body().val(2, 32);
        fb.assign(blk, 0, a, two);
        let b = fb.body().reg("ebx", 32);
        let three = fb.body().val(3, 32);
        fb.assign(blk, 4, b, three);
        let c = fb.body().reg("ecx", 32);
        let au = fb.body().reg("eax", 32);
        let bu = fb.body().reg("ebx", 32);
        let sum = fb.body().binary(BinOp::Add, au, bu);
        fb.assign(blk, 8, c, sum);
        let cu = fb.body().reg("ecx", 32);
        fb.ret(blk, 12, Some(cu));
        let mut func = fb.finish();

        let graph = Digraph::from_function(&func);
        let dom = DominatorTree::build(&graph);
        let mut ctx = SsaContext::new(func.uninit);
        build_wave(&mut func, &graph, &dom, RenameClass::Registers, &mut ctx);

        let config = Config::default();
        let mut pass = CopyPropagation;
        while pass.run(&mut func, &mut ctx, &config).unwrap() {
            ctx.apply_def_moves(func.body.take_def_moves());
        }

        // The container now holds only the return; c's value reached it.
        let container = func.block(BlockId(0)).container;
        let stmts = &func.body.container(container).stmts;
        assert_eq!(stmts.len(), 1);
        let ret_val = func.body.stmt(stmts[0]).exprs[0];
        match func.body.expr(ret_val).kind {
            ExprKind::Binary(BinOp::Add, l, r) => {
                assert!(matches!(func.body.expr(l).kind, ExprKind::Val(2)));
                assert!(matches!(func.body.expr(r).kind, ExprKind::Val(3)));
            }
            ref k => panic!("expected propagated (2 + 3), got {k:?}"),
        }
    }
}
