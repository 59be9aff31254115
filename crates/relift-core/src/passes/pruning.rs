//! Pruning passes: delete assignments whose definitions are dead.
//!
//! Each pass walks a snapshot of the context's definition table, applies
//! its selector, plucks the assignment statements that match and removes
//! the entries.

use rustc_hash::FxHashSet;

use super::Pass;
use crate::config::Config;
use crate::error::PassError;
use crate::ir::{ExprFlags, ExprId, ExprKind, Function, Parent, StmtKind};
use crate::ssa::SsaContext;

/// Dead register stores: zero uses, and the value is not a call (unless
/// pruning was explicitly requested, e.g. by preserved-location analysis).
/// Local variables are kept; they are observable program state.
pub struct DeadRegisters;

impl Pass for DeadRegisters {
    fn name(&self) -> &'static str {
        "prune-dead-regs"
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
            if !func.body.expr(def).uses.is_empty() {
                continue;
            }
            if !matches!(func.body.expr(def).kind, ExprKind::Reg(_)) {
                continue;
            }
            let Some(val) = func.body.def_value(def) else {
                continue;
            };
            if func.body.expr(val).kind.is_call()
                && !func.body.expr(def).flags.contains(ExprFlags::PRUNE)
            {
                continue;
            }
            if let Some(sid) = func.body.stmt_of(def) {
                func.body.pluck_stmt(sid, true);
                ctx.defs.shift_remove(&key);
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Dead memory stores: zero uses, and the store is provably droppable —
/// the value is a phi, the `noalias` configuration is on, or the location
/// was marked safe. Unless marked safe, the store is kept whenever its
/// address still depends on a live definition (a value somebody else may
/// observe through an alias).
pub struct DeadDerefs;

impl Pass for DeadDerefs {
    fn name(&self) -> &'static str {
        "prune-dead-derefs"
    }

    fn run(
        &mut self,
        func: &mut Function,
        ctx: &mut SsaContext,
        config: &Config,
    ) -> Result<bool, PassError> {
        let mut changed = false;
        let keys: Vec<_> = ctx.defs.keys().cloned().collect();
        for key in keys {
            let Some(&def) = ctx.defs.get(&key) else {
                continue;
            };
            if !func.body.expr(def).uses.is_empty() {
                continue;
            }
            let ExprKind::Deref(addr) = func.body.expr(def).kind else {
                continue;
            };
            let Some(val) = func.body.def_value(def) else {
                continue;
            };
            let safe = func.body.expr(def).is_safe();
            if !(func.body.expr(val).kind.is_phi() || config.opt.noalias || safe) {
                continue;
            }
            if !safe && address_reads_live_def(func, def, addr) {
                continue;
            }
            if let Some(sid) = func.body.stmt_of(def) {
                func.body.pluck_stmt(sid, true);
                ctx.defs.shift_remove(&key);
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// True when the deref's address reads a definition that is still used
/// outside this assignment.
fn address_reads_live_def(func: &Function, def: ExprId, addr: ExprId) -> bool {
    let Some(assign) = func.body.def_assign(def) else {
        return false;
    };
    let within: FxHashSet<ExprId> = func.body.subtree(assign).into_iter().collect();
    for n in func.body.subtree(addr) {
        if let Some(d) = func.body.expr(n).def {
            if func
                .body
                .expr(d)
                .uses
                .iter()
                .any(|u| !within.contains(u))
            {
                return true;
            }
        }
    }
    false
}

/// Dead call results: `reg = call(...)` with zero uses of the register.
/// The call is extracted as a standalone expression statement so its side
/// effects survive, and the assignment is dropped.
pub struct DeadResults;

impl Pass for DeadResults {
    fn name(&self) -> &'static str {
        "prune-dead-results"
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
            if !func.body.expr(def).uses.is_empty() {
                continue;
            }
            if !matches!(func.body.expr(def).kind, ExprKind::Reg(_)) {
                continue;
            }
            let Some(val) = func.body.def_value(def) else {
                continue;
            };
            if !func.body.expr(val).kind.is_call() {
                continue;
            }
            let Some(sid) = func.body.stmt_of(def) else {
                continue;
            };
            let Some(container) = func.body.stmt(sid).parent else {
                continue;
            };
            let pos = func.body.stmt_position(container, sid).unwrap_or(0);
            let addr = func.body.stmt(sid).addr;

            // Re-home the call, then drop the assignment shell around it.
            let call_stmt = func.body.alloc_stmt(addr, StmtKind::Expr, vec![val]);
            func.body.insert_stmt_at(container, pos, call_stmt);
            func.body.pluck_stmt(sid, false);
            ctx.defs.shift_remove(&key);
            changed = true;
        }
        Ok(changed)
    }
}

/// Phi webs with no observable reader: a phi whose value only ever flows
/// into other phis of the same web (self-assignment, circular chains) is
/// deleted wholesale. Detection is a visited-set DFS over phi uses.
pub struct PhiCycles;

impl Pass for PhiCycles {
    fn name(&self) -> &'static str {
        "prune-phi-cycles"
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
            let Some(val) = func.body.def_value(def) else {
                continue;
            };
            if !func.body.expr(val).kind.is_phi() {
                continue;
            }
            if let Some(web) = circular_web(func, def) {
                for member in web {
                    if let Some(sid) = func.body.stmt_of(member) {
                        func.body.pluck_stmt(sid, true);
                    }
                    ctx.remove_by_value(member);
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

/// Starting from a phi definition, follows all uses. If every use is an
/// argument of another phi assignment (so the value never escapes into
/// real computation), returns the set of phi definitions forming the web.
fn circular_web(func: &Function, start: ExprId) -> Option<Vec<ExprId>> {
    let mut visited: FxHashSet<ExprId> = FxHashSet::default();
    let mut order = Vec::new();
    let mut stack = vec![start];
    visited.insert(start);
    while let Some(def) = stack.pop() {
        order.push(def);
        for &u in &func.body.expr(def).uses {
            let Some(Parent::Expr(p)) = func.body.expr(u).parent else {
                return None;
            };
            if !func.body.expr(p).kind.is_phi() {
                return None;
            }
            let Some(Parent::Expr(assign)) = func.body.expr(p).parent else {
                return None;
            };
            let owner = match func.body.expr(assign).kind {
                ExprKind::Assign(lhs, rhs) if rhs == p => lhs,
                _ => return None,
            };
            if visited.insert(owner) {
                stack.push(owner);
            }
        }
    }
    Some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Digraph, DominatorTree};
    use crate::ir::{BlockId, FunctionBuilder};
    use crate::ssa::{build_wave, RenameClass};

    /// eax = call(f); eax = 5; return eax — the first result is dead and
    /// the call must survive as a standalone statement.
    #[test]
    fn test_dead_result_extracts_call() {
        let mut fb = FunctionBuilder::new(0, "t");
        let blk = fb.add_block(0);
        let eax1 = fb.body().reg("eax", 32);
        let callee = fb.body().val(0x4000, 32);
        let call = fb.body().call(callee, vec![], 32);
        fb.assign(blk, 0, eax1, call);
        let eax2 = fb.body().reg("eax", 32);
        let five = fb.body().val(5, 32);
        fb.assign(blk, 4, eax2, five);
        let ret = fb.body().reg("eax", 32);
        fb.ret(blk, 8, Some(ret));
        let mut func = fb.finish();

        let graph = Digraph::from_function(&func);
        let dom = DominatorTree::build(&graph);
        let mut ctx = SsaContext::new(func.uninit);
        build_wave(&mut func, &graph, &dom, RenameClass::Registers, &mut ctx);

        let config = Config::default();
        let mut dead_regs = DeadRegisters;
        // The call-result definition resists plain register pruning.
        dead_regs.run(&mut func, &mut ctx, &config).unwrap();
        let container = func.block(BlockId(0)).container;
        assert_eq!(func.body.container(container).len(), 3);

        let mut pass = DeadResults;
        assert!(pass.run(&mut func, &mut ctx, &config).unwrap());

        let stmts = func.body.container(container).stmts.clone();
        assert_eq!(stmts.len(), 3);
        // First statement is now the bare call.
        let first = func.body.stmt(stmts[0]).exprs[0];
        assert!(func.body.expr(first).kind.is_call());
        assert_eq!(first, call);
    }

    /// A phi web that only feeds itself disappears.
    #[test]
    fn test_circular_phi_web_pruned() {
        use crate::ir::StmtKind;
        let mut fb = FunctionBuilder::new(0, "t");
        let blk = fb.add_block(0);
        let body = fb.body();

        // x_1 = Phi(x_2); x_2 = Phi(x_1)
        let a1 = body.reg("eax", 32);
        body.expr_mut(a1).idx = Some(2);
        let phi1 = body.alloc(ExprKind::Phi(vec![a1]), 32);
        let x1 = body.reg("eax", 32);
        body.expr_mut(x1).idx = Some(1);
        let d1 = body.assign(x1, phi1);
        let s1 = body.alloc_stmt(0, StmtKind::Expr, vec![d1]);

        let a2 = body.reg("eax", 32);
        body.expr_mut(a2).idx = Some(1);
        let phi2 = body.alloc(ExprKind::Phi(vec![a2]), 32);
        let x2 = body.reg("eax", 32);
        body.expr_mut(x2).idx = Some(2);
        let d2 = body.assign(x2, phi2);
        let s2 = body.alloc_stmt(4, StmtKind::Expr, vec![d2]);

        body.link_use(a1, x2);
        body.link_use(a2, x1);

        let mut func = fb.finish();
        let c = func.block(blk).container;
        func.body.push_stmt(c, s1);
        func.body.push_stmt(c, s2);

        let mut ctx = SsaContext::new(func.uninit);
        ctx.defs.insert(crate::ssa::DefKey::new("eax", 1), x1);
        ctx.defs.insert(crate::ssa::DefKey::new("eax", 2), x2);

        let config = Config::default();
        let mut pass = PhiCycles;
        assert!(pass.run(&mut func, &mut ctx, &config).unwrap());
        assert!(ctx.defs.is_empty());
        assert!(func.body.container(c).is_empty());
    }
}
