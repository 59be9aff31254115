//! Phi relaxation: collapses degenerate phis after a renaming wave.
//!
//! Runs as a single fixpoint over a snapshot of the context's definitions:
//!
//! - `x = Phi(y)` collapses to `x = y`.
//! - `x = Phi(a, x)` / `x = Phi(x, a)` (self-reference) collapses to `x = a`.
//! - A phi whose single use is itself an argument of another phi folds its
//!   arguments into that phi (key-unique) and disappears.

use rustc_hash::FxHashSet;

use super::context::SsaContext;
use crate::ir::{ExprId, ExprKind, Function, Parent};

/// `(name, idx)` identity of a phi operand or definition.
fn arg_key(func: &Function, id: ExprId) -> Option<(String, u32)> {
    let name = func.body.base_name(id)?;
    Some((name, func.body.expr(id).idx.unwrap_or(0)))
}

/// When `phi` is the right-hand side of an assignment, returns that
/// assignment's lhs.
fn phi_owner(func: &Function, phi: ExprId) -> Option<ExprId> {
    match func.body.expr(phi).parent {
        Some(Parent::Expr(p)) => match func.body.expr(p).kind {
            ExprKind::Assign(lhs, rhs) if rhs == phi => Some(lhs),
            _ => None,
        },
        _ => None,
    }
}

/// Runs relaxation to fixpoint. Returns whether anything changed.
pub fn relax_phis(func: &mut Function, ctx: &mut SsaContext) -> bool {
    let mut changed_any = false;
    loop {
        let mut changed = false;
        let keys: Vec<_> = ctx.defs.keys().cloned().collect();
        for key in keys {
            let Some(&def) = ctx.defs.get(&key) else {
                continue;
            };
            let Some(rhs) = func.body.def_value(def) else {
                continue;
            };
            let args = match &func.body.expr(rhs).kind {
                ExprKind::Phi(args) => args.clone(),
                _ => continue,
            };

            let lhs_key = (key.name.clone(), key.idx);
            if args.len() == 1 {
                // A lone self-argument is a dead cycle; pruning owns those.
                if arg_key(func, args[0]) != Some(lhs_key.clone()) {
                    func.body.replace(rhs, args[0]);
                    changed = true;
                }
                continue;
            }

            // Self-referential phi: drop the self arguments; if a single
            // distinct incoming value remains, the phi is a plain copy.
            let (selfs, others): (Vec<ExprId>, Vec<ExprId>) = args
                .iter()
                .copied()
                .partition(|&a| arg_key(func, a) == Some(lhs_key.clone()));
            if !selfs.is_empty() && !others.is_empty() {
                let distinct: FxHashSet<_> =
                    others.iter().filter_map(|&a| arg_key(func, a)).collect();
                if distinct.len() == 1 {
                    func.body.replace(rhs, others[0]);
                    changed = true;
                    continue;
                }
            }

            if fold_chained_phi(func, ctx, &key, def, rhs, &args) {
                changed = true;
            }
        }
        changed_any |= changed;
        if !changed {
            break;
        }
    }
    ctx.apply_def_moves(func.body.take_def_moves());
    changed_any
}

/// When the phi's single use is an argument of another phi, merges this
/// phi's arguments into the user phi (preserving key uniqueness) and
/// deletes this assignment.
fn fold_chained_phi(
    func: &mut Function,
    ctx: &mut SsaContext,
    key: &super::context::DefKey,
    def: ExprId,
    rhs: ExprId,
    args: &[ExprId],
) -> bool {
    let uses = func.body.expr(def).uses.clone();
    if uses.len() != 1 {
        return false;
    }
    let user = uses[0];
    let Some(Parent::Expr(target_phi)) = func.body.expr(user).parent else {
        return false;
    };
    if target_phi == rhs {
        return false;
    }
    if !func.body.expr(target_phi).kind.is_phi() || phi_owner(func, target_phi).is_none() {
        return false;
    }

    let target_args = match &func.body.expr(target_phi).kind {
        ExprKind::Phi(a) => a.clone(),
        _ => return false,
    };
    let mut present: FxHashSet<(String, u32)> = target_args
        .iter()
        .filter(|&&a| a != user)
        .filter_map(|&a| arg_key(func, a))
        .collect();

    let mut new_args = Vec::with_capacity(target_args.len() + args.len());
    for a in target_args {
        if a != user {
            new_args.push(a);
            continue;
        }
        for &folded in args {
            match arg_key(func, folded) {
                Some(k) if !present.contains(&k) => {
                    present.insert(k);
                    new_args.push(folded);
                    func.body.expr_mut(folded).parent = Some(Parent::Expr(target_phi));
                }
                _ => func.body.detach_subtree_uses(folded),
            }
        }
    }
    func.body.expr_mut(target_phi).kind = ExprKind::Phi(new_args);
    func.body.unlink_use(user);

    // The folded phi's arguments moved out; empty it and drop the statement.
    func.body.expr_mut(rhs).kind = ExprKind::Phi(Vec::new());
    if let Some(sid) = func.body.stmt_of(def) {
        func.body.pluck_stmt(sid, true);
    }
    ctx.defs.shift_remove(key);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ExprFlags, FunctionBuilder, StmtKind};
    use crate::ssa::context::DefKey;

    /// Hand-builds `x_2 = Phi(x_1)` and checks it collapses to `x_2 = x_1`.
    #[test]
    fn test_single_arg_phi_collapses() {
        let mut fb = FunctionBuilder::new(0, "t");
        let b = fb.add_block(0);
        let body = fb.body();
        let x1 = body.reg("eax", 32);
        body.expr_mut(x1).idx = Some(1);
        body.expr_mut(x1).flags |= ExprFlags::IS_DEF;
        let one = body.val(1, 32);
        let d1 = body.assign(x1, one);
        let s1 = body.alloc_stmt(0, StmtKind::Expr, vec![d1]);

        let arg = body.reg("eax", 32);
        body.expr_mut(arg).idx = Some(1);
        body.link_use(arg, x1);
        let phi = body.alloc(ExprKind::Phi(vec![arg]), 32);
        let x2 = body.reg("eax", 32);
        body.expr_mut(x2).idx = Some(2);
        let d2 = body.assign(x2, phi);
        let s2 = body.alloc_stmt(4, StmtKind::Expr, vec![d2]);

        let mut func = fb.finish();
        let c = func.block(b).container;
        func.body.push_stmt(c, s1);
        func.body.push_stmt(c, s2);

        let mut ctx = SsaContext::new(func.uninit);
        ctx.defs.insert(DefKey::new("eax", 1), x1);
        ctx.defs.insert(DefKey::new("eax", 2), x2);

        assert!(relax_phis(&mut func, &mut ctx));
        let rhs = func.body.def_value(x2).unwrap();
        assert_eq!(rhs, arg);
    }

    /// `x_3 = Phi(x_1, x_3)` collapses to `x_3 = x_1`.
    #[test]
    fn test_self_referential_phi_collapses() {
        let mut fb = FunctionBuilder::new(0, "t");
        let blk = fb.add_block(0);
        let body = fb.body();
        let x1 = body.reg("eax", 32);
        body.expr_mut(x1).idx = Some(1);
        let zero = body.val(0, 32);
        let d1 = body.assign(x1, zero);
        let s1 = body.alloc_stmt(0, StmtKind::Expr, vec![d1]);

        let a1 = body.reg("eax", 32);
        body.expr_mut(a1).idx = Some(1);
        body.link_use(a1, x1);
        let a2 = body.reg("eax", 32);
        body.expr_mut(a2).idx = Some(3);
        let phi = body.alloc(ExprKind::Phi(vec![a1, a2]), 32);
        let x3 = body.reg("eax", 32);
        body.expr_mut(x3).idx = Some(3);
        let d3 = body.assign(x3, phi);
        body.link_use(a2, x3);
        let s3 = body.alloc_stmt(4, StmtKind::Expr, vec![d3]);

        let mut func = fb.finish();
        let c = func.block(blk).container;
        func.body.push_stmt(c, s1);
        func.body.push_stmt(c, s3);

        let mut ctx = SsaContext::new(func.uninit);
        ctx.defs.insert(DefKey::new("eax", 1), x1);
        ctx.defs.insert(DefKey::new("eax", 3), x3);

        assert!(relax_phis(&mut func, &mut ctx));
        let rhs = func.body.def_value(x3).unwrap();
        assert_eq!(rhs, a1);
        // The self-argument dropped out of eax_3's readers.
        assert!(!func.body.expr(x3).uses.contains(&a2));
    }
}
