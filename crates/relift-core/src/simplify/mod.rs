//! Algebraic simplification of expression trees.
//!
//! [`reduce_expr`] applies rewrite rules bottom-up (post-order) until no
//! rule fires. Every firing rule strictly shrinks a well-founded measure —
//! it removes a node, replaces a subtree with a constant, or moves a
//! constant toward the root through a finite associative chain — so the
//! fixpoint terminates without an iteration bound.

mod rules;

use crate::ir::{Body, ExprId, StmtId};

/// Knobs consumed by the rule sets.
#[derive(Debug, Clone, Copy)]
pub struct ReduceOpts {
    /// Enables converged-condition rewriting (relational rank algebra).
    pub converge: bool,
}

impl Default for ReduceOpts {
    fn default() -> Self {
        ReduceOpts { converge: true }
    }
}

/// Reduces the tree rooted at `id` to fixpoint.
///
/// Returns the id now occupying the original tree's slot (the root may be
/// replaced wholesale, e.g. `x + 0` collapsing to `x`).
pub fn reduce_expr(body: &mut Body, id: ExprId, opts: &ReduceOpts) -> ExprId {
    let mut changed = false;
    reduce_rec(body, id, opts, &mut changed)
}

/// Reduces every top-level expression of a statement. Returns whether
/// anything changed.
pub fn reduce_stmt(body: &mut Body, stmt: StmtId, opts: &ReduceOpts) -> bool {
    let mut changed = false;
    for expr in body.stmt(stmt).exprs.clone() {
        reduce_rec(body, expr, opts, &mut changed);
    }
    changed
}

fn reduce_rec(body: &mut Body, mut id: ExprId, opts: &ReduceOpts, changed: &mut bool) -> ExprId {
    loop {
        for op in body.operands(id) {
            reduce_rec(body, op, opts, changed);
        }
        match rules::try_reduce(body, id, opts) {
            Some(new_id) => {
                body.replace(id, new_id);
                *changed = true;
                id = new_id;
            }
            None => return id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, ExprKind, UnOp};

    fn opts() -> ReduceOpts {
        ReduceOpts::default()
    }

    #[test]
    fn test_add_zero_is_identity() {
        let mut body = Body::new();
        let x = body.reg("eax", 32);
        let z = body.val(0, 32);
        let sum = body.binary(BinOp::Add, x, z);
        let out = reduce_expr(&mut body, sum, &opts());
        assert_eq!(out, x);
    }

    #[test]
    fn test_constant_fold_add() {
        let mut body = Body::new();
        let two = body.val(2, 32);
        let three = body.val(3, 32);
        let sum = body.binary(BinOp::Add, two, three);
        let out = reduce_expr(&mut body, sum, &opts());
        assert!(matches!(body.expr(out).kind, ExprKind::Val(5)));
        assert_eq!(body.expr(out).size, 32);
    }

    #[test]
    fn test_double_bool_not() {
        let mut body = Body::new();
        let x = body.reg("eax", 32);
        let n1 = body.unary(UnOp::BoolNot, x);
        let n2 = body.unary(UnOp::BoolNot, n1);
        let out = reduce_expr(&mut body, n2, &opts());
        assert_eq!(out, x);
    }

    #[test]
    fn test_xor_self_is_zero() {
        let mut body = Body::new();
        let a = body.reg("eax", 32);
        let b = body.reg("eax", 32);
        let x = body.binary(BinOp::Xor, a, b);
        let out = reduce_expr(&mut body, x, &opts());
        assert!(matches!(body.expr(out).kind, ExprKind::Val(0)));
        assert_eq!(body.expr(out).size, 32);
    }

    #[test]
    fn test_sub_eq_zero_becomes_eq() {
        let mut body = Body::new();
        let x = body.reg("eax", 32);
        let y = body.reg("ebx", 32);
        let sub = body.binary(BinOp::Sub, x, y);
        let z = body.val(0, 32);
        let cmp = body.binary(BinOp::Eq, sub, z);
        let out = reduce_expr(&mut body, cmp, &opts());
        match body.expr(out).kind {
            ExprKind::Binary(BinOp::Eq, l, r) => {
                assert_eq!(l, x);
                assert_eq!(r, y);
            }
            ref k => panic!("expected Eq(x, y), got {k:?}"),
        }
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let mut body = Body::new();
        let x = body.reg("eax", 32);
        let one = body.val(1, 32);
        let two = body.val(2, 32);
        let a = body.binary(BinOp::Add, x, one);
        let b = body.binary(BinOp::Add, a, two);
        let out = reduce_expr(&mut body, b, &opts());
        let rendered = body.display(out);
        let again = reduce_expr(&mut body, out, &opts());
        assert_eq!(out, again);
        assert_eq!(body.display(again), rendered);
    }

    #[test]
    fn test_nested_chain_folds_to_single_add() {
        // ((x + 1) + 2) -> (x + 3)
        let mut body = Body::new();
        let x = body.reg("eax", 32);
        let one = body.val(1, 32);
        let two = body.val(2, 32);
        let a = body.binary(BinOp::Add, x, one);
        let b = body.binary(BinOp::Add, a, two);
        let out = reduce_expr(&mut body, b, &opts());
        match body.expr(out).kind {
            ExprKind::Binary(BinOp::Add, l, r) => {
                assert_eq!(l, x);
                assert!(matches!(body.expr(r).kind, ExprKind::Val(3)));
            }
            ref k => panic!("expected (x + 3), got {k:?}"),
        }
    }

    #[test]
    fn test_deref_addrof_cancels() {
        let mut body = Body::new();
        let x = body.var("x", 32);
        let a = body.addr_of(x);
        let d = body.deref(a, 32);
        let out = reduce_expr(&mut body, d, &opts());
        assert_eq!(out, x);
    }

    #[test]
    fn test_ternary_folds() {
        let mut body = Body::new();
        let c = body.val(1, 32);
        let t = body.reg("eax", 32);
        let f = body.reg("ebx", 32);
        let tc = body.tcond(c, t, f);
        let out = reduce_expr(&mut body, tc, &opts());
        assert_eq!(out, t);
    }
}
