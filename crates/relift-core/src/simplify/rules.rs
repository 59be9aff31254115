//! Rewrite rules, partitioned by expression arity.
//!
//! Every rule inspects one node and either returns the id of a replacement
//! (which the driver splices in) or `None` meaning "did not fire". Rules
//! are tried in a fixed order; the first hit wins.

use super::ReduceOpts;
use crate::ir::{
    comparison_from_rank, msb_set, sign_extend, size_mask, BinOp, Body, ExprId, ExprKind,
    RankOutcome, UnOp,
};

/// Tries the rule set matching the node's arity family.
pub(super) fn try_reduce(body: &mut Body, id: ExprId, opts: &ReduceOpts) -> Option<ExprId> {
    let kind = &body.expr(id).kind;
    if kind.is_binary() {
        binary(body, id, opts)
    } else if kind.is_unary() {
        unary(body, id, opts)
    } else if matches!(kind, ExprKind::TCond(_, _, _)) {
        ternary(body, id)
    } else {
        None
    }
}

fn as_val(body: &Body, id: ExprId) -> Option<u64> {
    match body.expr(id).kind {
        ExprKind::Val(v) => Some(v),
        _ => None,
    }
}

fn is_negative(value: u64, size: u16) -> bool {
    sign_extend(value, size) < 0
}

/// Constant folding, performed only when sign-safe: a right shift folds
/// only when the left operand's most significant bit is clear; everything
/// else folds unconditionally (division never folds on a zero divisor).
fn fold_binary(op: BinOp, a: u64, b: u64, size: u16) -> Option<u64> {
    let m = size_mask(size);
    Some(match op {
        BinOp::Add => a.wrapping_add(b) & m,
        BinOp::Sub => a.wrapping_sub(b) & m,
        BinOp::Mul => a.wrapping_mul(b) & m,
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            (sign_extend(a, size).wrapping_div(sign_extend(b, size)) as u64) & m
        }
        BinOp::Mod => {
            if b == 0 {
                return None;
            }
            (sign_extend(a, size).wrapping_rem(sign_extend(b, size)) as u64) & m
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => {
            if b >= 64 {
                0
            } else {
                a.wrapping_shl(b as u32) & m
            }
        }
        BinOp::Shr => {
            if msb_set(a, size) {
                return None;
            }
            if b >= 64 {
                0
            } else {
                (a >> b) & m
            }
        }
        BinOp::BoolAnd => u64::from(a != 0 && b != 0),
        BinOp::BoolOr => u64::from(a != 0 || b != 0),
        BinOp::Eq => u64::from(a == b),
        BinOp::Ne => u64::from(a != b),
        BinOp::Lt => u64::from(sign_extend(a, size) < sign_extend(b, size)),
        BinOp::Le => u64::from(sign_extend(a, size) <= sign_extend(b, size)),
        BinOp::Gt => u64::from(sign_extend(a, size) > sign_extend(b, size)),
        BinOp::Ge => u64::from(sign_extend(a, size) >= sign_extend(b, size)),
    })
}

fn binary(body: &mut Body, id: ExprId, opts: &ReduceOpts) -> Option<ExprId> {
    let (op, l, r) = match body.expr(id).kind {
        ExprKind::Binary(op, l, r) => (op, l, r),
        _ => return None,
    };
    let size = body.expr(id).size;
    let lv = as_val(body, l);
    let rv = as_val(body, r);

    // Constant folding.
    if let (Some(a), Some(b)) = (lv, rv) {
        if let Some(v) = fold_binary(op, a, b, size) {
            return Some(body.val(v, size));
        }
    }

    // Arithmetic identities.
    match op {
        BinOp::Add => {
            if rv == Some(0) {
                return Some(l);
            }
            if lv == Some(0) {
                return Some(r);
            }
        }
        BinOp::Sub => {
            if rv == Some(0) {
                return Some(l);
            }
        }
        BinOp::Mul => {
            if rv == Some(1) {
                return Some(l);
            }
            if lv == Some(1) {
                return Some(r);
            }
            if rv == Some(0) || lv == Some(0) {
                return Some(body.val(0, size));
            }
        }
        BinOp::Div => {
            if rv == Some(1) {
                return Some(l);
            }
        }
        _ => {}
    }

    // Sign correction: `x + (-c)` reads as `x - c` (and the converse).
    // The lone-sign-bit value has no positive counterpart and stays put.
    if matches!(op, BinOp::Add | BinOp::Sub) && lv.is_none() {
        if let Some(c) = rv {
            if is_negative(c, size) {
                let n = c.wrapping_neg() & size_mask(size);
                if !is_negative(n, size) {
                    let flipped = if op == BinOp::Add {
                        BinOp::Sub
                    } else {
                        BinOp::Add
                    };
                    let nc = body.val(n, size);
                    return Some(body.binary(flipped, l, nc));
                }
            }
        }
    }

    // Bitwise identities.
    let ones = size_mask(size);
    match op {
        BinOp::Xor => {
            if lv == Some(0) {
                return Some(r);
            }
            if rv == Some(0) {
                return Some(l);
            }
            if body.structural_eq(l, r) {
                return Some(body.val(0, size));
            }
            if rv == Some(ones) {
                return Some(body.unary(UnOp::Not, l));
            }
            if lv == Some(ones) {
                return Some(body.unary(UnOp::Not, r));
            }
        }
        BinOp::And => {
            if body.structural_eq(l, r) {
                return Some(l);
            }
            if lv == Some(0) || rv == Some(0) {
                return Some(body.val(0, size));
            }
            if rv == Some(ones) {
                return Some(l);
            }
            if lv == Some(ones) {
                return Some(r);
            }
        }
        BinOp::Or => {
            if body.structural_eq(l, r) {
                return Some(l);
            }
            if rv == Some(0) {
                return Some(l);
            }
            if lv == Some(0) {
                return Some(r);
            }
            if rv == Some(ones) || lv == Some(ones) {
                return Some(body.val(ones, size));
            }
        }
        BinOp::Shl => {
            if lv == Some(0) {
                return Some(body.val(0, size));
            }
            if rv == Some(0) {
                return Some(l);
            }
            // (x >> c) << c masks the low bits away.
            if let ExprKind::Binary(BinOp::Shr, x, shr_amount) = body.expr(l).kind {
                if let (Some(c0), Some(c1)) = (rv, as_val(body, shr_amount)) {
                    if c0 == c1 && c0 < 64 {
                        let keep = !((1u64 << c0) - 1) & size_mask(size);
                        let mask = body.val(keep, size);
                        return Some(body.binary(BinOp::And, x, mask));
                    }
                }
            }
        }
        BinOp::Shr => {
            if rv == Some(0) {
                return Some(l);
            }
            if lv == Some(0) {
                return Some(body.val(0, size));
            }
        }
        _ => {}
    }

    // Associative reassociation: ((x op c1) op c0) -> (x op (c1 op c0)).
    if op.is_associative() && rv.is_some() {
        if let ExprKind::Binary(inner, x, c1) = body.expr(l).kind {
            if inner == op && as_val(body, x).is_none() {
                if let Some(c1v) = as_val(body, c1) {
                    if let Some(folded) = fold_binary(op, c1v, rv.unwrap(), size) {
                        let c = body.val(folded, size);
                        return Some(body.binary(op, x, c));
                    }
                }
            }
        }
    }

    // Arithmetic reassociation: (x ± c1) ± c0 -> x ± combined.
    if matches!(op, BinOp::Add | BinOp::Sub) {
        if let Some(c0) = rv {
            if let ExprKind::Binary(inner, x, c1) = body.expr(l).kind {
                if matches!(inner, BinOp::Add | BinOp::Sub)
                    && !(op == BinOp::Add && inner == BinOp::Add)
                    && as_val(body, x).is_none()
                {
                    if let Some(c1v) = as_val(body, c1) {
                        let s1 = if inner == BinOp::Add {
                            sign_extend(c1v, size)
                        } else {
                            -sign_extend(c1v, size)
                        };
                        let s0 = if op == BinOp::Add {
                            sign_extend(c0, size)
                        } else {
                            -sign_extend(c0, size)
                        };
                        let combined = s1.wrapping_add(s0);
                        if combined == 0 {
                            return Some(x);
                        }
                        let (new_op, magnitude) = if combined < 0 {
                            (BinOp::Sub, combined.wrapping_neg() as u64)
                        } else {
                            (BinOp::Add, combined as u64)
                        };
                        let c = body.val(magnitude, size);
                        return Some(body.binary(new_op, x, c));
                    }
                }
            }
        }
    }

    // Equality algebra.
    if op.is_comparison() {
        if let Some(c2) = rv {
            if let ExprKind::Binary(inner, x, c1) = body.expr(l).kind {
                if matches!(inner, BinOp::Add | BinOp::Sub) {
                    if let Some(c1v) = as_val(body, c1) {
                        // (x ± c1) ⋈ c2  ->  x ⋈ (c2 ∓ c1)
                        let undo = if inner == BinOp::Add {
                            BinOp::Sub
                        } else {
                            BinOp::Add
                        };
                        if let Some(folded) = fold_binary(undo, c2, c1v, size) {
                            let c = body.val(folded, size);
                            return Some(body.binary(op, x, c));
                        }
                    }
                }
            }
        }
        if op == BinOp::Eq && rv == Some(0) {
            if let ExprKind::Binary(BinOp::Sub, x, y) = body.expr(l).kind {
                return Some(body.binary(BinOp::Eq, x, y));
            }
            if let ExprKind::Binary(BinOp::Add, x, y) = body.expr(l).kind {
                if as_val(body, y).is_none() {
                    let neg = body.unary(UnOp::Neg, y);
                    return Some(body.binary(BinOp::Eq, x, neg));
                }
            }
        }
    }

    // Converged relational algebra over the 3-bit rank lattice.
    if opts.converge {
        if let Some(combined) = converged_rank(body, op, l, r) {
            let (cl, cr) = match body.expr(l).kind {
                ExprKind::Binary(_, cl, cr) => (cl, cr),
                _ => unreachable!(),
            };
            return Some(match comparison_from_rank(combined) {
                RankOutcome::AlwaysFalse => body.val(0, size),
                RankOutcome::AlwaysTrue => body.val(1, size),
                RankOutcome::Cmp(cmp) => body.binary(cmp, cl, cr),
            });
        }
    }

    None
}

/// Combined rank for `(x ⋈₁ y) op (x ⋈₂ y)` when both sides compare the
/// same operand pair.
fn converged_rank(body: &Body, op: BinOp, l: ExprId, r: ExprId) -> Option<u8> {
    let (lop, ll, lr) = match body.expr(l).kind {
        ExprKind::Binary(o, a, b) => (o, a, b),
        _ => return None,
    };
    let (rop, rl, rr) = match body.expr(r).kind {
        ExprKind::Binary(o, a, b) => (o, a, b),
        _ => return None,
    };
    let rank_l = lop.rank()?;
    let rank_r = rop.rank()?;
    if !body.structural_eq(ll, rl) || !body.structural_eq(lr, rr) {
        return None;
    }
    Some(match op {
        BinOp::Or | BinOp::BoolOr => rank_l | rank_r,
        BinOp::And | BinOp::BoolAnd => rank_l & rank_r,
        BinOp::Eq => !(rank_l ^ rank_r) & 0b111,
        _ => return None,
    })
}

fn unary(body: &mut Body, id: ExprId, opts: &ReduceOpts) -> Option<ExprId> {
    // Ref/deref cancellation.
    match body.expr(id).kind {
        ExprKind::AddrOf(inner) => {
            if let ExprKind::Deref(x) = body.expr(inner).kind {
                return Some(x);
            }
            return None;
        }
        ExprKind::Deref(inner) => {
            if let ExprKind::AddrOf(x) = body.expr(inner).kind {
                return Some(x);
            }
            return None;
        }
        _ => {}
    }

    let (op, a) = match body.expr(id).kind {
        ExprKind::Unary(op, a) => (op, a),
        _ => return None,
    };
    let size = body.expr(id).size;

    if let Some(v) = as_val(body, a) {
        let m = size_mask(size);
        let folded = match op {
            UnOp::Neg => v.wrapping_neg() & m,
            UnOp::Not => !v & m,
            UnOp::BoolNot => u64::from(v == 0),
        };
        return Some(body.val(folded, size));
    }

    if op == UnOp::BoolNot {
        match body.expr(a).kind {
            // Double negation.
            ExprKind::Unary(UnOp::BoolNot, x) => return Some(x),
            // deMorgan: push the negation inward.
            ExprKind::Binary(BinOp::BoolAnd, x, y) => {
                let nx = body.unary(UnOp::BoolNot, x);
                let ny = body.unary(UnOp::BoolNot, y);
                return Some(body.binary(BinOp::BoolOr, nx, ny));
            }
            ExprKind::Binary(BinOp::BoolOr, x, y) => {
                let nx = body.unary(UnOp::BoolNot, x);
                let ny = body.unary(UnOp::BoolNot, y);
                return Some(body.binary(BinOp::BoolAnd, nx, ny));
            }
            // !(x + y) holds exactly when x == -y; !(x - y) when x == y.
            ExprKind::Binary(BinOp::Add, x, y) => {
                let ny = body.unary(UnOp::Neg, y);
                return Some(body.binary(BinOp::Eq, x, ny));
            }
            ExprKind::Binary(BinOp::Sub, x, y) => {
                return Some(body.binary(BinOp::Eq, x, y));
            }
            // Negating a relation complements its rank.
            ExprKind::Binary(cmp, x, y) if opts.converge && cmp.rank().is_some() => {
                let flipped = cmp.rank().unwrap() ^ 0b111;
                return Some(match comparison_from_rank(flipped) {
                    RankOutcome::AlwaysFalse => body.val(0, size),
                    RankOutcome::AlwaysTrue => body.val(1, size),
                    RankOutcome::Cmp(c) => body.binary(c, x, y),
                });
            }
            _ => {}
        }
    }

    None
}

fn ternary(body: &mut Body, id: ExprId) -> Option<ExprId> {
    let (c, t, f) = match body.expr(id).kind {
        ExprKind::TCond(c, t, f) => (c, t, f),
        _ => return None,
    };
    match as_val(body, c) {
        Some(0) => Some(f),
        Some(_) => Some(t),
        None => None,
    }
}
