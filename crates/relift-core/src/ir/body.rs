//! Per-function IR storage and structural mutation.
//!
//! All expressions, statements and containers of one function live in a
//! [`Body`]: index-addressed arenas with stable ids. Every structural edit
//! (`replace`, `pluck_stmt`, cloning) goes through here so the three
//! bidirectional links — parent pointer, a definition's `uses` list and a
//! user's `def` pointer — are updated together.
//!
//! Nodes are never physically freed; a detached node simply becomes
//! unreachable and is dropped with the function.

use rustc_hash::FxHashSet;

use super::expr::{
    size_mask, ContainerId, Expr, ExprFlags, ExprId, ExprKind, Parent, StmtId, UnOp,
};
use super::stmt::{Container, Stmt, StmtKind};
use crate::ir::BinOp;

/// Which per-node attributes survive [`Body::clone_expr`]; everything else
/// (uses, parent, `IS_DEF`, `PRUNE`) is reset on the copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClonePreserve {
    pub idx: bool,
    pub def: bool,
    pub safe: bool,
    pub weak: bool,
}

impl ClonePreserve {
    /// Plain structural copy.
    pub const NONE: ClonePreserve = ClonePreserve {
        idx: false,
        def: false,
        safe: false,
        weak: false,
    };

    /// Copy that stays wired into SSA: subscripts kept, operand uses
    /// re-registered on their definitions.
    pub const SSA: ClonePreserve = ClonePreserve {
        idx: true,
        def: true,
        safe: true,
        weak: true,
    };
}

/// Arena storage for one function's IR.
#[derive(Debug, Default)]
pub struct Body {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    containers: Vec<Container>,
    /// `(old, new)` pairs recorded when `replace` moved a definition's
    /// identity to another node; SSA bookkeeping drains this to re-point
    /// its name table.
    def_moves: Vec<(ExprId, ExprId)>,
}

impl Body {
    pub fn new() -> Self {
        Body::default()
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    pub fn container(&self, id: ContainerId) -> &Container {
        &self.containers[id.index()]
    }

    pub fn container_mut(&mut self, id: ContainerId) -> &mut Container {
        &mut self.containers[id.index()]
    }

    pub fn take_def_moves(&mut self) -> Vec<(ExprId, ExprId)> {
        std::mem::take(&mut self.def_moves)
    }

    // ---- allocation -----------------------------------------------------

    /// Allocates an expression node and claims its operands as children.
    pub fn alloc(&mut self, kind: ExprKind, size: u16) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        let mut ops = Vec::new();
        kind.operands_into(&mut ops);
        self.exprs.push(Expr::new(kind, size));
        for op in ops {
            self.exprs[op.index()].parent = Some(Parent::Expr(id));
        }
        id
    }

    /// Integer constant masked to the width.
    pub fn val(&mut self, value: u64, size: u16) -> ExprId {
        self.alloc(ExprKind::Val(value & size_mask(size)), size)
    }

    pub fn reg(&mut self, name: &str, size: u16) -> ExprId {
        self.alloc(ExprKind::Reg(name.to_string()), size)
    }

    pub fn var(&mut self, name: &str, size: u16) -> ExprId {
        self.alloc(ExprKind::Var(name.to_string()), size)
    }

    pub fn deref(&mut self, addr: ExprId, size: u16) -> ExprId {
        self.alloc(ExprKind::Deref(addr), size)
    }

    pub fn addr_of(&mut self, inner: ExprId) -> ExprId {
        let size = self.expr(inner).size;
        self.alloc(ExprKind::AddrOf(inner), size)
    }

    pub fn unary(&mut self, op: UnOp, a: ExprId) -> ExprId {
        let size = self.expr(a).size;
        self.alloc(ExprKind::Unary(op, a), size)
    }

    pub fn binary(&mut self, op: BinOp, l: ExprId, r: ExprId) -> ExprId {
        let size = self.expr(l).size.max(self.expr(r).size);
        self.alloc(ExprKind::Binary(op, l, r), size)
    }

    pub fn tcond(&mut self, c: ExprId, t: ExprId, f: ExprId) -> ExprId {
        let size = self.expr(t).size;
        self.alloc(ExprKind::TCond(c, t, f), size)
    }

    pub fn call(&mut self, callee: ExprId, args: Vec<ExprId>, size: u16) -> ExprId {
        self.alloc(ExprKind::Call(callee, args), size)
    }

    /// `lhs = rhs`; marks the lhs as a definition.
    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        let size = self.expr(lhs).size;
        let id = self.alloc(ExprKind::Assign(lhs, rhs), size);
        self.exprs[lhs.index()].flags |= ExprFlags::IS_DEF;
        id
    }

    pub fn alloc_container(&mut self, addr: u64) -> ContainerId {
        let id = ContainerId(self.containers.len() as u32);
        self.containers.push(Container::new(addr));
        id
    }

    /// Allocates a statement and claims its top-level expressions.
    pub fn alloc_stmt(&mut self, addr: u64, kind: StmtKind, exprs: Vec<ExprId>) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        for &e in &exprs {
            self.exprs[e.index()].parent = Some(Parent::Stmt(id));
        }
        self.stmts.push(Stmt::new(addr, kind, exprs));
        id
    }

    pub fn push_stmt(&mut self, container: ContainerId, stmt: StmtId) {
        self.stmts[stmt.index()].parent = Some(container);
        self.containers[container.index()].stmts.push(stmt);
    }

    pub fn insert_stmt_at(&mut self, container: ContainerId, pos: usize, stmt: StmtId) {
        self.stmts[stmt.index()].parent = Some(container);
        self.containers[container.index()].stmts.insert(pos, stmt);
    }

    pub fn stmt_position(&self, container: ContainerId, stmt: StmtId) -> Option<usize> {
        self.containers[container.index()]
            .stmts
            .iter()
            .position(|&s| s == stmt)
    }

    // ---- traversal ------------------------------------------------------

    pub fn operands(&self, id: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        self.exprs[id.index()].kind.operands_into(&mut out);
        out
    }

    /// Every node of the subtree rooted at `root`, root included, preorder.
    pub fn subtree(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            out.push(n);
            let before = stack.len();
            self.exprs[n.index()].kind.operands_into(&mut stack);
            stack[before..].reverse();
        }
        out
    }

    /// The statement an expression ultimately hangs from, if attached.
    pub fn stmt_of(&self, id: ExprId) -> Option<StmtId> {
        let mut cur = id;
        loop {
            match self.exprs[cur.index()].parent {
                Some(Parent::Expr(p)) => cur = p,
                Some(Parent::Stmt(s)) => return Some(s),
                None => return None,
            }
        }
    }

    /// For an attached definition, the value expression assigned to it.
    pub fn def_value(&self, def: ExprId) -> Option<ExprId> {
        match self.exprs[def.index()].parent {
            Some(Parent::Expr(p)) => match self.exprs[p.index()].kind {
                ExprKind::Assign(l, r) if l == def => Some(r),
                _ => None,
            },
            _ => None,
        }
    }

    /// The assignment expression a definition is the lhs of.
    pub fn def_assign(&self, def: ExprId) -> Option<ExprId> {
        match self.exprs[def.index()].parent {
            Some(Parent::Expr(p)) => match self.exprs[p.index()].kind {
                ExprKind::Assign(l, _) if l == def => Some(p),
                _ => None,
            },
            _ => None,
        }
    }

    /// `(lhs, rhs)` when the statement is a single assignment.
    pub fn as_assign_stmt(&self, stmt: StmtId) -> Option<(ExprId, ExprId)> {
        let s = self.stmt(stmt);
        if s.exprs.len() != 1 {
            return None;
        }
        match self.exprs[s.exprs[0].index()].kind {
            ExprKind::Assign(l, r) => Some((l, r)),
            _ => None,
        }
    }

    /// `(lhs, phi)` when the statement assigns a phi.
    pub fn as_phi_stmt(&self, stmt: StmtId) -> Option<(ExprId, ExprId)> {
        let (l, r) = self.as_assign_stmt(stmt)?;
        if self.exprs[r.index()].kind.is_phi() {
            Some((l, r))
        } else {
            None
        }
    }

    // ---- def-use maintenance -------------------------------------------

    /// Registers `user` as a reader of `def`.
    pub fn link_use(&mut self, user: ExprId, def: ExprId) {
        self.exprs[user.index()].def = Some(def);
        self.exprs[def.index()].uses.push(user);
    }

    /// Removes `user` from its definition's readers and clears its `def`.
    pub fn unlink_use(&mut self, user: ExprId) {
        if let Some(def) = self.exprs[user.index()].def.take() {
            let uses = &mut self.exprs[def.index()].uses;
            if let Some(pos) = uses.iter().position(|&u| u == user) {
                uses.remove(pos);
            }
        }
    }

    /// Unlinks every use link inside the subtree rooted at `root`.
    pub fn detach_subtree_uses(&mut self, root: ExprId) {
        for n in self.subtree(root) {
            if self.exprs[n.index()].def.is_some() {
                self.unlink_use(n);
            }
        }
    }

    // ---- structural edits ----------------------------------------------

    /// Splices `new` into `old`'s parent slot and detaches `old`.
    ///
    /// Operands of `old` that are reused under `new` keep their links; the
    /// discarded remainder of `old`'s subtree has its use links detached.
    /// When `old` is a definition its identity (uses list, `IS_DEF`,
    /// subscript) moves onto `new` and the move is journaled for SSA
    /// bookkeeping.
    pub fn replace(&mut self, old: ExprId, new: ExprId) {
        if old == new {
            return;
        }
        let parent = self.exprs[old.index()].parent.take();
        match parent {
            Some(Parent::Expr(p)) => {
                self.exprs[p.index()].kind.replace_operand(old, new);
            }
            Some(Parent::Stmt(s)) => {
                for slot in self.stmts[s.index()].exprs.iter_mut() {
                    if *slot == old {
                        *slot = new;
                        break;
                    }
                }
            }
            None => {}
        }
        self.exprs[new.index()].parent = parent;

        if self.exprs[old.index()].is_def() {
            let uses = std::mem::take(&mut self.exprs[old.index()].uses);
            for &u in &uses {
                self.exprs[u.index()].def = Some(new);
            }
            let idx = self.exprs[old.index()].idx;
            self.exprs[old.index()].flags.remove(ExprFlags::IS_DEF);
            let e = &mut self.exprs[new.index()];
            e.uses = uses;
            e.flags |= ExprFlags::IS_DEF;
            if e.idx.is_none() {
                e.idx = idx;
            }
            self.def_moves.push((old, new));
        }

        let kept: FxHashSet<ExprId> = self.subtree(new).into_iter().collect();
        let mut stack = vec![old];
        while let Some(n) = stack.pop() {
            if kept.contains(&n) {
                continue;
            }
            if self.exprs[n.index()].def.is_some() {
                self.unlink_use(n);
            }
            self.exprs[n.index()].kind.operands_into(&mut stack);
        }
    }

    /// Removes an expression from its parent slot, where the slot can be
    /// vacated: a statement's top-level list or a variadic argument list
    /// (phi, call, intrinsic). Fixed-arity operand slots cannot be left
    /// empty; use [`Body::replace`] there instead.
    ///
    /// With `detach_uses`, use links inside the subtree are dropped first.
    /// Returns whether the expression was removed.
    pub fn pluck(&mut self, e: ExprId, detach_uses: bool) -> bool {
        if detach_uses {
            self.detach_subtree_uses(e);
        }
        match self.exprs[e.index()].parent {
            Some(Parent::Stmt(s)) => {
                let exprs = &mut self.stmts[s.index()].exprs;
                if let Some(pos) = exprs.iter().position(|&x| x == e) {
                    exprs.remove(pos);
                }
                self.exprs[e.index()].parent = None;
                true
            }
            Some(Parent::Expr(p)) => {
                let removed = match &mut self.exprs[p.index()].kind {
                    ExprKind::Phi(args) | ExprKind::Intrinsic(_, args) => {
                        match args.iter().position(|&x| x == e) {
                            Some(pos) => {
                                args.remove(pos);
                                true
                            }
                            None => false,
                        }
                    }
                    ExprKind::Call(_, args) => match args.iter().position(|&x| x == e) {
                        Some(pos) => {
                            args.remove(pos);
                            true
                        }
                        None => false,
                    },
                    _ => false,
                };
                if removed {
                    self.exprs[e.index()].parent = None;
                }
                removed
            }
            None => false,
        }
    }

    /// Removes a statement from its container.
    ///
    /// With `detach_uses`, every use link inside the statement's expressions
    /// is removed from its definition first.
    pub fn pluck_stmt(&mut self, stmt: StmtId, detach_uses: bool) {
        if detach_uses {
            for e in self.stmts[stmt.index()].exprs.clone() {
                self.detach_subtree_uses(e);
            }
        }
        if let Some(container) = self.stmts[stmt.index()].parent.take() {
            let stmts = &mut self.containers[container.index()].stmts;
            if let Some(pos) = stmts.iter().position(|&s| s == stmt) {
                stmts.remove(pos);
            }
        }
    }

    /// Deep copy of a subtree. `preserve` selects which per-node attributes
    /// survive; a preserved `def` re-registers the copy on the definition.
    pub fn clone_expr(&mut self, id: ExprId, preserve: ClonePreserve) -> ExprId {
        let kind = self.exprs[id.index()].kind.clone();
        let new_kind = match kind {
            ExprKind::Val(v) => ExprKind::Val(v),
            ExprKind::Reg(n) => ExprKind::Reg(n),
            ExprKind::Var(n) => ExprKind::Var(n),
            ExprKind::Deref(a) => ExprKind::Deref(self.clone_expr(a, preserve)),
            ExprKind::AddrOf(a) => ExprKind::AddrOf(self.clone_expr(a, preserve)),
            ExprKind::Phi(args) => ExprKind::Phi(
                args.into_iter()
                    .map(|a| self.clone_expr(a, preserve))
                    .collect(),
            ),
            ExprKind::Unary(op, a) => ExprKind::Unary(op, self.clone_expr(a, preserve)),
            ExprKind::Binary(op, l, r) => {
                let l = self.clone_expr(l, preserve);
                let r = self.clone_expr(r, preserve);
                ExprKind::Binary(op, l, r)
            }
            ExprKind::TCond(c, t, f) => {
                let c = self.clone_expr(c, preserve);
                let t = self.clone_expr(t, preserve);
                let f = self.clone_expr(f, preserve);
                ExprKind::TCond(c, t, f)
            }
            ExprKind::Call(callee, args) => {
                let callee = self.clone_expr(callee, preserve);
                let args = args
                    .into_iter()
                    .map(|a| self.clone_expr(a, preserve))
                    .collect();
                ExprKind::Call(callee, args)
            }
            ExprKind::Intrinsic(n, args) => ExprKind::Intrinsic(
                n,
                args.into_iter()
                    .map(|a| self.clone_expr(a, preserve))
                    .collect(),
            ),
            ExprKind::Assign(l, r) => {
                let l = self.clone_expr(l, preserve);
                let r = self.clone_expr(r, preserve);
                ExprKind::Assign(l, r)
            }
        };
        let src = &self.exprs[id.index()];
        let size = src.size;
        let idx = src.idx;
        let def = src.def;
        let flags = src.flags;
        let new = self.alloc(new_kind, size);
        if preserve.idx {
            self.exprs[new.index()].idx = idx;
        }
        if preserve.safe && flags.contains(ExprFlags::SAFE) {
            self.exprs[new.index()].flags |= ExprFlags::SAFE;
        }
        if preserve.weak && flags.contains(ExprFlags::WEAK) {
            self.exprs[new.index()].flags |= ExprFlags::WEAK;
        }
        if preserve.def {
            if let Some(d) = def {
                self.link_use(new, d);
            }
        }
        new
    }

    // ---- naming and display ---------------------------------------------

    /// The unsubscripted location name of a `Reg`, `Var` or `Deref` node.
    ///
    /// Deref names embed the rendered address (including the address
    /// operands' own subscripts), so two derefs name the same location
    /// exactly when their addresses render identically.
    pub fn base_name(&self, id: ExprId) -> Option<String> {
        match &self.exprs[id.index()].kind {
            ExprKind::Reg(n) | ExprKind::Var(n) => Some(n.clone()),
            ExprKind::Deref(a) => Some(format!("*({})", self.display(*a))),
            _ => None,
        }
    }

    /// Renders an expression as text (used for location keys, diagnostics
    /// and test assertions).
    pub fn display(&self, id: ExprId) -> String {
        let mut out = String::new();
        self.fmt_expr(id, &mut out);
        out
    }

    fn fmt_expr(&self, id: ExprId, out: &mut String) {
        use std::fmt::Write;
        let e = &self.exprs[id.index()];
        match &e.kind {
            ExprKind::Val(v) => {
                if *v > 9 {
                    let _ = write!(out, "0x{v:x}");
                } else {
                    let _ = write!(out, "{v}");
                }
            }
            ExprKind::Reg(n) | ExprKind::Var(n) => {
                out.push_str(n);
                if let Some(idx) = e.idx {
                    let _ = write!(out, "_{idx}");
                }
            }
            ExprKind::Deref(a) => {
                out.push_str("*(");
                self.fmt_expr(*a, out);
                out.push(')');
                if let Some(idx) = e.idx {
                    let _ = write!(out, "_{idx}");
                }
            }
            ExprKind::AddrOf(a) => {
                out.push_str("&(");
                self.fmt_expr(*a, out);
                out.push(')');
            }
            ExprKind::Phi(args) => {
                out.push_str("Phi(");
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.fmt_expr(*a, out);
                }
                out.push(')');
            }
            ExprKind::Unary(op, a) => {
                out.push_str(op.symbol());
                out.push('(');
                self.fmt_expr(*a, out);
                out.push(')');
            }
            ExprKind::Binary(op, l, r) => {
                out.push('(');
                self.fmt_expr(*l, out);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                self.fmt_expr(*r, out);
                out.push(')');
            }
            ExprKind::TCond(c, t, f) => {
                out.push('(');
                self.fmt_expr(*c, out);
                out.push_str(" ? ");
                self.fmt_expr(*t, out);
                out.push_str(" : ");
                self.fmt_expr(*f, out);
                out.push(')');
            }
            ExprKind::Call(callee, args) => {
                self.fmt_expr(*callee, out);
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.fmt_expr(*a, out);
                }
                out.push(')');
            }
            ExprKind::Intrinsic(n, args) => {
                out.push_str(n);
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.fmt_expr(*a, out);
                }
                out.push(')');
            }
            ExprKind::Assign(l, r) => {
                self.fmt_expr(*l, out);
                out.push_str(" = ");
                self.fmt_expr(*r, out);
            }
        }
    }

    /// Structural equality: kinds, operators, names, subscripts and constant
    /// values/widths, recursively. Parent, def and uses links are ignored.
    pub fn structural_eq(&self, a: ExprId, b: ExprId) -> bool {
        if a == b {
            return true;
        }
        let ea = &self.exprs[a.index()];
        let eb = &self.exprs[b.index()];
        match (&ea.kind, &eb.kind) {
            (ExprKind::Val(x), ExprKind::Val(y)) => x == y && ea.size == eb.size,
            (ExprKind::Reg(x), ExprKind::Reg(y)) | (ExprKind::Var(x), ExprKind::Var(y)) => {
                x == y && ea.idx == eb.idx
            }
            (ExprKind::Deref(x), ExprKind::Deref(y)) => {
                ea.idx == eb.idx && self.structural_eq(*x, *y)
            }
            (ExprKind::AddrOf(x), ExprKind::AddrOf(y)) => self.structural_eq(*x, *y),
            (ExprKind::Unary(o1, x), ExprKind::Unary(o2, y)) => {
                o1 == o2 && self.structural_eq(*x, *y)
            }
            (ExprKind::Binary(o1, l1, r1), ExprKind::Binary(o2, l2, r2)) => {
                o1 == o2 && self.structural_eq(*l1, *l2) && self.structural_eq(*r1, *r2)
            }
            (ExprKind::TCond(c1, t1, f1), ExprKind::TCond(c2, t2, f2)) => {
                self.structural_eq(*c1, *c2)
                    && self.structural_eq(*t1, *t2)
                    && self.structural_eq(*f1, *f2)
            }
            (ExprKind::Phi(x), ExprKind::Phi(y)) => {
                x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(&p, &q)| self.structural_eq(p, q))
            }
            (ExprKind::Call(c1, a1), ExprKind::Call(c2, a2)) => {
                self.structural_eq(*c1, *c2)
                    && a1.len() == a2.len()
                    && a1
                        .iter()
                        .zip(a2.iter())
                        .all(|(&p, &q)| self.structural_eq(p, q))
            }
            (ExprKind::Intrinsic(n1, a1), ExprKind::Intrinsic(n2, a2)) => {
                n1 == n2
                    && a1.len() == a2.len()
                    && a1
                        .iter()
                        .zip(a2.iter())
                        .all(|(&p, &q)| self.structural_eq(p, q))
            }
            (ExprKind::Assign(l1, r1), ExprKind::Assign(l2, r2)) => {
                self.structural_eq(*l1, *l2) && self.structural_eq(*r1, *r2)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_sets_parents() {
        let mut body = Body::new();
        let a = body.reg("eax", 32);
        let b = body.val(1, 32);
        let sum = body.binary(BinOp::Add, a, b);
        assert_eq!(body.expr(a).parent, Some(Parent::Expr(sum)));
        assert_eq!(body.expr(b).parent, Some(Parent::Expr(sum)));
        assert_eq!(body.expr(sum).parent, None);
    }

    #[test]
    fn test_replace_reuses_operand() {
        // (eax + 0) replaced by eax: eax takes the Add's parent slot.
        let mut body = Body::new();
        let a = body.reg("eax", 32);
        let z = body.val(0, 32);
        let sum = body.binary(BinOp::Add, a, z);
        let c = body.alloc_container(0);
        let s = body.alloc_stmt(0x1000, StmtKind::Expr, vec![sum]);
        body.push_stmt(c, s);

        body.replace(sum, a);
        assert_eq!(body.stmt(s).exprs, vec![a]);
        assert_eq!(body.expr(a).parent, Some(Parent::Stmt(s)));
        assert_eq!(body.expr(sum).parent, None);
    }

    #[test]
    fn test_replace_detaches_discarded_uses() {
        let mut body = Body::new();
        let def = body.reg("ebx", 32);
        let use1 = body.reg("ebx", 32);
        body.link_use(use1, def);
        let z = body.val(0, 32);
        let masked = body.binary(BinOp::And, use1, z);
        let c = body.alloc_container(0);
        let s = body.alloc_stmt(0, StmtKind::Expr, vec![masked]);
        body.push_stmt(c, s);

        // (ebx & 0) -> 0 discards the use of ebx.
        let zero = body.val(0, 32);
        body.replace(masked, zero);
        assert!(body.expr(def).uses.is_empty());
        assert_eq!(body.expr(use1).def, None);
    }

    #[test]
    fn test_def_identity_moves_on_replace() {
        let mut body = Body::new();
        let x = body.var("x", 32);
        let addr = body.addr_of(x);
        let lhs = body.deref(addr, 32);
        let rhs = body.val(7, 32);
        let asg = body.assign(lhs, rhs);
        let c = body.alloc_container(0);
        let s = body.alloc_stmt(0, StmtKind::Expr, vec![asg]);
        body.push_stmt(c, s);

        let user = body.deref(addr, 32); // stand-in reader
        body.link_use(user, lhs);

        // *(&x) = 7 simplifies the lhs to x; def identity must follow.
        body.replace(lhs, x);
        assert!(body.expr(x).is_def());
        assert_eq!(body.expr(user).def, Some(x));
        assert_eq!(body.take_def_moves(), vec![(lhs, x)]);
    }

    #[test]
    fn test_pluck_stmt_detaches() {
        let mut body = Body::new();
        let def = body.reg("eax", 32);
        let one = body.val(1, 32);
        let asg1 = body.assign(def, one);
        let c = body.alloc_container(0);
        let s1 = body.alloc_stmt(0, StmtKind::Expr, vec![asg1]);
        body.push_stmt(c, s1);

        let u = body.reg("eax", 32);
        body.link_use(u, def);
        let two = body.val(2, 32);
        let dst = body.reg("ebx", 32);
        let sum = body.binary(BinOp::Add, u, two);
        let asg2 = body.assign(dst, sum);
        let s2 = body.alloc_stmt(4, StmtKind::Expr, vec![asg2]);
        body.push_stmt(c, s2);

        body.pluck_stmt(s2, true);
        assert!(body.expr(def).uses.is_empty());
        assert_eq!(body.container(c).stmts, vec![s1]);
    }

    #[test]
    fn test_pluck_phi_argument() {
        let mut body = Body::new();
        let def = body.reg("eax", 32);
        body.expr_mut(def).flags |= ExprFlags::IS_DEF;
        let a1 = body.reg("eax", 32);
        body.link_use(a1, def);
        let a2 = body.reg("ebx", 32);
        let phi = body.alloc(ExprKind::Phi(vec![a1, a2]), 32);

        assert!(body.pluck(a1, true));
        match &body.expr(phi).kind {
            ExprKind::Phi(args) => assert_eq!(args, &vec![a2]),
            k => panic!("expected phi, got {k:?}"),
        }
        assert!(body.expr(def).uses.is_empty());
        // Fixed-arity slots refuse to vacate.
        let l = body.reg("eax", 32);
        let r = body.val(1, 32);
        let sum = body.binary(BinOp::Add, l, r);
        assert!(!body.pluck(l, false));
        assert_eq!(body.operands(sum), vec![l, r]);
    }

    #[test]
    fn test_clone_preserve_ssa() {
        let mut body = Body::new();
        let def = body.reg("eax", 32);
        body.expr_mut(def).idx = Some(1);
        body.expr_mut(def).flags |= ExprFlags::IS_DEF;
        let u = body.reg("eax", 32);
        body.expr_mut(u).idx = Some(1);
        body.link_use(u, def);

        let copy = body.clone_expr(u, ClonePreserve::SSA);
        assert_eq!(body.expr(copy).idx, Some(1));
        assert_eq!(body.expr(copy).def, Some(def));
        assert_eq!(body.expr(def).uses, vec![u, copy]);

        let bare = body.clone_expr(u, ClonePreserve::NONE);
        assert_eq!(body.expr(bare).idx, None);
        assert_eq!(body.expr(bare).def, None);
    }

    #[test]
    fn test_display_and_names() {
        let mut body = Body::new();
        let sp = body.reg("esp", 32);
        body.expr_mut(sp).idx = Some(0);
        let eight = body.val(8, 32);
        let addr = body.binary(BinOp::Sub, sp, eight);
        let slot = body.deref(addr, 32);
        assert_eq!(body.display(slot), "*((esp_0 - 8))");
        assert_eq!(body.base_name(slot).unwrap(), "*((esp_0 - 8))");
        assert_eq!(body.base_name(sp).unwrap(), "esp");
    }

    #[test]
    fn test_structural_eq() {
        let mut body = Body::new();
        let a1 = body.reg("eax", 32);
        let a2 = body.reg("eax", 32);
        let b = body.reg("ebx", 32);
        assert!(body.structural_eq(a1, a2));
        assert!(!body.structural_eq(a1, b));

        let v1 = body.val(5, 32);
        let v2 = body.val(5, 32);
        let v3 = body.val(5, 16);
        assert!(body.structural_eq(v1, v2));
        assert!(!body.structural_eq(v1, v3));
    }
}
