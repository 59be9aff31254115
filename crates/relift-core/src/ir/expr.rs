//! Expression nodes of the lifted IR.
//!
//! Expressions form algebraic trees stored in a per-function arena (see
//! [`Body`](super::Body)) and referenced by [`ExprId`]. Cross-links between a
//! definition and its readers (`def` / `uses`) are ids as well, so the whole
//! graph stays index-based and safely mutable in place.

use bitflags::bitflags;

/// Unique identifier of an expression within a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl ExprId {
    /// Index into the body's expression arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Unique identifier of a statement within a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

impl StmtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Unique identifier of a container (basic-block body) within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub u32);

impl ContainerId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Per-node attribute word.
    ///
    /// Every attribute the passes attach to an expression is a declared flag
    /// here rather than an ad-hoc field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExprFlags: u8 {
        /// The node is the left-hand side of an assignment.
        const IS_DEF = 1 << 0;
        /// Synthetic definition (phi variable or implicit initialization)
        /// that later passes may eliminate without conservative concern.
        const WEAK = 1 << 1;
        /// The location is known not to alias anything observable; stores
        /// through it may be dropped when dead.
        const SAFE = 1 << 2;
        /// Pruning has been explicitly requested for this definition.
        const PRUNE = 1 << 3;
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Not,
    /// Boolean (logical) negation.
    BoolNot,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "~",
            UnOp::BoolNot => "!",
        }
    }
}

/// Binary operators: arithmetic, bitwise, boolean and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    BoolAnd,
    BoolOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BoolAnd => "&&",
            BinOp::BoolOr => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    /// Operators for which `((x op c1) op c0)` may be reassociated to expose
    /// constant folding.
    pub fn is_associative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor
        )
    }

    /// True for the six relational operators.
    pub fn is_comparison(self) -> bool {
        self.rank().is_some()
    }

    /// 3-bit lattice rank of a comparison.
    ///
    /// The six relations form a lattice: `EQ=001, LT=010, LE=011, GT=100,
    /// GE=101, NE=110`, with `000` standing for always-false and `111` for
    /// always-true. Disjunction unions ranks, conjunction intersects them,
    /// and negation complements against `111`.
    pub fn rank(self) -> Option<u8> {
        Some(match self {
            BinOp::Eq => 0b001,
            BinOp::Lt => 0b010,
            BinOp::Le => 0b011,
            BinOp::Gt => 0b100,
            BinOp::Ge => 0b101,
            BinOp::Ne => 0b110,
            _ => return None,
        })
    }
}

/// Outcome of mapping a combined rank back to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOutcome {
    /// Rank `000`: the combined relation can never hold.
    AlwaysFalse,
    /// Rank `111`: the combined relation always holds.
    AlwaysTrue,
    /// One of the six relational operators.
    Cmp(BinOp),
}

/// Maps a 3-bit rank back to a comparison operator or a constant truth value.
pub fn comparison_from_rank(rank: u8) -> RankOutcome {
    match rank & 0b111 {
        0b000 => RankOutcome::AlwaysFalse,
        0b001 => RankOutcome::Cmp(BinOp::Eq),
        0b010 => RankOutcome::Cmp(BinOp::Lt),
        0b011 => RankOutcome::Cmp(BinOp::Le),
        0b100 => RankOutcome::Cmp(BinOp::Gt),
        0b101 => RankOutcome::Cmp(BinOp::Ge),
        0b110 => RankOutcome::Cmp(BinOp::Ne),
        _ => RankOutcome::AlwaysTrue,
    }
}

/// The closed set of expression variants.
///
/// Arity families are match-arm groupings (`is_unary`, `is_binary`), not
/// inheritance: every consumer matches exhaustively.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer constant, masked to the node's bit width.
    Val(u64),
    /// Named machine register.
    Reg(String),
    /// Named local variable.
    Var(String),
    /// Memory access through an address expression.
    Deref(ExprId),
    /// Address of the inner expression.
    AddrOf(ExprId),
    /// SSA join: one argument per CFG predecessor, in predecessor order.
    Phi(Vec<ExprId>),
    Unary(UnOp, ExprId),
    Binary(BinOp, ExprId, ExprId),
    /// `cond ? then : otherwise`.
    TCond(ExprId, ExprId, ExprId),
    /// Call through a callee expression with ordered arguments.
    Call(ExprId, Vec<ExprId>),
    /// Named architecture intrinsic.
    Intrinsic(String, Vec<ExprId>),
    /// `lhs = rhs`; the lhs carries [`ExprFlags::IS_DEF`].
    Assign(ExprId, ExprId),
}

impl ExprKind {
    /// Appends this node's operand ids, in order, to `out`.
    pub fn operands_into(&self, out: &mut Vec<ExprId>) {
        match self {
            ExprKind::Val(_) | ExprKind::Reg(_) | ExprKind::Var(_) => {}
            ExprKind::Deref(a) | ExprKind::AddrOf(a) | ExprKind::Unary(_, a) => out.push(*a),
            ExprKind::Binary(_, l, r) => {
                out.push(*l);
                out.push(*r);
            }
            ExprKind::TCond(c, t, f) => {
                out.push(*c);
                out.push(*t);
                out.push(*f);
            }
            ExprKind::Phi(args) => out.extend_from_slice(args),
            ExprKind::Call(callee, args) => {
                out.push(*callee);
                out.extend_from_slice(args);
            }
            ExprKind::Intrinsic(_, args) => out.extend_from_slice(args),
            ExprKind::Assign(l, r) => {
                out.push(*l);
                out.push(*r);
            }
        }
    }

    /// Replaces the first occurrence of operand `old` with `new`.
    /// Returns false when `old` is not an operand of this node.
    pub fn replace_operand(&mut self, old: ExprId, new: ExprId) -> bool {
        let slot = |v: &mut ExprId| {
            if *v == old {
                *v = new;
                true
            } else {
                false
            }
        };
        match self {
            ExprKind::Val(_) | ExprKind::Reg(_) | ExprKind::Var(_) => false,
            ExprKind::Deref(a) | ExprKind::AddrOf(a) | ExprKind::Unary(_, a) => slot(a),
            ExprKind::Binary(_, l, r) => slot(l) || slot(r),
            ExprKind::TCond(c, t, f) => slot(c) || slot(t) || slot(f),
            ExprKind::Phi(args) | ExprKind::Intrinsic(_, args) => {
                for a in args.iter_mut() {
                    if *a == old {
                        *a = new;
                        return true;
                    }
                }
                false
            }
            ExprKind::Call(callee, args) => {
                if slot(callee) {
                    return true;
                }
                for a in args.iter_mut() {
                    if *a == old {
                        *a = new;
                        return true;
                    }
                }
                false
            }
            ExprKind::Assign(l, r) => slot(l) || slot(r),
        }
    }

    /// True for `Reg`, `Var` and `Deref`: the kinds that can name a storage
    /// location and therefore participate in def-use chains.
    pub fn is_location(&self) -> bool {
        matches!(
            self,
            ExprKind::Reg(_) | ExprKind::Var(_) | ExprKind::Deref(_)
        )
    }

    pub fn is_val(&self) -> bool {
        matches!(self, ExprKind::Val(_))
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, ExprKind::Phi(_))
    }

    pub fn is_call(&self) -> bool {
        matches!(self, ExprKind::Call(_, _) | ExprKind::Intrinsic(_, _))
    }

    pub fn is_assign(&self) -> bool {
        matches!(self, ExprKind::Assign(_, _))
    }

    /// Single-operand family (including the ref/deref pair).
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            ExprKind::Unary(_, _) | ExprKind::Deref(_) | ExprKind::AddrOf(_)
        )
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ExprKind::Binary(_, _, _))
    }
}

/// Back-reference from an expression to its enclosing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// Operand of another expression.
    Expr(ExprId),
    /// Top-level expression of a statement.
    Stmt(StmtId),
}

/// A node in the expression arena.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// Bit width of the produced value.
    pub size: u16,
    /// SSA subscript; `None` before renaming and after `transform_out`.
    pub idx: Option<u32>,
    /// Definition site this use reads from. `None` on non-location nodes
    /// and on definitions themselves.
    pub def: Option<ExprId>,
    /// Reverse list of readers; populated only on definitions.
    pub uses: Vec<ExprId>,
    pub parent: Option<Parent>,
    pub flags: ExprFlags,
}

impl Expr {
    pub fn new(kind: ExprKind, size: u16) -> Self {
        Expr {
            kind,
            size,
            idx: None,
            def: None,
            uses: Vec::new(),
            parent: None,
            flags: ExprFlags::empty(),
        }
    }

    pub fn is_def(&self) -> bool {
        self.flags.contains(ExprFlags::IS_DEF)
    }

    pub fn is_weak(&self) -> bool {
        self.flags.contains(ExprFlags::WEAK)
    }

    pub fn is_safe(&self) -> bool {
        self.flags.contains(ExprFlags::SAFE)
    }
}

/// All-ones mask for a bit width (widths above 63 saturate to a full word).
pub fn size_mask(size: u16) -> u64 {
    if size == 0 || size >= 64 {
        u64::MAX
    } else {
        (1u64 << size) - 1
    }
}

/// Sign-extends a masked value of the given width into an `i64`.
pub fn sign_extend(value: u64, size: u16) -> i64 {
    if size == 0 || size >= 64 {
        value as i64
    } else {
        let shift = 64 - size as u32;
        ((value << shift) as i64) >> shift
    }
}

/// True when the value's most significant bit (for its width) is set.
pub fn msb_set(value: u64, size: u16) -> bool {
    let size = if size == 0 { 64 } else { size.min(64) };
    (value >> (size - 1)) & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_round_trip() {
        for op in [BinOp::Eq, BinOp::Lt, BinOp::Le, BinOp::Gt, BinOp::Ge, BinOp::Ne] {
            let rank = op.rank().unwrap();
            assert_eq!(comparison_from_rank(rank), RankOutcome::Cmp(op));
        }
        assert_eq!(comparison_from_rank(0), RankOutcome::AlwaysFalse);
        assert_eq!(comparison_from_rank(0b111), RankOutcome::AlwaysTrue);
    }

    #[test]
    fn test_rank_union_is_le() {
        let lt = BinOp::Lt.rank().unwrap();
        let eq = BinOp::Eq.rank().unwrap();
        assert_eq!(comparison_from_rank(lt | eq), RankOutcome::Cmp(BinOp::Le));
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xff, 8), -1);
        assert_eq!(sign_extend(0x7f, 8), 127);
        assert_eq!(sign_extend(0xffff_fffe, 32), -2);
    }

    #[test]
    fn test_msb() {
        assert!(msb_set(0x80, 8));
        assert!(!msb_set(0x7f, 8));
        assert!(msb_set(0x8000_0000, 32));
    }

    #[test]
    fn test_replace_operand() {
        let mut kind = ExprKind::Binary(BinOp::Add, ExprId(1), ExprId(2));
        assert!(kind.replace_operand(ExprId(2), ExprId(9)));
        let mut ops = Vec::new();
        kind.operands_into(&mut ops);
        assert_eq!(ops, vec![ExprId(1), ExprId(9)]);
        assert!(!kind.replace_operand(ExprId(5), ExprId(0)));
    }
}
