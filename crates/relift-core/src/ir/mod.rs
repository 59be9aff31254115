//! The IR model: expressions, statements, containers, blocks, functions.

mod body;
mod build;
mod expr;
mod function;
mod stmt;
pub mod verify;

pub use body::{Body, ClonePreserve};
pub use build::FunctionBuilder;
pub use expr::{
    comparison_from_rank, msb_set, sign_extend, size_mask, BinOp, ContainerId, Expr, ExprFlags,
    ExprId, ExprKind, Parent, RankOutcome, StmtId, UnOp,
};
pub use function::{ArchInfo, BasicBlock, BlockId, Function, Param, ParamLoc};
pub use stmt::{Container, Stmt, StmtKind};
