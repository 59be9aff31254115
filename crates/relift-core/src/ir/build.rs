//! Programmatic construction of IR functions.
//!
//! Front-end lifters and tests assemble functions through this builder; it
//! keeps block/edge wiring and statement placement in one place so the IR
//! invariants hold from the start.

use super::body::Body;
use super::expr::{ExprId, StmtId};
use super::function::{BasicBlock, BlockId, Function};
use super::stmt::StmtKind;

/// Builder for a [`Function`].
///
/// Blocks are created in order; the first one becomes the entry unless
/// overridden. Edges are wired by block id after creation.
pub struct FunctionBuilder {
    func: Function,
}

impl FunctionBuilder {
    pub fn new(addr: u64, name: &str) -> Self {
        FunctionBuilder {
            func: Function::new(addr, name),
        }
    }

    /// Expression arena access for building statement operands.
    pub fn body(&mut self) -> &mut Body {
        &mut self.func.body
    }

    /// Appends a new empty block starting at `addr`.
    pub fn add_block(&mut self, addr: u64) -> BlockId {
        let id = BlockId(self.func.blocks.len() as u32);
        let container = self.func.body.alloc_container(addr);
        self.func.blocks.push(BasicBlock {
            id,
            addr,
            container,
            jump: None,
            fail: None,
            cases: Vec::new(),
            is_entry: id == BlockId(0),
            is_exit: false,
        });
        id
    }

    pub fn set_entry(&mut self, block: BlockId) {
        for b in &mut self.func.blocks {
            b.is_entry = b.id == block;
        }
        self.func.entry = block;
    }

    pub fn mark_exit(&mut self, block: BlockId) {
        self.func.block_mut(block).is_exit = true;
    }

    pub fn jump(&mut self, from: BlockId, to: BlockId) {
        self.func.block_mut(from).jump = Some(to);
    }

    pub fn fail(&mut self, from: BlockId, to: BlockId) {
        self.func.block_mut(from).fail = Some(to);
    }

    pub fn case(&mut self, from: BlockId, to: BlockId) {
        self.func.block_mut(from).cases.push(to);
    }

    /// `lhs = rhs` appended to the block.
    pub fn assign(&mut self, block: BlockId, addr: u64, lhs: ExprId, rhs: ExprId) -> StmtId {
        let asg = self.func.body.assign(lhs, rhs);
        self.stmt(block, addr, StmtKind::Expr, vec![asg])
    }

    /// Plain expression statement.
    pub fn expr_stmt(&mut self, block: BlockId, addr: u64, expr: ExprId) -> StmtId {
        self.stmt(block, addr, StmtKind::Expr, vec![expr])
    }

    /// Return statement; marks the block as an exit.
    pub fn ret(&mut self, block: BlockId, addr: u64, value: Option<ExprId>) -> StmtId {
        self.func.block_mut(block).is_exit = true;
        let exprs = value.into_iter().collect();
        self.stmt(block, addr, StmtKind::Return, exprs)
    }

    /// Conditional branch on `cond`; targets come from the block's
    /// `jump`/`fail` edges.
    pub fn branch(&mut self, block: BlockId, addr: u64, cond: ExprId) -> StmtId {
        self.stmt(block, addr, StmtKind::Branch, vec![cond])
    }

    /// Unconditional jump; the target comes from the block's `jump` edge.
    pub fn goto(&mut self, block: BlockId, addr: u64) -> StmtId {
        self.stmt(block, addr, StmtKind::Goto, vec![])
    }

    fn stmt(&mut self, block: BlockId, addr: u64, kind: StmtKind, exprs: Vec<ExprId>) -> StmtId {
        let container = self.func.block(block).container;
        let sid = self.func.body.alloc_stmt(addr, kind, exprs);
        self.func.body.push_stmt(container, sid);
        sid
    }

    pub fn finish(self) -> Function {
        self.func
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinOp;

    #[test]
    fn test_builder_wires_blocks() {
        let mut fb = FunctionBuilder::new(0x1000, "f");
        let b0 = fb.add_block(0x1000);
        let b1 = fb.add_block(0x1010);
        fb.jump(b0, b1);

        let lhs = fb.body().reg("eax", 32);
        let one = fb.body().val(1, 32);
        let two = fb.body().val(2, 32);
        let rhs = fb.body().binary(BinOp::Add, one, two);
        fb.assign(b0, 0x1000, lhs, rhs);
        let ret = fb.body().reg("eax", 32);
        fb.ret(b1, 0x1010, Some(ret));

        let func = fb.finish();
        assert_eq!(func.entry, b0);
        assert_eq!(func.block(b0).jump, Some(b1));
        assert_eq!(func.exit_blocks(), vec![b1]);
        assert!(func.body.expr(lhs).is_def());
        assert_eq!(func.body.container(func.block(b0).container).len(), 1);
    }
}
