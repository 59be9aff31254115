//! Basic blocks and the per-function IR root.

use super::body::Body;
use super::expr::ContainerId;

/// Unique identifier for a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A basic block: entry address, body container and outgoing edges.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub addr: u64,
    pub container: ContainerId,
    /// Taken / unconditional successor.
    pub jump: Option<BlockId>,
    /// Fall-through / not-taken successor.
    pub fail: Option<BlockId>,
    /// Switch targets, in case order.
    pub cases: Vec<BlockId>,
    pub is_entry: bool,
    pub is_exit: bool,
}

impl BasicBlock {
    /// Outgoing edges in deterministic order: jump, fail, then cases.
    /// Phi argument order is derived from this via the predecessor lists.
    pub fn successors(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        if let Some(j) = self.jump {
            out.push(j);
        }
        if let Some(f) = self.fail {
            out.push(f);
        }
        out.extend_from_slice(&self.cases);
        out
    }
}

/// Where an argument or local lives on entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamLoc {
    Register(String),
    Stack { base: String, offset: i64 },
}

/// Argument / local-variable descriptor resolved from the front-end.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub size: u16,
    pub loc: ParamLoc,
    /// Front-end type hint, carried opaquely for the printer.
    pub type_hint: String,
}

/// Architecture knowledge the mid-end needs: which registers hold the stack
/// pointer, the frame base and the flags, so inter-wave propagation can
/// canonicalize addresses.
#[derive(Debug, Clone, Default)]
pub struct ArchInfo {
    pub name: String,
    pub sp_reg: String,
    pub bp_reg: String,
    pub flag_regs: Vec<String>,
}

/// One decompiled function: metadata, blocks and the IR arenas.
#[derive(Debug)]
pub struct Function {
    pub addr: u64,
    pub name: String,
    /// Return type hint from the front-end.
    pub return_type: String,
    pub args: Vec<Param>,
    pub locals: Vec<Param>,
    /// Blocks indexed by `BlockId`. Blocks are never removed; unreachable
    /// or merged-away blocks simply drop out of the graph.
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub body: Body,
    /// Synthetic container holding placeholder definitions for locations
    /// used before any definition exists.
    pub uninit: ContainerId,
    pub arch: Option<ArchInfo>,
}

impl Function {
    pub fn new(addr: u64, name: &str) -> Self {
        let mut body = Body::new();
        let uninit = body.alloc_container(addr);
        Function {
            addr,
            name: name.to_string(),
            return_type: String::new(),
            args: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
            entry: BlockId(0),
            body,
            uninit,
            arch: None,
        }
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks flagged as function exits.
    pub fn exit_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.is_exit)
            .map(|b| b.id)
            .collect()
    }

    /// Looks a block up by its entry address.
    pub fn block_at(&self, addr: u64) -> Option<BlockId> {
        self.blocks.iter().find(|b| b.addr == addr).map(|b| b.id)
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "fn {} @ {:#x}", self.name, self.addr)?;
        for block in &self.blocks {
            writeln!(f, "  {} @ {:#x}:", block.id, block.addr)?;
            for &s in &self.body.container(block.container).stmts {
                let stmt = self.body.stmt(s);
                for &e in &stmt.exprs {
                    writeln!(f, "    {}", self.body.display(e))?;
                }
                if stmt.exprs.is_empty() {
                    writeln!(f, "    <{:?}>", stmt.kind)?;
                }
            }
        }
        Ok(())
    }
}
