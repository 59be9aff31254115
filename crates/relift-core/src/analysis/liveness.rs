//! Live ranges and preserved-location analysis.
//!
//! Live ranges are collected by walking the graph backwards from each exit
//! block, memoized per block: a definition reaching a block pairs with the
//! earliest use of it inside that block's container (or none). Definitions
//! alive at a block's entry are the union of the predecessors' still-alive
//! definitions.
//!
//! A **preserved location** is one whose value at every function exit
//! traces back, through a chain of copy assignments, to the entry-state
//! (`idx = 0`) definition of the same name — a callee-saved register with
//! its save/restore pair. Such definitions are marked weak and prunable.

use rustc_hash::{FxHashMap, FxHashSet};

use super::digraph::Digraph;
use super::dominance::DominatorTree;
use crate::ir::{BlockId, ExprFlags, ExprId, ExprKind, Function, Parent};
use crate::ssa::{DefKey, SsaContext};

/// A definition reaching a block, with the earliest use of it inside the
/// block's container (`None` when the block never reads it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub def: ExprId,
    pub kill: Option<ExprId>,
}

/// Per-block live ranges for every block reachable backwards from an exit.
#[derive(Debug, Default)]
pub struct Liveness {
    pub ranges: FxHashMap<BlockId, Vec<LiveRange>>,
}

impl Liveness {
    pub fn compute(func: &Function, graph: &Digraph, ignore_weak: bool) -> Self {
        let mut analysis = LivenessBuilder {
            func,
            graph,
            ignore_weak,
            alive_out: FxHashMap::default(),
            visiting: FxHashSet::default(),
        };
        let mut ranges = FxHashMap::default();
        for exit in func.exit_blocks() {
            if graph.contains(exit) {
                analysis.walk(exit, &mut ranges);
            }
        }
        Liveness { ranges }
    }

    pub fn block(&self, id: BlockId) -> &[LiveRange] {
        self.ranges.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

struct LivenessBuilder<'a> {
    func: &'a Function,
    graph: &'a Digraph,
    ignore_weak: bool,
    /// Definitions alive at the end of each block, memoized.
    alive_out: FxHashMap<BlockId, Vec<ExprId>>,
    /// Cycle guard: a block re-entered while being computed contributes
    /// nothing on first touch (conservative at loop edges).
    visiting: FxHashSet<BlockId>,
}

impl LivenessBuilder<'_> {
    fn walk(&mut self, block: BlockId, ranges: &mut FxHashMap<BlockId, Vec<LiveRange>>) {
        self.alive_at_end(block);
        // The memoized walk touched every block on some path to `block`;
        // derive ranges for all of them.
        for (&b, alive) in self.alive_out.clone().iter() {
            ranges.entry(b).or_insert_with(|| {
                alive
                    .iter()
                    .map(|&def| LiveRange {
                        def,
                        kill: self.earliest_use_in(b, def),
                    })
                    .collect()
            });
        }
    }

    fn alive_at_end(&mut self, block: BlockId) -> Vec<ExprId> {
        if let Some(cached) = self.alive_out.get(&block) {
            return cached.clone();
        }
        if !self.visiting.insert(block) {
            return Vec::new();
        }

        let mut alive: Vec<ExprId> = Vec::new();
        let mut seen: FxHashSet<ExprId> = FxHashSet::default();
        let preds = self.graph.predecessors(block).to_vec();
        for pred in preds {
            for def in self.alive_at_end(pred) {
                if seen.insert(def) {
                    alive.push(def);
                }
            }
        }
        let container = self.func.block(block).container;
        for &sid in &self.func.body.container(container).stmts {
            if let Some((lhs, _)) = self.func.body.as_assign_stmt(sid) {
                if self.func.body.expr(lhs).is_def() && seen.insert(lhs) {
                    alive.push(lhs);
                }
            }
        }

        self.visiting.remove(&block);
        self.alive_out.insert(block, alive.clone());
        alive
    }

    /// The first use of `def` inside the block's container, in statement
    /// order. Weak uses (phi operands, weak assignments) are skipped when
    /// the analysis was asked to ignore them.
    fn earliest_use_in(&self, block: BlockId, def: ExprId) -> Option<ExprId> {
        let container = self.func.block(block).container;
        for &sid in &self.func.body.container(container).stmts {
            for &top in &self.func.body.stmt(sid).exprs {
                for n in self.func.body.subtree(top) {
                    if self.func.body.expr(n).def != Some(def) {
                        continue;
                    }
                    if self.ignore_weak && self.is_weak_use(sid, n) {
                        continue;
                    }
                    return Some(n);
                }
            }
        }
        None
    }

    fn is_weak_use(&self, stmt: crate::ir::StmtId, use_id: ExprId) -> bool {
        if let Some(Parent::Expr(p)) = self.func.body.expr(use_id).parent {
            if self.func.body.expr(p).kind.is_phi() {
                return true;
            }
        }
        if let Some((lhs, _)) = self.func.body.as_assign_stmt(stmt) {
            return self.func.body.expr(lhs).is_weak();
        }
        false
    }
}

/// Detects preserved locations and marks their save/restore chains weak,
/// safe and prunable. Returns the number of definitions marked.
pub fn preserve_locations(
    func: &mut Function,
    graph: &Digraph,
    dom: &DominatorTree,
    ctx: &mut SsaContext,
) -> usize {
    let entry_names: Vec<String> = ctx
        .defs
        .keys()
        .filter(|k| k.idx == 0)
        .map(|k| k.name.clone())
        .collect();

    let mut marked = 0usize;
    for name in entry_names {
        let Some(&zero_def) = ctx.defs.get(&DefKey::new(name.clone(), 0)) else {
            continue;
        };
        let mut chains: Vec<Vec<ExprId>> = Vec::new();
        let mut preserved = true;
        for exit in func.exit_blocks() {
            if !graph.contains(exit) {
                continue;
            }
            let Some(exit_def) = reaching_def(func, dom, exit, &name) else {
                // No definition on this exit path: the entry state flows
                // through untouched.
                continue;
            };
            match copy_chain(func, exit_def, zero_def) {
                Some(chain) => chains.push(chain),
                None => {
                    preserved = false;
                    break;
                }
            }
        }
        if !preserved || chains.is_empty() {
            continue;
        }
        for chain in &chains {
            for &def in chain {
                func.body.expr_mut(def).flags |=
                    ExprFlags::WEAK | ExprFlags::SAFE | ExprFlags::PRUNE;
                marked += 1;
            }
            if let (Some(&restore), Some(&save)) = (chain.first(), chain.last()) {
                ctx.preserved.push((save, restore));
            }
        }
        tracing::debug!(target: "relift::liveness", %name, "preserved location");
    }
    marked
}

/// The definition of `name` reaching the end of `block`: the last one in
/// the block itself, else the one reaching its immediate dominator (phi
/// placement guarantees this walk is exact in SSA form).
fn reaching_def(
    func: &Function,
    dom: &DominatorTree,
    block: BlockId,
    name: &str,
) -> Option<ExprId> {
    let mut b = block;
    loop {
        let container = func.block(b).container;
        for &sid in func.body.container(container).stmts.iter().rev() {
            if let Some((lhs, _)) = func.body.as_assign_stmt(sid) {
                if func.body.base_name(lhs).as_deref() == Some(name) {
                    return Some(lhs);
                }
            }
        }
        b = dom.immediate_dominator(b)?;
    }
}

/// Follows copy assignments from `from` back to `target`; each hop must be
/// a bare location read. Returns the definitions traversed, restore first.
fn copy_chain(func: &Function, from: ExprId, target: ExprId) -> Option<Vec<ExprId>> {
    let mut chain = Vec::new();
    let mut seen: FxHashSet<ExprId> = FxHashSet::default();
    let mut cur = from;
    loop {
        if cur == target {
            return Some(chain);
        }
        if !seen.insert(cur) {
            return None;
        }
        let rhs = func.body.def_value(cur)?;
        let e = func.body.expr(rhs);
        if !e.kind.is_location() {
            return None;
        }
        let next = e.def?;
        chain.push(cur);
        cur = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FunctionBuilder};
    use crate::ssa::{build_wave, RenameClass};

    /// Prologue saves rbx to a stack slot, epilogue restores it.
    fn save_restore_function() -> Function {
        let mut fb = FunctionBuilder::new(0, "sr");
        let blk = fb.add_block(0);

        // *(rsp - 8) = rbx
        let sp1 = fb.body().reg("rsp", 64);
        let eight1 = fb.body().val(8, 64);
        let addr1 = fb.body().binary(BinOp::Sub, sp1, eight1);
        let slot1 = fb.body().deref(addr1, 64);
        let rbx1 = fb.body().reg("rbx", 64);
        fb.assign(blk, 0x0, slot1, rbx1);

        // rbx = *(rsp - 8)
        let rbx2 = fb.body().reg("rbx", 64);
        let sp2 = fb.body().reg("rsp", 64);
        let eight2 = fb.body().val(8, 64);
        let addr2 = fb.body().binary(BinOp::Sub, sp2, eight2);
        let slot2 = fb.body().deref(addr2, 64);
        fb.assign(blk, 0x10, rbx2, slot2);

        fb.ret(blk, 0x20, None);
        fb.finish()
    }

    fn run_ssa(func: &mut Function) -> (Digraph, DominatorTree, SsaContext) {
        let graph = Digraph::from_function(func);
        let dom = DominatorTree::build(&graph);
        let mut ctx = SsaContext::new(func.uninit);
        build_wave(func, &graph, &dom, RenameClass::Registers, &mut ctx);
        build_wave(func, &graph, &dom, RenameClass::Memory, &mut ctx);
        (graph, dom, ctx)
    }

    #[test]
    fn test_save_restore_is_preserved() {
        let mut func = save_restore_function();
        let (graph, dom, mut ctx) = run_ssa(&mut func);

        let marked = preserve_locations(&mut func, &graph, &dom, &mut ctx);
        // The restore (rbx_1) and the slot store are both on the chain.
        assert_eq!(marked, 2);
        assert_eq!(ctx.preserved.len(), 1);
        let (save, restore) = ctx.preserved[0];
        assert!(matches!(func.body.expr(save).kind, ExprKind::Deref(_)));
        assert!(matches!(func.body.expr(restore).kind, ExprKind::Reg(_)));
        assert!(func.body.expr(restore).is_weak());
        assert!(func.body.expr(save).is_safe());
    }

    #[test]
    fn test_clobbered_register_not_preserved() {
        let mut fb = FunctionBuilder::new(0, "c");
        let blk = fb.add_block(0);
        let rbx = fb.body().reg("rbx", 64);
        let seven = fb.body().val(7, 64);
        fb.assign(blk, 0, rbx, seven);
        let u = fb.body().reg("rbx", 64);
        fb.ret(blk, 8, Some(u));
        let mut func = fb.finish();
        let (graph, dom, mut ctx) = run_ssa(&mut func);

        let marked = preserve_locations(&mut func, &graph, &dom, &mut ctx);
        assert_eq!(marked, 0);
        assert!(ctx.preserved.is_empty());
    }

    #[test]
    fn test_straightline_liveness_kill() {
        let mut fb = FunctionBuilder::new(0, "k");
        let blk = fb.add_block(0);
        let a = fb.body().reg("eax", 32);
        let one = fb.body().val(1, 32);
        fb.assign(blk, 0, a, one);
        let u = fb.body().reg("eax", 32);
        fb.ret(blk, 4, Some(u));
        let mut func = fb.finish();
        let (graph, _dom, _ctx) = run_ssa(&mut func);

        let live = Liveness::compute(&func, &graph, false);
        let ranges = live.block(blk);
        // eax_1 is defined and read in the block.
        let range = ranges
            .iter()
            .find(|r| func.body.base_name(r.def).as_deref() == Some("eax"))
            .expect("eax range");
        assert!(range.kill.is_some());
    }
}
