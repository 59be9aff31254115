//! SSA construction: phi insertion and renaming.
//!
//! Two-phase Cytron et al. construction, driven by a [`RenameClass`]
//! selector so the same code runs for each renaming wave (registers, then
//! local variables, then memory dereferences):
//!
//! 1. Collect per-block definitions of the selected class and place phi
//!    statements at dominance frontiers via a worklist.
//! 2. Walk the dominator tree preorder, assigning subscripts from per-name
//!    stacks, linking uses to definitions and wiring phi arguments through
//!    successor predecessor indices.
//!
//! A use with no visible definition is recovered, not failed: a weak
//! `name_0 = 0` placeholder is synthesized in the function's `uninit`
//! container.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use super::context::{DefKey, SsaContext};
use crate::analysis::{Digraph, DominatorTree};
use crate::ir::{
    BlockId, ClonePreserve, ExprFlags, ExprId, ExprKind, Function, StmtKind,
};

/// Selector deciding which location class a wave renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameClass {
    Registers,
    Variables,
    Memory,
}

impl RenameClass {
    pub fn matches(self, kind: &ExprKind) -> bool {
        match self {
            RenameClass::Registers => matches!(kind, ExprKind::Reg(_)),
            RenameClass::Variables => matches!(kind, ExprKind::Var(_)),
            RenameClass::Memory => matches!(kind, ExprKind::Deref(_)),
        }
    }
}

/// Preserve set for phi operands: keep subscripts and def links of the
/// copied address subtree so cloned locations keep naming the same thing.
const PHI_CLONE: ClonePreserve = ClonePreserve {
    idx: true,
    def: true,
    safe: false,
    weak: false,
};

/// Runs one full construction wave for the given class.
pub fn build_wave(
    func: &mut Function,
    graph: &Digraph,
    dom: &DominatorTree,
    class: RenameClass,
    ctx: &mut SsaContext,
) {
    let defsites = collect_defsites(func, graph, class);
    insert_phis(func, graph, dom, &defsites);
    rename_block(func, graph, dom, class, ctx, dom.root());
}

struct DefSite {
    blocks: Vec<BlockId>,
    /// Last definition expression seen for the location; used as the
    /// template for phi operands.
    sample: ExprId,
}

/// Per-block local definitions of the class; multiple definitions of the
/// same location in one block keep only the last.
fn collect_defsites(
    func: &Function,
    graph: &Digraph,
    class: RenameClass,
) -> IndexMap<String, DefSite> {
    let mut defsites: IndexMap<String, DefSite> = IndexMap::new();
    for &block in graph.dfs_order() {
        let container = func.block(block).container;
        let mut local_last: IndexMap<String, ExprId> = IndexMap::new();
        for &sid in &func.body.container(container).stmts {
            if let Some((lhs, _)) = func.body.as_assign_stmt(sid) {
                if class.matches(&func.body.expr(lhs).kind) {
                    if let Some(name) = func.body.base_name(lhs) {
                        local_last.insert(name, lhs);
                    }
                }
            }
        }
        for (name, lhs) in local_last {
            let site = defsites.entry(name).or_insert_with(|| DefSite {
                blocks: Vec::new(),
                sample: lhs,
            });
            site.blocks.push(block);
            site.sample = lhs;
        }
    }
    defsites
}

/// Worklist phi placement over dominance frontiers.
fn insert_phis(
    func: &mut Function,
    graph: &Digraph,
    dom: &DominatorTree,
    defsites: &IndexMap<String, DefSite>,
) {
    let mut has_phi: FxHashSet<(BlockId, String)> = FxHashSet::default();
    for (name, site) in defsites {
        let def_blocks: FxHashSet<BlockId> = site.blocks.iter().copied().collect();
        let mut work: Vec<BlockId> = site.blocks.clone();
        let mut queued: FxHashSet<BlockId> = work.iter().copied().collect();
        while let Some(n) = work.pop() {
            for &y in dom.frontier(n) {
                if has_phi.insert((y, name.clone())) {
                    insert_phi_stmt(func, graph, y, site.sample);
                    if !def_blocks.contains(&y) && queued.insert(y) {
                        work.push(y);
                    }
                }
            }
        }
    }
}

/// Places `v = Phi(v, …, v)` at the top of `block`, one argument per
/// predecessor. The defined variable is weak so later passes may eliminate
/// the phi without conservative concern.
fn insert_phi_stmt(func: &mut Function, graph: &Digraph, block: BlockId, sample: ExprId) {
    let preds = graph.predecessors(block).len();
    let addr = func.block(block).addr;
    let container = func.block(block).container;
    let body = &mut func.body;

    let size = body.expr(sample).size;
    let lhs = body.clone_expr(sample, PHI_CLONE);
    body.expr_mut(lhs).idx = None;
    body.expr_mut(lhs).flags |= ExprFlags::WEAK;
    let args: Vec<ExprId> = (0..preds)
        .map(|_| {
            let arg = body.clone_expr(sample, PHI_CLONE);
            body.expr_mut(arg).idx = None;
            arg
        })
        .collect();
    let phi = body.alloc(ExprKind::Phi(args), size);
    let assign = body.assign(lhs, phi);
    let sid = body.alloc_stmt(addr, StmtKind::Expr, vec![assign]);
    body.insert_stmt_at(container, 0, sid);
}

/// Preorder dominator-tree renaming.
fn rename_block(
    func: &mut Function,
    graph: &Digraph,
    dom: &DominatorTree,
    class: RenameClass,
    ctx: &mut SsaContext,
    block: BlockId,
) {
    let mut pushed: Vec<String> = Vec::new();

    let stmts = func.body.container(func.block(block).container).stmts.clone();
    for sid in stmts {
        for e in func.body.stmt(sid).exprs.clone() {
            if let ExprKind::Assign(lhs, rhs) = func.body.expr(e).kind {
                // Phi operands are renamed from the predecessor side.
                if !func.body.expr(rhs).kind.is_phi() {
                    rename_uses_in(func, ctx, class, rhs);
                }
                for op in func.body.operands(lhs) {
                    rename_uses_in(func, ctx, class, op);
                }
                rename_def(func, ctx, class, lhs, &mut pushed);
            } else {
                rename_uses_in(func, ctx, class, e);
            }
        }
    }

    // Wire this block's outgoing values into successor phis. A block with
    // both edges to the same target is wired once.
    let mut wired: FxHashSet<BlockId> = FxHashSet::default();
    for &succ in graph.successors(block) {
        if !wired.insert(succ) {
            continue;
        }
        let preds = graph.predecessors(succ).to_vec();
        for (j, &p) in preds.iter().enumerate() {
            if p != block {
                continue;
            }
            let succ_stmts = func
                .body
                .container(func.block(succ).container)
                .stmts
                .clone();
            for sid in succ_stmts {
                let Some((lhs, phi)) = func.body.as_phi_stmt(sid) else {
                    break; // phis are grouped at the top
                };
                if !class.matches(&func.body.expr(lhs).kind) {
                    continue;
                }
                let arg = match &func.body.expr(phi).kind {
                    ExprKind::Phi(args) => args[j],
                    _ => continue,
                };
                rename_use(func, ctx, arg);
            }
        }
    }

    for &child in dom.dominees(block).to_vec().iter() {
        rename_block(func, graph, dom, class, ctx, child);
    }

    for name in pushed.iter().rev() {
        if let Some(stack) = ctx.stack.get_mut(name) {
            stack.pop();
        }
    }
}

/// Renames every matching use inside a subtree, innermost first so nested
/// dereference addresses settle before the outer location is named.
fn rename_uses_in(func: &mut Function, ctx: &mut SsaContext, class: RenameClass, id: ExprId) {
    for op in func.body.operands(id) {
        rename_uses_in(func, ctx, class, op);
    }
    let e = func.body.expr(id);
    if !e.is_def() && class.matches(&e.kind) {
        rename_use(func, ctx, id);
    }
}

/// Assigns the current subscript to a use and links it to its definition,
/// synthesizing an entry-state definition when none is visible.
fn rename_use(func: &mut Function, ctx: &mut SsaContext, id: ExprId) {
    if func.body.expr(id).def.is_some() {
        return;
    }
    let Some(name) = func.body.base_name(id) else {
        return;
    };
    let idx = match ctx.stack.get(&name).and_then(|s| s.last().copied()) {
        Some(idx) => idx,
        None => {
            synthesize_uninit(func, ctx, id, &name);
            0
        }
    };
    func.body.expr_mut(id).idx = Some(idx);
    let key = DefKey::new(name, idx);
    if let Some(&def) = ctx.defs.get(&key) {
        func.body.link_use(id, def);
    } else {
        tracing::debug!(target: "relift::ssa", %key, "use without definition after renaming");
    }
}

/// Assigns a fresh subscript to a definition and registers it.
fn rename_def(
    func: &mut Function,
    ctx: &mut SsaContext,
    class: RenameClass,
    lhs: ExprId,
    pushed: &mut Vec<String>,
) {
    if !func.body.expr(lhs).is_def() || !class.matches(&func.body.expr(lhs).kind) {
        return;
    }
    let Some(name) = func.body.base_name(lhs) else {
        return;
    };
    let count = ctx.count.entry(name.clone()).or_insert(0);
    *count += 1;
    let idx = *count;
    ctx.stack.entry(name.clone()).or_default().push(idx);
    func.body.expr_mut(lhs).idx = Some(idx);
    ctx.defs.insert(DefKey::new(name.clone(), idx), lhs);
    pushed.push(name);
}

/// Implicit initialization: the location is read before any write (stack
/// pointer, argument registers, callee-saved state). A weak `name_0 = 0`
/// definition is placed in the `uninit` container and becomes the entry
/// state for the name.
fn synthesize_uninit(func: &mut Function, ctx: &mut SsaContext, use_id: ExprId, name: &str) {
    let size = func.body.expr(use_id).size;
    let addr = func.addr;
    let body = &mut func.body;
    let lhs = body.clone_expr(use_id, PHI_CLONE);
    body.expr_mut(lhs).idx = Some(0);
    body.expr_mut(lhs).flags |= ExprFlags::WEAK;
    let zero = body.val(0, size);
    let assign = body.assign(lhs, zero);
    let sid = body.alloc_stmt(addr, StmtKind::Expr, vec![assign]);
    body.push_stmt(ctx.uninit, sid);

    ctx.stack.entry(name.to_string()).or_default().push(0);
    ctx.defs.insert(DefKey::new(name, 0), lhs);
    tracing::debug!(target: "relift::ssa", name, "synthesized entry-state definition");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FunctionBuilder};
    use crate::ssa::relax_phis;

    /// A -> {B, C} -> D; B: x = 1; C: x = 2; D: return x.
    fn diamond_with_defs() -> Function {
        let mut fb = FunctionBuilder::new(0, "d");
        let a = fb.add_block(0x0);
        let b = fb.add_block(0x10);
        let c = fb.add_block(0x20);
        let d = fb.add_block(0x30);
        fb.jump(a, b);
        fb.fail(a, c);
        fb.jump(b, d);
        fb.jump(c, d);

        let cond = fb.body().reg("zf", 1);
        fb.branch(a, 0x0, cond);
        let x1 = fb.body().reg("ecx", 32);
        let one = fb.body().val(1, 32);
        fb.assign(b, 0x10, x1, one);
        let x2 = fb.body().reg("ecx", 32);
        let two = fb.body().val(2, 32);
        fb.assign(c, 0x20, x2, two);
        let xr = fb.body().reg("ecx", 32);
        fb.ret(d, 0x30, Some(xr));
        fb.finish()
    }

    fn build(func: &mut Function) -> SsaContext {
        let graph = Digraph::from_function(func);
        let dom = DominatorTree::build(&graph);
        let mut ctx = SsaContext::new(func.uninit);
        build_wave(func, &graph, &dom, RenameClass::Registers, &mut ctx);
        ctx
    }

    #[test]
    fn test_diamond_gets_phi_at_join() {
        let mut func = diamond_with_defs();
        let ctx = build(&mut func);

        let join = func.block(BlockId(3)).container;
        let first = func.body.container(join).stmts[0];
        let (lhs, phi) = func.body.as_phi_stmt(first).expect("phi at join");
        assert!(func.body.expr(lhs).is_weak());
        assert_eq!(func.body.expr(lhs).idx, Some(3));
        match &func.body.expr(phi).kind {
            ExprKind::Phi(args) => {
                assert_eq!(args.len(), 2);
                let idxs: Vec<_> = args
                    .iter()
                    .map(|&a| func.body.expr(a).idx.unwrap())
                    .collect();
                assert_eq!(idxs, vec![1, 2]);
            }
            k => panic!("expected phi, got {k:?}"),
        }
        assert!(ctx.defs.contains_key(&DefKey::new("ecx", 3)));
    }

    #[test]
    fn test_use_links_to_def() {
        let mut func = diamond_with_defs();
        build(&mut func);

        let join = func.block(BlockId(3)).container;
        let ret = *func.body.container(join).stmts.last().unwrap();
        let ret_use = func.body.stmt(ret).exprs[0];
        assert_eq!(func.body.expr(ret_use).idx, Some(3));
        let def = func.body.expr(ret_use).def.expect("linked use");
        assert_eq!(func.body.expr(def).idx, Some(3));
        assert!(func.body.expr(def).uses.contains(&ret_use));
    }

    #[test]
    fn test_used_before_def_synthesizes_uninit() {
        // return eax; with no definition anywhere
        let mut func = {
            let mut fb = FunctionBuilder::new(0, "u");
            let b = fb.add_block(0);
            let eax = fb.body().reg("eax", 32);
            fb.ret(b, 0, Some(eax));
            fb.finish()
        };
        let ctx = build(&mut func);
        let zero_def = ctx.defs.get(&DefKey::new("eax", 0)).copied().unwrap();
        assert!(func.body.expr(zero_def).is_weak());
        assert_eq!(func.body.expr(zero_def).idx, Some(0));
        assert_eq!(func.body.container(func.uninit).len(), 1);
    }

    #[test]
    fn test_loop_header_phi_has_two_args() {
        // pre: i = 0; header: branch(i < 10); body: i = i + 1 -> header
        let mut func = {
            let mut fb = FunctionBuilder::new(0, "l");
            let pre = fb.add_block(0x0);
            let header = fb.add_block(0x10);
            let lbody = fb.add_block(0x20);
            let exit = fb.add_block(0x30);
            fb.jump(pre, header);
            fb.jump(header, lbody);
            fb.fail(header, exit);
            fb.jump(lbody, header);

            let i0 = fb.body().reg("esi", 32);
            let zero = fb.body().val(0, 32);
            fb.assign(pre, 0x0, i0, zero);
            let iu = fb.body().reg("esi", 32);
            let ten = fb.body().val(10, 32);
            let cond = fb.body().binary(BinOp::Lt, iu, ten);
            fb.branch(header, 0x10, cond);
            let id = fb.body().reg("esi", 32);
            let iu2 = fb.body().reg("esi", 32);
            let one = fb.body().val(1, 32);
            let inc = fb.body().binary(BinOp::Add, iu2, one);
            fb.assign(lbody, 0x20, id, inc);
            fb.ret(exit, 0x30, None);
            fb.finish()
        };
        let mut ctx = build(&mut func);

        let header_c = func.block(BlockId(1)).container;
        let first = func.body.container(header_c).stmts[0];
        let (_, phi) = func.body.as_phi_stmt(first).expect("loop header phi");
        match &func.body.expr(phi).kind {
            ExprKind::Phi(args) => {
                assert_eq!(args.len(), 2);
                // One argument from the preheader, one from the back edge.
                let idxs: Vec<_> = args
                    .iter()
                    .map(|&a| func.body.expr(a).idx.unwrap())
                    .collect();
                assert!(idxs.contains(&1));
                assert!(idxs.contains(&3));
            }
            k => panic!("expected phi, got {k:?}"),
        }

        // Relaxation keeps a two-argument loop phi intact.
        relax_phis(&mut func, &mut ctx);
        assert!(func.body.as_phi_stmt(first).is_some());
    }
}
