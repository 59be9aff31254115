//! Control-flow recovery: prepares the block graph for printing.
//!
//! Three recognizers run in sequence:
//!
//! 1. *Fall-throughs*: a pair of blocks joined by a single
//!    successor/predecessor edge merges into one sequence.
//! 2. *Loops*: natural loops found via dominator back edges; header, body
//!    and exit are tagged.
//! 3. *Conditions*: if/else and if-then diamonds (including nested forms).
//!
//! The result is a set of scope brackets plus a printable block order,
//! consumed by the back-end printer.

use rustc_hash::FxHashSet;

use crate::analysis::{Digraph, DominatorTree};
use crate::ir::{BlockId, Function, StmtKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Loop,
    If,
    IfElse,
}

/// A structured region of the graph.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    /// The deciding block: loop header or branch head.
    pub head: BlockId,
    /// Blocks of the loop body / taken-when-false arm.
    pub body: Vec<BlockId>,
    /// Blocks of the else arm (if/else only).
    pub alt: Vec<BlockId>,
    /// Where control continues after the scope.
    pub join: Option<BlockId>,
}

/// Recovery result handed to the printer.
#[derive(Debug)]
pub struct Shape {
    /// Blocks in printable order (DFS spanning-tree order).
    pub order: Vec<BlockId>,
    pub scopes: Vec<Scope>,
}

impl Shape {
    pub fn scopes_at(&self, head: BlockId) -> impl Iterator<Item = &Scope> {
        self.scopes.iter().filter(move |s| s.head == head)
    }
}

/// Runs the three recognizers. Mutates the function (fall-through merging)
/// and returns the scope annotations.
pub fn recover(func: &mut Function) -> Shape {
    merge_fallthroughs(func);
    let graph = Digraph::from_function(func);
    let dom = DominatorTree::build(&graph);

    let mut scopes = detect_loops(&graph, &dom);
    scopes.extend(detect_conditions(&graph, &dom, &scopes));

    Shape {
        order: graph.dfs_order().to_vec(),
        scopes,
    }
}

/// Merges every `a -> b` pair where `a`'s only successor is `b` and `b`'s
/// only predecessor is `a`. `b`'s statements are appended to `a`, `a`
/// inherits `b`'s edges and exit flag, and `b` drops out of the graph.
fn merge_fallthroughs(func: &mut Function) {
    loop {
        let graph = Digraph::from_function(func);
        let mut merged = false;
        for &a in graph.dfs_order() {
            let succs = graph.successors(a);
            if succs.len() != 1 {
                continue;
            }
            let b = succs[0];
            if b == a || b == func.entry || graph.predecessors(b).len() != 1 {
                continue;
            }

            // A trailing goto in `a` is subsumed by the merge.
            let a_container = func.block(a).container;
            if let Some(&last) = func.body.container(a_container).stmts.last() {
                if func.body.stmt(last).kind == StmtKind::Goto {
                    func.body.pluck_stmt(last, false);
                }
            }

            let b_container = func.block(b).container;
            let moved = std::mem::take(&mut func.body.container_mut(b_container).stmts);
            for sid in moved {
                func.body.push_stmt(a_container, sid);
            }

            let (b_jump, b_fail, b_cases, b_exit) = {
                let bb = func.block(b);
                (bb.jump, bb.fail, bb.cases.clone(), bb.is_exit)
            };
            let ba = func.block_mut(a);
            ba.jump = b_jump;
            ba.fail = b_fail;
            ba.cases = b_cases;
            ba.is_exit |= b_exit;
            let bb = func.block_mut(b);
            bb.jump = None;
            bb.fail = None;
            bb.cases.clear();
            bb.is_exit = false;

            merged = true;
            break;
        }
        if !merged {
            break;
        }
    }
}

/// Natural loops from dominator back edges: an edge `b -> h` where `h`
/// dominates `b` makes `h` a header; the body is the pred-walk from `b`
/// that stays out of `h`.
fn detect_loops(graph: &Digraph, dom: &DominatorTree) -> Vec<Scope> {
    let mut scopes = Vec::new();
    for &b in graph.dfs_order() {
        for &h in graph.successors(b) {
            if !dom.dominates(h, b) {
                continue;
            }
            let mut body: FxHashSet<BlockId> = FxHashSet::default();
            body.insert(h);
            let mut stack = vec![b];
            while let Some(n) = stack.pop() {
                if body.insert(n) {
                    stack.extend(graph.predecessors(n).iter().copied());
                }
            }
            let exit = graph
                .successors(h)
                .iter()
                .copied()
                .find(|s| !body.contains(s));

            let mut blocks: Vec<BlockId> = body.into_iter().filter(|&n| n != h).collect();
            blocks.sort();
            scopes.push(Scope {
                kind: ScopeKind::Loop,
                head: h,
                body: blocks,
                alt: Vec::new(),
                join: exit,
            });
        }
    }
    scopes
}

/// If/else and if-then diamonds over two-way branch heads. Loop headers
/// are skipped; their branch is the loop condition.
fn detect_conditions(graph: &Digraph, dom: &DominatorTree, loops: &[Scope]) -> Vec<Scope> {
    let headers: FxHashSet<BlockId> = loops.iter().map(|s| s.head).collect();
    let mut scopes = Vec::new();
    for &h in &graph.reverse_postorder() {
        if headers.contains(&h) {
            continue;
        }
        let succs = graph.successors(h);
        if succs.len() != 2 {
            continue;
        }
        let (taken, fallthrough) = (succs[0], succs[1]);

        let taken_succs = graph.successors(taken);
        let fall_succs = graph.successors(fallthrough);

        // if/else: both arms funnel into one join block.
        if taken_succs.len() == 1 && fall_succs.len() == 1 && taken_succs[0] == fall_succs[0] {
            let join = taken_succs[0];
            scopes.push(Scope {
                kind: ScopeKind::IfElse,
                head: h,
                body: arm_blocks(dom, fallthrough, join),
                alt: arm_blocks(dom, taken, join),
                join: Some(join),
            });
            continue;
        }
        // if-then: one arm falls straight into the other successor.
        if fall_succs.len() == 1 && fall_succs[0] == taken {
            scopes.push(Scope {
                kind: ScopeKind::If,
                head: h,
                body: arm_blocks(dom, fallthrough, taken),
                alt: Vec::new(),
                join: Some(taken),
            });
        } else if taken_succs.len() == 1 && taken_succs[0] == fallthrough {
            scopes.push(Scope {
                kind: ScopeKind::If,
                head: h,
                body: arm_blocks(dom, taken, fallthrough),
                alt: Vec::new(),
                join: Some(fallthrough),
            });
        }
    }
    scopes
}

/// All blocks of one branch arm: the arm head plus everything it
/// dominates, short of the join.
fn arm_blocks(dom: &DominatorTree, head: BlockId, join: BlockId) -> Vec<BlockId> {
    let mut out = Vec::new();
    let mut stack = vec![head];
    while let Some(n) = stack.pop() {
        if n == join {
            continue;
        }
        out.push(n);
        stack.extend(dom.dominees(n).iter().copied());
    }
    out.sort();
    out
}
