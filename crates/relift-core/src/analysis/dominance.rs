//! Dominator tree computation over the block graph.
//!
//! Required for: SSA phi placement (dominance frontiers), the renaming
//! walk, and loop recognition.
//!
//! Uses the Cooper-Harvey-Kennedy iterative algorithm, which is simple and
//! efficient for the moderate-size CFGs of single functions.

use rustc_hash::FxHashMap;

use super::digraph::Digraph;
use crate::ir::BlockId;

/// Dominator tree computed from a [`Digraph`].
///
/// Block A **dominates** block B if every path from the root to B passes
/// through A. The **immediate dominator** of B is the closest strict
/// dominator. The **dominance frontier** of A is the set of blocks where
/// A's dominance ends but A still contributes a definition that may merge.
#[derive(Debug)]
pub struct DominatorTree {
    /// Immediate dominator for each block. The root maps to itself.
    pub idom: FxHashMap<BlockId, BlockId>,
    /// Children in the dominator tree, in deterministic (block id) order.
    pub children: FxHashMap<BlockId, Vec<BlockId>>,
    /// Dominance frontier per block.
    pub frontiers: FxHashMap<BlockId, Vec<BlockId>>,
    root: BlockId,
}

impl DominatorTree {
    pub fn build(graph: &Digraph) -> Self {
        let rpo = graph.reverse_postorder();
        let mut rpo_index: FxHashMap<BlockId, usize> = FxHashMap::default();
        for (i, &block) in rpo.iter().enumerate() {
            rpo_index.insert(block, i);
        }

        let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        idom.insert(graph.root, graph.root);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in graph.predecessors(block) {
                    if idom.contains_key(&pred) {
                        new_idom = Some(match new_idom {
                            None => pred,
                            Some(current) => Self::intersect(current, pred, &idom, &rpo_index),
                        });
                    }
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for &block in &rpo {
            children.insert(block, Vec::new());
        }
        let mut ordered: Vec<BlockId> = rpo.clone();
        ordered.sort();
        for &block in &ordered {
            if let Some(&dom) = idom.get(&block) {
                if block != dom {
                    children.entry(dom).or_default().push(block);
                }
            }
        }

        let frontiers = Self::compute_frontiers(graph, &idom);

        DominatorTree {
            idom,
            children,
            frontiers,
            root: graph.root,
        }
    }

    /// The tree root; always the function's entry block.
    pub fn root(&self) -> BlockId {
        self.root
    }

    /// Returns true if `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut current = b;
        loop {
            match self.idom.get(&current) {
                Some(&dom) if dom == current => return false,
                Some(&dom) if dom == a => return true,
                Some(&dom) => current = dom,
                None => return false,
            }
        }
    }

    /// The immediate dominator, if the block has one (the root does not).
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied().and_then(|dom| {
            if dom == block {
                None
            } else {
                Some(dom)
            }
        })
    }

    /// Blocks immediately dominated by `block`.
    pub fn dominees(&self, block: BlockId) -> &[BlockId] {
        self.children
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn frontier(&self, block: BlockId) -> &[BlockId] {
        self.frontiers
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn intersect(
        mut b1: BlockId,
        mut b2: BlockId,
        idom: &FxHashMap<BlockId, BlockId>,
        rpo_index: &FxHashMap<BlockId, usize>,
    ) -> BlockId {
        while b1 != b2 {
            let idx1 = rpo_index.get(&b1).copied().unwrap_or(usize::MAX);
            let idx2 = rpo_index.get(&b2).copied().unwrap_or(usize::MAX);
            if idx1 > idx2 {
                b1 = match idom.get(&b1) {
                    Some(&dom) => dom,
                    None => return b2,
                };
            } else {
                b2 = match idom.get(&b2) {
                    Some(&dom) => dom,
                    None => return b1,
                };
            }
        }
        b1
    }

    /// For each block with 2+ predecessors: walk from each predecessor up
    /// the dominator tree until reaching the block's idom; every block
    /// visited on the way has the join block in its frontier.
    fn compute_frontiers(
        graph: &Digraph,
        idom: &FxHashMap<BlockId, BlockId>,
    ) -> FxHashMap<BlockId, Vec<BlockId>> {
        let mut frontiers: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();

        for &block in &graph.nodes {
            let preds = graph.predecessors(block);
            if preds.len() >= 2 {
                let block_idom = idom.get(&block).copied();
                for &pred in preds {
                    let mut runner = pred;
                    while Some(runner) != block_idom {
                        let frontier = frontiers.entry(runner).or_default();
                        if !frontier.contains(&block) {
                            frontier.push(block);
                        }
                        match idom.get(&runner) {
                            Some(&dom) if dom != runner => runner = dom,
                            _ => break,
                        }
                    }
                }
            }
        }

        frontiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, FunctionBuilder};

    fn diamond() -> Function {
        let mut fb = FunctionBuilder::new(0, "d");
        let a = fb.add_block(0x0);
        let b = fb.add_block(0x10);
        let c = fb.add_block(0x20);
        let d = fb.add_block(0x30);
        fb.jump(a, b);
        fb.fail(a, c);
        fb.jump(b, d);
        fb.jump(c, d);
        fb.mark_exit(d);
        fb.finish()
    }

    fn single_loop() -> Function {
        // pre -> header -> body -> header; header -> exit
        let mut fb = FunctionBuilder::new(0, "l");
        let pre = fb.add_block(0x0);
        let header = fb.add_block(0x10);
        let body = fb.add_block(0x20);
        let exit = fb.add_block(0x30);
        fb.jump(pre, header);
        fb.jump(header, body);
        fb.fail(header, exit);
        fb.jump(body, header);
        fb.mark_exit(exit);
        fb.finish()
    }

    #[test]
    fn test_diamond_idoms() {
        let func = diamond();
        let g = Digraph::from_function(&func);
        let dom = DominatorTree::build(&g);

        assert_eq!(dom.root(), BlockId(0));
        assert_eq!(dom.immediate_dominator(BlockId(0)), None);
        assert_eq!(dom.immediate_dominator(BlockId(1)), Some(BlockId(0)));
        assert_eq!(dom.immediate_dominator(BlockId(2)), Some(BlockId(0)));
        // The join is dominated by the branch head, not by either arm.
        assert_eq!(dom.immediate_dominator(BlockId(3)), Some(BlockId(0)));
        assert!(dom.dominates(BlockId(0), BlockId(3)));
        assert!(!dom.dominates(BlockId(1), BlockId(3)));
    }

    #[test]
    fn test_diamond_frontiers() {
        let func = diamond();
        let g = Digraph::from_function(&func);
        let dom = DominatorTree::build(&g);

        assert_eq!(dom.frontier(BlockId(1)), &[BlockId(3)]);
        assert_eq!(dom.frontier(BlockId(2)), &[BlockId(3)]);
        assert!(dom.frontier(BlockId(0)).is_empty());
    }

    #[test]
    fn test_loop_frontiers_include_header() {
        let func = single_loop();
        let g = Digraph::from_function(&func);
        let dom = DominatorTree::build(&g);

        // The body's frontier is the header it jumps back to.
        assert!(dom.frontier(BlockId(2)).contains(&BlockId(1)));
        // The header is in its own frontier (it reaches itself via the
        // back edge).
        assert!(dom.frontier(BlockId(1)).contains(&BlockId(1)));
    }

    #[test]
    fn test_dominees_deterministic() {
        let func = diamond();
        let g = Digraph::from_function(&func);
        let dom = DominatorTree::build(&g);
        assert_eq!(
            dom.dominees(BlockId(0)),
            &[BlockId(1), BlockId(2), BlockId(3)]
        );
    }
}
