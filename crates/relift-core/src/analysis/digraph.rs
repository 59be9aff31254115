//! Directed graph over basic blocks.
//!
//! Built from a function's block edges. Only blocks reachable from the
//! root are part of the graph, so unreachable blocks (multiple entry
//! candidates, merged-away fall-throughs) drop out of every downstream
//! pass without physical deletion.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{BlockId, Function};

/// Directed control-flow graph restricted to the reachable node set.
#[derive(Debug)]
pub struct Digraph {
    /// Reachable nodes in DFS spanning-tree (preorder) discovery order.
    pub nodes: Vec<BlockId>,
    pub root: BlockId,
    successors: FxHashMap<BlockId, Vec<BlockId>>,
    predecessors: FxHashMap<BlockId, Vec<BlockId>>,
}

impl Digraph {
    /// Builds the graph from a function's entry block.
    ///
    /// Successor order is jump, fail, then cases. Predecessor lists are
    /// ordered by ascending predecessor block id; phi argument order is
    /// defined by this ordering.
    pub fn from_function(func: &Function) -> Self {
        let root = func.entry;
        let mut nodes = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            nodes.push(n);
            let succs = func.block(n).successors();
            for &s in succs.iter().rev() {
                if !seen.contains(&s) {
                    stack.push(s);
                }
            }
        }

        let mut successors: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        let mut predecessors: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for &n in &nodes {
            successors.insert(n, Vec::new());
            predecessors.insert(n, Vec::new());
        }
        let mut by_id: Vec<BlockId> = nodes.clone();
        by_id.sort();
        for &n in &by_id {
            for s in func.block(n).successors() {
                if seen.contains(&s) {
                    successors.get_mut(&n).unwrap().push(s);
                    predecessors.get_mut(&s).unwrap().push(n);
                }
            }
        }

        Digraph {
            nodes,
            root,
            successors,
            predecessors,
        }
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.successors.contains_key(&id)
    }

    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        self.successors.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        self.predecessors
            .get(&id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Reachable nodes in DFS spanning-tree order.
    pub fn dfs_order(&self) -> &[BlockId] {
        &self.nodes
    }

    /// Blocks in reverse postorder (the natural order for forward dataflow).
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = FxHashSet::default();
        let mut postorder = Vec::with_capacity(self.nodes.len());
        self.dfs_postorder(self.root, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    fn dfs_postorder(
        &self,
        node: BlockId,
        visited: &mut FxHashSet<BlockId>,
        postorder: &mut Vec<BlockId>,
    ) {
        if !visited.insert(node) {
            return;
        }
        for &succ in self.successors(node) {
            self.dfs_postorder(succ, visited, postorder);
        }
        postorder.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

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

    #[test]
    fn test_edges_and_orders() {
        let func = diamond();
        let g = Digraph::from_function(&func);
        assert_eq!(g.root, BlockId(0));
        assert_eq!(g.successors(BlockId(0)), &[BlockId(1), BlockId(2)]);
        assert_eq!(g.predecessors(BlockId(3)), &[BlockId(1), BlockId(2)]);
        let rpo = g.reverse_postorder();
        assert_eq!(rpo[0], BlockId(0));
        assert_eq!(*rpo.last().unwrap(), BlockId(3));
    }

    #[test]
    fn test_unreachable_blocks_excluded() {
        let mut fb = FunctionBuilder::new(0, "u");
        let a = fb.add_block(0x0);
        let b = fb.add_block(0x10);
        let orphan = fb.add_block(0x20);
        fb.jump(a, b);
        fb.mark_exit(b);
        let func = fb.finish();

        let g = Digraph::from_function(&func);
        assert!(g.contains(a));
        assert!(g.contains(b));
        assert!(!g.contains(orphan));
        assert_eq!(g.dfs_order().len(), 2);
    }
}
