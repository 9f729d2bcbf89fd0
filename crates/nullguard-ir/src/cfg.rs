//! CFG navigation helpers over a deserialized function body.

use crate::ir::{BasicBlock, BlockId, Body, EdgeKind};
use std::collections::{HashMap, HashSet};

/// A traversable view of a function body's CFG.
pub struct Cfg<'a> {
    body: &'a Body,
    successors: HashMap<BlockId, Vec<(BlockId, EdgeKind)>>,
    predecessors: HashMap<BlockId, Vec<(BlockId, EdgeKind)>>,
    block_map: HashMap<BlockId, &'a BasicBlock>,
}

impl<'a> Cfg<'a> {
    /// Build traversal indices from a deserialized body.
    pub fn from_body(body: &'a Body) -> Self {
        let mut successors: HashMap<BlockId, Vec<(BlockId, EdgeKind)>> = HashMap::new();
        let mut predecessors: HashMap<BlockId, Vec<(BlockId, EdgeKind)>> = HashMap::new();
        let mut block_map = HashMap::new();

        for block in &body.blocks {
            block_map.insert(block.id, block);
            successors.entry(block.id).or_default();
            predecessors.entry(block.id).or_default();
        }

        for edge in &body.edges {
            successors
                .entry(edge.from)
                .or_default()
                .push((edge.to, edge.kind));
            predecessors
                .entry(edge.to)
                .or_default()
                .push((edge.from, edge.kind));
        }

        Self {
            body,
            successors,
            predecessors,
            block_map,
        }
    }

    /// Entry block (always block 0).
    pub fn entry_block(&self) -> Option<&'a BasicBlock> {
        self.block_map.get(&0).copied()
    }

    pub fn block(&self, id: BlockId) -> Option<&'a BasicBlock> {
        self.block_map.get(&id).copied()
    }

    pub fn successors(&self, block_id: BlockId) -> &[(BlockId, EdgeKind)] {
        self.successors
            .get(&block_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, block_id: BlockId) -> &[(BlockId, EdgeKind)] {
        self.predecessors
            .get(&block_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn blocks(&self) -> impl Iterator<Item = &'a BasicBlock> {
        self.body.blocks.iter()
    }

    pub fn block_count(&self) -> usize {
        self.body.blocks.len()
    }

    /// Reverse post-order (the iteration order for forward dataflow).
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();

        if let Some(entry) = self.entry_block() {
            self.dfs_postorder(entry.id, &mut visited, &mut postorder);
        }

        postorder.reverse();
        postorder
    }

    fn dfs_postorder(
        &self,
        block_id: BlockId,
        visited: &mut HashSet<BlockId>,
        postorder: &mut Vec<BlockId>,
    ) {
        if !visited.insert(block_id) {
            return;
        }
        for &(succ_id, _) in self.successors(block_id) {
            self.dfs_postorder(succ_id, visited, postorder);
        }
        postorder.push(block_id);
    }
}
