//! The control-flow graph: nodes, edges, exception regions, and the builder that produces them
//! from a [`MethodBody`](crate::MethodBody).

pub mod builder;
pub mod node;
pub mod region;

pub use builder::{build, CfgMode};
pub use node::{BlockId, CFGNode, NodeKind};
pub use region::{HandlerRegion, HandlerRegionKind, LoopRegion, ProtectedRegion, Region, RegionId};

use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::adt::graph::{Graph, InvertibleGraph};

/// Owns every node and region of one method's control-flow graph. Node 0 is always
/// `Entry`, 1 `Exit`, 2 `NormalExit`, 3 `ExceptionalExit` — `entry()`/`exit()`/`normal_exit()`/
/// `exceptional_exit()` exist mostly for readability at call sites.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    nodes: PrimaryMap<BlockId, CFGNode>,
    regions: Vec<Region>,
}

impl ControlFlowGraph {
    pub fn entry(&self) -> BlockId {
        BlockId::from_u32(0)
    }

    pub fn exit(&self) -> BlockId {
        BlockId::from_u32(1)
    }

    pub fn normal_exit(&self) -> BlockId {
        BlockId::from_u32(2)
    }

    pub fn exceptional_exit(&self) -> BlockId {
        BlockId::from_u32(3)
    }

    pub fn node(&self, id: BlockId) -> &CFGNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: BlockId) -> &mut CFGNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CFGNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.nodes.keys()
    }

    pub fn basic_blocks(&self) -> impl Iterator<Item = &CFGNode> {
        self.nodes.values().filter(|n| n.is_basic_block())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.0]
    }

    /// `NormalExit → Exit` and `ExceptionalExit → Exit` are always present.
    pub fn check_exit_invariant(&self) -> bool {
        self.nodes[self.normal_exit()].successors.contains(&self.exit())
            && self.nodes[self.exceptional_exit()]
                .successors
                .contains(&self.exit())
    }
}

impl Graph for ControlFlowGraph {
    type Node = BlockId;

    fn successors(&self, node: BlockId) -> SmallVec<[BlockId; 4]> {
        self.nodes[node].successors.clone()
    }
}

impl InvertibleGraph for ControlFlowGraph {
    fn predecessors(&self, node: BlockId) -> SmallVec<[BlockId; 4]> {
        self.nodes[node].predecessors.iter().copied().collect()
    }
}
