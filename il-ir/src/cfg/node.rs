use cranelift_entity::{entity_impl, EntityRef};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::instruction::Instruction;

/// A handle to a node in a [`ControlFlowGraph`](super::ControlFlowGraph). Ids 0–3 are the
/// reserved `Entry`/`Exit`/`NormalExit`/`ExceptionalExit` sentinels; `BasicBlock` ids
/// start at 4 and are assigned in leader-discovery order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

/// The kind of a [`BlockId`],
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Entry,
    Exit,
    NormalExit,
    ExceptionalExit,
    BasicBlock,
}

/// A single node in the CFG: its instructions plus the edge and dominance bookkeeping the
/// dominator, loop, and dataflow passes fill in.
#[derive(Debug, Clone)]
pub struct CFGNode {
    pub id: BlockId,
    pub kind: NodeKind,
    pub instructions: Vec<Instruction>,
    pub predecessors: FxHashSet<BlockId>,
    pub successors: SmallVec<[BlockId; 4]>,
    pub immediate_dominator: Option<BlockId>,
    pub immediate_dominated: Vec<BlockId>,
    pub dominance_frontier: FxHashSet<BlockId>,
    /// Reverse-postorder index from `Entry`, assigned once the graph is finalized; used to find
    /// the immediate dominator (the dominator with the largest forward index).
    pub forward_index: Option<u32>,
    /// Reverse-postorder index from `Exit`, used by backward analyses.
    pub backward_index: Option<u32>,
}

impl CFGNode {
    pub(super) fn new(id: BlockId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            instructions: Vec::new(),
            predecessors: FxHashSet::default(),
            successors: SmallVec::new(),
            immediate_dominator: None,
            immediate_dominated: Vec::new(),
            dominance_frontier: FxHashSet::default(),
            forward_index: None,
            backward_index: None,
        }
    }

    pub fn is_basic_block(&self) -> bool {
        self.kind == NodeKind::BasicBlock
    }
}
