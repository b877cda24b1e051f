use rustc_hash::FxHashSet;

use super::node::BlockId;

/// A handle into [`ControlFlowGraph::regions`](super::ControlFlowGraph). Regions reference each
/// other by id (a `ProtectedRegion` names its `HandlerRegion` and vice versa) rather than by
/// direct reference, since both live in the same owning arena ("arena-per-graph storage
/// with integer handles").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RegionId(pub usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandlerRegionKind {
    Catch,
    Fault,
    Finally,
    /// A `catch`-like handler guarded by a filter predicate. `filter_header` is the block where
    /// the filter expression starts evaluating, distinct from `header` (the handler body proper).
    Filter { filter_header: BlockId },
}

#[derive(Debug, Clone)]
pub struct ProtectedRegion {
    pub header: BlockId,
    pub nodes: FxHashSet<BlockId>,
    pub handler: RegionId,
}

#[derive(Debug, Clone)]
pub struct HandlerRegion {
    pub kind: HandlerRegionKind,
    pub header: BlockId,
    pub nodes: FxHashSet<BlockId>,
    pub protected: RegionId,
}

#[derive(Debug, Clone)]
pub struct LoopRegion {
    pub header: BlockId,
    pub nodes: FxHashSet<BlockId>,
}

/// One of the three region shapes the CFG builder (exceptional mode) and the loop analysis
/// produce.
#[derive(Debug, Clone)]
pub enum Region {
    Protected(ProtectedRegion),
    Handler(HandlerRegion),
    Loop(LoopRegion),
}

impl Region {
    pub fn header(&self) -> BlockId {
        match self {
            Self::Protected(r) => r.header,
            Self::Handler(r) => r.header,
            Self::Loop(r) => r.header,
        }
    }

    pub fn nodes(&self) -> &FxHashSet<BlockId> {
        match self {
            Self::Protected(r) => &r.nodes,
            Self::Handler(r) => &r.nodes,
            Self::Loop(r) => &r.nodes,
        }
    }
}
