//! Points-to graph node identity and node data.

use compact_str::CompactString;
use cranelift_entity::entity_impl;
use il_ir::refs::{MethodRef, TypeRef};
use il_ir::value::Variable;
use rustc_hash::{FxHashMap, FxHashSet};

use il_ir::refs::FieldRef;

/// An in-graph handle to a [`PtgNodeData`], assigned in allocation order (/// "arena-per-graph storage with integer handles"). Stable only within one [`super::PointsToGraph`];
/// cross-graph identity is [`PtgId`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PtgNodeId(u32);
entity_impl!(PtgNodeId, "ptgnode");

/// The abstraction context a [`PtgId`]'s offset is interpreted within: an
/// allocation-site offset is only meaningful relative to the method it occurs in, while `Null`
/// and the static-field root are process-wide singletons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PtgContext {
    Method(MethodRef),
    GlobalNull,
    GlobalStatic,
}

/// The stable, cross-graph identity of a points-to node: `(context,
/// offset)`. Two nodes with equal ids are the same node and must be merged, never duplicated --
/// `PointsToGraph::get_or_insert_node` enforces this at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PtgId {
    pub context: PtgContext,
    pub offset: i64,
}

impl PtgId {
    /// The fixed id of the singleton `Null` node (`(GlobalNull, 0)`).
    pub fn null() -> Self {
        Self {
            context: PtgContext::GlobalNull,
            offset: 0,
        }
    }

    /// The fixed id of the singleton static-field root (`(GlobalStatic, -1)`).
    pub fn global() -> Self {
        Self {
            context: PtgContext::GlobalStatic,
            offset: -1,
        }
    }

    /// An allocation-site id: all dynamic allocations at the same `offset` within `method`
    /// collapse to the same node (allocation-site abstraction).
    pub fn allocation_site(method: MethodRef, offset: i64) -> Self {
        Self {
            context: PtgContext::Method(method),
            offset,
        }
    }
}

/// The kind of a points-to node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtgNodeKind {
    /// The singleton "points at nothing (yet)" node.
    Null,
    /// An allocation-site-abstracted heap object (`new T`, `new T[...]`), or the `this` parameter
    /// ("The `this` parameter gets an `Object` node ... to model 'exists and is
    /// non-null'").
    Object,
    /// A placeholder for a value supplied externally -- synthesized when a field load escapes
    /// through a parameter with no recorded target, or when an `UnresolvedReference`
    /// forces a best-effort stand-in.
    Unknown,
    /// A non-`this` parameter's initial abstract value.
    Parameter { name: CompactString },
    /// A first-class function pointer (`&m` or `&obj::m`). `instance` is filled in (or retargeted)
    /// by the delegate-constructor transfer.
    Delegate {
        method: MethodRef,
        instance: Option<Variable>,
    },
    /// The singleton root for static-field accesses.
    Global,
}

/// One node of a [`super::PointsToGraph`]: its stable id, kind, optional static type, its
/// field-labeled out-edges (`targets`) and the coherently-maintained inverse (`sources`), and the
/// set of variables currently rooted on it.
#[derive(Debug, Clone)]
pub struct PtgNodeData {
    pub id: PtgId,
    pub kind: PtgNodeKind,
    pub ty: Option<TypeRef>,
    pub targets: FxHashMap<FieldRef, FxHashSet<PtgNodeId>>,
    pub sources: FxHashMap<FieldRef, FxHashSet<PtgNodeId>>,
    pub variables: FxHashSet<Variable>,
}

impl PtgNodeData {
    pub(super) fn new(id: PtgId, kind: PtgNodeKind, ty: Option<TypeRef>) -> Self {
        Self {
            id,
            kind,
            ty,
            targets: FxHashMap::default(),
            sources: FxHashMap::default(),
            variables: FxHashSet::default(),
        }
    }
}
