//! The points-to graph itself: a directed, field-labeled multigraph of allocation-site nodes plus
//! a variable→node root relation.

use cranelift_entity::PrimaryMap;
use il_ir::refs::{FieldRef, TypeRef};
use il_ir::value::Variable;
use il_support::AnalysisError;
use rustc_hash::{FxHashMap, FxHashSet};

use super::node::{PtgId, PtgNodeData, PtgNodeId, PtgNodeKind};

/// A multimap from variable to the set of nodes it's rooted on (`variables` root
/// relation). A thin wrapper over `il_ir`'s [`il_ir::adt::Multimap`] keyed by [`PtgNodeId`].
type RootMap = il_ir::adt::Multimap<Variable, PtgNodeId>;

/// A field-sensitive, allocation-site-abstracted points-to graph.
///
/// Backed by a [`PrimaryMap`] arena ("arena-per-graph storage with integer node
/// handles", avoiding reference cycles in a graph that is inherently cyclic) plus a `PtgId ->
/// PtgNodeId` index that enforces id identity: two nodes with the same stable id always resolve
/// to the same arena handle.
#[derive(Debug, Clone)]
pub struct PointsToGraph {
    nodes: PrimaryMap<PtgNodeId, PtgNodeData>,
    id_index: FxHashMap<PtgId, PtgNodeId>,
    variables: RootMap,
    /// Stack of the caller's root maps, pushed by `new_frame` and popped by `restore_frame`
    /// ("interprocedural analysis" stack-frame support). The node arena itself stays shared
    /// across frames.
    frames: Vec<RootMap>,
    null_node: PtgNodeId,
}

impl Default for PointsToGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PointsToGraph {
    /// An empty graph containing only the singleton `Null` node.
    pub fn new() -> Self {
        let mut nodes = PrimaryMap::new();
        let null_node = nodes.push(PtgNodeData::new(PtgId::null(), PtgNodeKind::Null, None));
        let mut id_index = FxHashMap::default();
        id_index.insert(PtgId::null(), null_node);
        Self {
            nodes,
            id_index,
            variables: RootMap::new(),
            frames: Vec::new(),
            null_node,
        }
    }

    pub fn null_node(&self) -> PtgNodeId {
        self.null_node
    }

    pub fn node(&self, id: PtgNodeId) -> &PtgNodeData {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (PtgNodeId, &PtgNodeData)> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Finds the existing node with this stable id, or allocates a fresh one (/// "idempotent by id").
    pub fn get_or_insert_node(&mut self, id: PtgId, ty: Option<TypeRef>, kind: PtgNodeKind) -> PtgNodeId {
        if let Some(&existing) = self.id_index.get(&id) {
            return existing;
        }
        let handle = self.nodes.push(PtgNodeData::new(id.clone(), kind, ty));
        self.id_index.insert(id, handle);
        handle
    }

    pub fn find_node(&self, id: &PtgId) -> Option<PtgNodeId> {
        self.id_index.get(id).copied()
    }

    /// Registers `v` as a tracked root with no targets yet. A no-op in this representation (an
    /// absent key and a present-but-empty key are indistinguishable); callers normally reach for
    /// `points_to` directly.
    pub fn add_variable(&mut self, _v: Variable) {}

    /// Unregisters `v` entirely: removes every root edge `v -> n` (and the matching `n.variables`
    /// membership) and drops `v` from the root relation.
    pub fn remove_variable(&mut self, v: &Variable) {
        let targets = self.variables.remove_key(v);
        for node in targets {
            self.nodes[node].variables.remove(v);
        }
    }

    /// Roots `v` on `n`: `v ∈ n.variables()` and `n ∈ variables[v]`.
    pub fn points_to(&mut self, v: Variable, n: PtgNodeId) {
        self.variables.insert(v.clone(), n);
        self.nodes[n].variables.insert(v);
    }

    /// Retargets a `Delegate` node's bound instance (delegate-constructor transfer):
    /// `d.ctor(obj, &foo)` rewrites the delegate node `d` resolves to so its `instance` is `obj`
    /// rather than whatever it was allocated with (usually nothing, for a static method group).
    /// A no-op if `node` isn't a `Delegate` node.
    pub fn retarget_delegate_instance(&mut self, node: PtgNodeId, instance: Variable) {
        if let PtgNodeKind::Delegate { instance: slot, .. } = &mut self.nodes[node].kind {
            *slot = Some(instance);
        }
    }

    /// Adds the field edge `src --field--> dst` in both directions.
    ///
    /// If `src.targets[field]` previously held only `Null`, that edge is removed first -- a Null
    /// edge is the may-analysis's "I don't know yet, assume null" placeholder, displaced the
    /// moment any real target is learned.
    pub fn points_to_field(&mut self, src: PtgNodeId, field: FieldRef, dst: PtgNodeId) {
        let only_null = self.nodes[src]
            .targets
            .get(&field)
            .is_some_and(|set| set.len() == 1 && set.contains(&self.null_node));
        if only_null && dst != self.null_node {
            self.remove_field_edge(src, &field, self.null_node);
        }
        self.nodes[src]
            .targets
            .entry(field.clone())
            .or_default()
            .insert(dst);
        self.nodes[dst].sources.entry(field).or_default().insert(src);
    }

    fn remove_field_edge(&mut self, src: PtgNodeId, field: &FieldRef, dst: PtgNodeId) {
        if let Some(set) = self.nodes[src].targets.get_mut(field) {
            set.remove(&dst);
            if set.is_empty() {
                self.nodes[src].targets.remove(field);
            }
        }
        if let Some(set) = self.nodes[dst].sources.get_mut(field) {
            set.remove(&src);
            if set.is_empty() {
                self.nodes[dst].sources.remove(field);
            }
        }
    }

    /// The nodes `v` is currently rooted on.
    pub fn get_targets(&self, v: &Variable) -> FxHashSet<PtgNodeId> {
        self.variables.get(v).cloned().unwrap_or_default()
    }

    /// `⋃ n.targets[field]` for every `n ∈ get_targets(v)`.
    pub fn get_targets_field(&self, v: &Variable, field: &FieldRef) -> FxHashSet<PtgNodeId> {
        let mut out = FxHashSet::default();
        for n in self.get_targets(v) {
            if let Some(set) = self.nodes[n].targets.get(field) {
                out.extend(set.iter().copied());
            }
        }
        out
    }

    /// Clears every root edge `v -> *` while keeping `v` registered. As with
    /// `add_variable`, "registered with no targets" and "unregistered" are the same
    /// representation here; the externally observable effect -- `get_targets(v)` becomes empty
    /// -- is what every transfer function that calls this actually depends on.
    pub fn remove_edges(&mut self, v: &Variable) {
        let targets = self.variables.remove_key(v);
        for node in targets {
            self.nodes[node].variables.remove(v);
        }
    }

    /// Pointwise union with `other`: every node missing locally is added (preserving id
    /// identity), then every node present in `other` has its variables, sources, and targets
    /// unioned into the local counterpart.
    ///
    /// Fails with [`AnalysisError::InconsistentPtg`] if `other` has a node whose id matches a
    /// local node but whose kind or type differs -- a contract violation indicating an
    /// id-collision bug upstream rather than a recoverable condition.
    pub fn union(&mut self, other: &PointsToGraph) -> Result<(), AnalysisError> {
        let mut remap: FxHashMap<PtgNodeId, PtgNodeId> = FxHashMap::default();
        for (other_handle, data) in other.nodes.iter() {
            let local_handle = match self.id_index.get(&data.id) {
                Some(&existing) => {
                    let existing_data = &self.nodes[existing];
                    if existing_data.kind != data.kind || existing_data.ty != data.ty {
                        return Err(AnalysisError::InconsistentPtg {
                            id: format!("{:?}", data.id).into(),
                        });
                    }
                    existing
                }
                None => {
                    let handle = self.nodes.push(PtgNodeData::new(data.id.clone(), data.kind.clone(), data.ty.clone()));
                    self.id_index.insert(data.id.clone(), handle);
                    handle
                }
            };
            remap.insert(other_handle, local_handle);
        }

        for (other_handle, data) in other.nodes.iter() {
            let local_handle = remap[&other_handle];
            for v in &data.variables {
                self.nodes[local_handle].variables.insert(v.clone());
                self.variables.insert(v.clone(), local_handle);
            }
            for (field, targets) in &data.targets {
                for &t in targets {
                    let local_t = remap[&t];
                    self.nodes[local_handle]
                        .targets
                        .entry(field.clone())
                        .or_default()
                        .insert(local_t);
                    self.nodes[local_t]
                        .sources
                        .entry(field.clone())
                        .or_default()
                        .insert(local_handle);
                }
            }
        }

        Ok(())
    }

    /// Structural equality: equal roots, equal node set (by id), and every node has identical
    /// `sources`/`targets` (compared by id, not by arena handle -- handles are not stable across
    /// independently-built graphs).
    pub fn graph_equals(&self, other: &PointsToGraph) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }

        let my_roots = self.roots_by_id();
        let their_roots = other.roots_by_id();
        if my_roots != their_roots {
            return false;
        }

        for (_, data) in self.nodes.iter() {
            let Some(&their_handle) = other.id_index.get(&data.id) else {
                return false;
            };
            let their_data = &other.nodes[their_handle];
            if data.kind != their_data.kind || data.ty != their_data.ty {
                return false;
            }
            if !edges_equal_by_id(self, &data.targets, other, &their_data.targets) {
                return false;
            }
            if !edges_equal_by_id(self, &data.sources, other, &their_data.sources) {
                return false;
            }
        }
        true
    }

    fn roots_by_id(&self) -> FxHashMap<Variable, FxHashSet<PtgId>> {
        self.variables
            .iter()
            .map(|(v, set)| (v.clone(), set.iter().map(|&n| self.nodes[n].id.clone()).collect()))
            .collect()
    }

    /// Pushes the current root map and starts an empty one, leaving the node arena shared --
    /// the opaque-call variant of the interprocedural-analysis stack frames, with no formal/actual
    /// binding.
    pub fn new_frame(&mut self) {
        let caller_roots = std::mem::replace(&mut self.variables, RootMap::new());
        self.frames.push(caller_roots);
    }

    /// As `new_frame`, but additionally copies each formal parameter's targets from the caller's
    /// corresponding actual argument into the callee's fresh root set.
    pub fn new_frame_with_bindings(&mut self, bindings: &[(Variable, Variable)]) {
        let caller_roots = std::mem::replace(&mut self.variables, RootMap::new());
        for (formal, actual) in bindings {
            if let Some(targets) = caller_roots.get(actual) {
                for &t in targets {
                    self.points_to(formal.clone(), t);
                }
            }
        }
        self.frames.push(caller_roots);
    }

    /// Pops the frame stack, re-links variables to the caller's roots, optionally routes the
    /// callee's `ret_var` targets to the caller's `dest_var`, then runs reachability-based
    /// garbage collection: every node not reachable from a current root is removed and its
    /// back-references cleaned.
    pub fn restore_frame(&mut self, ret_var: &Variable, dest_var: Option<&Variable>) {
        let ret_targets = self.get_targets(ret_var);
        let caller_roots = self
            .frames
            .pop()
            .expect("restore_frame called without a matching new_frame");
        self.variables = caller_roots;
        if let Some(dest) = dest_var {
            for t in ret_targets {
                self.points_to(dest.clone(), t);
            }
        }
        self.garbage_collect();
    }

    /// Reachability-based GC: rebuilds the arena containing only nodes reachable from a current
    /// root (plus `Null`, always kept), preserving `PtgId` identity and remapping every edge and
    /// root.
    fn garbage_collect(&mut self) {
        let mut reachable: FxHashSet<PtgNodeId> = FxHashSet::default();
        let mut stack: Vec<PtgNodeId> = self
            .variables
            .iter()
            .flat_map(|(_, set)| set.iter().copied())
            .collect();
        stack.push(self.null_node);

        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            for targets in self.nodes[id].targets.values() {
                for &t in targets {
                    if !reachable.contains(&t) {
                        stack.push(t);
                    }
                }
            }
        }

        let mut new_nodes: PrimaryMap<PtgNodeId, PtgNodeData> = PrimaryMap::new();
        let mut remap: FxHashMap<PtgNodeId, PtgNodeId> = FxHashMap::default();
        for (old_id, data) in self.nodes.iter() {
            if reachable.contains(&old_id) {
                let new_id = new_nodes.push(PtgNodeData::new(data.id.clone(), data.kind.clone(), data.ty.clone()));
                remap.insert(old_id, new_id);
            }
        }

        for (old_id, data) in self.nodes.iter() {
            let Some(&new_id) = remap.get(&old_id) else {
                continue;
            };
            for (field, targets) in &data.targets {
                let remapped: FxHashSet<PtgNodeId> = targets.iter().filter_map(|t| remap.get(t).copied()).collect();
                if !remapped.is_empty() {
                    new_nodes[new_id].targets.insert(field.clone(), remapped);
                }
            }
            for (field, sources) in &data.sources {
                let remapped: FxHashSet<PtgNodeId> = sources.iter().filter_map(|s| remap.get(s).copied()).collect();
                if !remapped.is_empty() {
                    new_nodes[new_id].sources.insert(field.clone(), remapped);
                }
            }
            new_nodes[new_id].variables = data.variables.clone();
        }

        self.id_index = self
            .id_index
            .iter()
            .filter_map(|(pid, old)| remap.get(old).map(|&n| (pid.clone(), n)))
            .collect();
        self.null_node = self.id_index[&PtgId::null()];

        let old_variables = std::mem::replace(&mut self.variables, RootMap::new());
        for (v, set) in old_variables.iter() {
            for old_id in set {
                if let Some(&new_id) = remap.get(old_id) {
                    self.variables.insert(v.clone(), new_id);
                }
            }
        }

        self.nodes = new_nodes;
    }
}

fn edges_equal_by_id(
    g: &PointsToGraph,
    edges: &FxHashMap<FieldRef, FxHashSet<PtgNodeId>>,
    other_g: &PointsToGraph,
    other_edges: &FxHashMap<FieldRef, FxHashSet<PtgNodeId>>,
) -> bool {
    if edges.len() != other_edges.len() {
        return false;
    }
    for (field, set) in edges {
        let Some(other_set) = other_edges.get(field) else {
            return false;
        };
        let ids: FxHashSet<PtgId> = set.iter().map(|&n| g.node(n).id.clone()).collect();
        let other_ids: FxHashSet<PtgId> = other_set.iter().map(|&n| other_g.node(n).id.clone()).collect();
        if ids != other_ids {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_ir::refs::TypeRef;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Variable {
        Variable::local(name, TypeRef::named("T"), false)
    }

    #[test]
    fn null_node_is_always_present() {
        let g = PointsToGraph::new();
        assert!(g.find_node(&PtgId::null()).is_some());
    }

    #[test]
    fn points_to_field_removes_a_prior_null_edge() {
        let mut g = PointsToGraph::new();
        let obj = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 0), None, PtgNodeKind::Object);
        let field = FieldRef::new("f");
        g.points_to_field(obj, field.clone(), g.null_node());
        assert_eq!(g.node(obj).targets[&field], [g.null_node()].into_iter().collect());

        let other_obj = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 4), None, PtgNodeKind::Object);
        g.points_to_field(obj, field.clone(), other_obj);
        assert_eq!(g.node(obj).targets[&field], [other_obj].into_iter().collect());
        assert!(g.node(g.null_node()).sources.get(&field).is_none_or(|s| s.is_empty()));
    }

    #[test]
    fn source_and_target_edges_stay_symmetric() {
        let mut g = PointsToGraph::new();
        let a = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 0), None, PtgNodeKind::Object);
        let b = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 4), None, PtgNodeKind::Object);
        let field = FieldRef::new("f");
        g.points_to_field(a, field.clone(), b);
        assert!(g.node(b).sources[&field].contains(&a));
        assert!(g.node(a).targets[&field].contains(&b));
    }

    #[test]
    fn root_invariant_holds_after_points_to() {
        let mut g = PointsToGraph::new();
        let v = var("p");
        let obj = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 0), None, PtgNodeKind::Object);
        g.points_to(v.clone(), obj);
        assert!(g.node(obj).variables.contains(&v));
        assert!(g.get_targets(&v).contains(&obj));
    }

    #[test]
    fn clone_then_graph_equals_is_true() {
        let mut g = PointsToGraph::new();
        let v = var("p");
        let obj = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 0), None, PtgNodeKind::Object);
        g.points_to(v, obj);
        let cloned = g.clone();
        assert!(g.graph_equals(&cloned));
    }

    #[test]
    fn union_is_idempotent() {
        let mut g = PointsToGraph::new();
        let v = var("p");
        let obj = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 0), None, PtgNodeKind::Object);
        g.points_to(v, obj);
        let snapshot = g.clone();
        g.union(&snapshot).unwrap();
        assert!(g.graph_equals(&snapshot));
    }

    #[test]
    fn union_detects_conflicting_node_kinds() {
        let mut a = PointsToGraph::new();
        let id = PtgId::allocation_site(il_ir::refs::MethodRef::new("M"), 0);
        a.get_or_insert_node(id.clone(), None, PtgNodeKind::Object);

        let mut b = PointsToGraph::new();
        b.get_or_insert_node(id, None, PtgNodeKind::Unknown);

        assert!(matches!(a.union(&b), Err(AnalysisError::InconsistentPtg { .. })));
    }

    #[test]
    fn restore_frame_collects_nodes_unreachable_from_any_root() {
        let mut g = PointsToGraph::new();
        let p = var("p");
        let obj = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("Callee"), 0), None, PtgNodeKind::Object);
        g.points_to(p, obj);
        let before = g.node_count();

        g.new_frame();
        let ret = var("$RV");
        let callee_obj = g.get_or_insert_node(PtgId::allocation_site(il_ir::refs::MethodRef::new("Callee"), 4), None, PtgNodeKind::Object);
        g.points_to(ret.clone(), callee_obj);

        let dest = var("q");
        g.restore_frame(&ret, Some(&dest));

        // The caller's `obj` is still reachable via `p`; `callee_obj` survives via `q`.
        assert_eq!(g.node_count(), before + 1);
        assert!(g.get_targets(&dest).contains(&g.find_node(&PtgId::allocation_site(il_ir::refs::MethodRef::new("Callee"), 4)).unwrap()));
    }
}
