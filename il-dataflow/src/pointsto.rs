//! The points-to analysis: a forward monotone dataflow instance over [`PointsToGraph`].
//!
//! Grounded on `other_examples/fad591e8_…points_to_analysis.rs` (Kani's
//! `rustc_mir_dataflow`-based points-to analysis): the same division of labor -- a family of
//! `resolve_*`/`follow_*` helpers that turn an operand into a set of points-to targets before the
//! instruction's own effect is applied, and one analysis type owning the per-instruction `match`
//! -- is reused here, adapted from MIR `Place`/`Rvalue` to this IR's `Value`/`Instruction` shapes.

use il_ir::instruction::{Instruction, InstructionKind, Offset, StoreTarget};
use il_ir::method_body::MethodBody;
use il_ir::refs::{ConstantPayload, FieldRef, MethodRef, TypeRef};
use il_ir::value::{Value, Variable, RETURN_VARIABLE_NAME};
use il_support::TypeResolver;
use rustc_hash::FxHashSet;

use crate::ptg::{PointsToGraph, PtgId, PtgNodeId, PtgNodeKind};
use crate::solver::Transfer;
use il_ir::cfg::{BlockId, ControlFlowGraph};

/// A synthetic field label used to key array-element edges in the points-to graph. Array
/// elements aren't individually indexed, so every element of
/// every array collapses onto one field slot per array node -- consistent with the engine's
/// field-sensitive-but-not-index-sensitive abstraction.
fn array_element_field() -> FieldRef {
    FieldRef::new("[]")
}

/// A synthetic field label for the target of a `Dereference`/`Reference` pointer value, handled
/// conservatively since pointer transfer functions aren't otherwise specified.
fn pointee_field() -> FieldRef {
    FieldRef::new("*")
}

/// The forward, field-sensitive, allocation-site points-to analysis.
///
/// `lattice = PointsToGraph`, `join = union`, `compare = graph_equals`; per-instruction
/// transfer functions are implemented in [`Transfer::flow`] below, dispatching on each
/// instruction's shape: null load, variable copy, field load, field store, allocation,
/// convert-as-copy, phi-as-union, return-to-`$RV`, delegate creation and retargeting.
pub struct PointsToAnalysis<'a, R: TypeResolver<TypeRef = TypeRef, MethodRef = MethodRef, FieldRef = FieldRef>> {
    cfg: &'a ControlFlowGraph,
    method: MethodRef,
    method_body: &'a MethodBody,
    resolver: &'a R,
}

impl<'a, R: TypeResolver<TypeRef = TypeRef, MethodRef = MethodRef, FieldRef = FieldRef>> PointsToAnalysis<'a, R> {
    pub fn new(cfg: &'a ControlFlowGraph, method: MethodRef, method_body: &'a MethodBody, resolver: &'a R) -> Self {
        Self {
            cfg,
            method,
            method_body,
            resolver,
        }
    }

    fn is_value_type(&self, ty: &TypeRef) -> bool {
        self.resolver
            .resolve_type(ty)
            .is_some_and(|def| self.resolver.is_value_type(&def))
    }

    /// The initial PTG at `Entry`: `Null`, plus one node per non-value-typed
    /// parameter -- an `Object` node for `this` ("exists and is non-null"), a `Parameter` node for
    /// everything else.
    fn entry_graph(&self) -> PointsToGraph {
        let mut ptg = PointsToGraph::new();
        for (index, param) in self.method_body.parameters.iter().enumerate() {
            if self.is_value_type(&param.ty()) {
                continue;
            }
            let is_this = index == 0 && param.is_parameter() && param.name() == "this";
            let id = PtgId::allocation_site(self.method.clone(), -(index as i64) - 1);
            let node = if is_this {
                ptg.get_or_insert_node(id, Some(param.ty()), PtgNodeKind::Object)
            } else {
                ptg.get_or_insert_node(
                    id,
                    Some(param.ty()),
                    PtgNodeKind::Parameter {
                        name: param.name(),
                    },
                )
            };
            ptg.points_to(param.clone(), node);
        }
        ptg
    }

    /// BFS from `from` over field targets, stopping at `Null`, checking whether `target` is
    /// reachable (`reachable` helper).
    fn reachable(ptg: &PointsToGraph, from: &FxHashSet<PtgNodeId>, target: PtgNodeId) -> bool {
        let mut visited: FxHashSet<PtgNodeId> = FxHashSet::default();
        let mut stack: Vec<PtgNodeId> = from.iter().copied().collect();
        while let Some(n) = stack.pop() {
            if n == target {
                return true;
            }
            if !visited.insert(n) || n == ptg.null_node() {
                continue;
            }
            for targets in ptg.node(n).targets.values() {
                stack.extend(targets.iter().copied());
            }
        }
        false
    }

    /// Whether `n` is reachable (via field edges) from some non-value-typed parameter's current
    /// targets -- the "heap escaping through a parameter" condition field load checks before
    /// synthesizing an `Unknown` stand-in.
    fn reachable_from_some_parameter(&self, ptg: &PointsToGraph, n: PtgNodeId) -> bool {
        self.method_body.parameters.iter().any(|p| {
            if self.is_value_type(&p.ty()) {
                return false;
            }
            Self::reachable(ptg, &ptg.get_targets(p), n)
        })
    }

    /// The set of nodes a general `Value` resolves to, synthesizing side effects (escaping
    /// `Unknown` nodes) along the way where the instruction-level transfer requires it. This is
    /// the `follow_*` family that a per-operand `points_to_analysis.rs`-style resolver pairs with
    /// its own match over the instruction.
    fn resolve_value(&self, ptg: &mut PointsToGraph, offset: Offset, value: &Value) -> FxHashSet<PtgNodeId> {
        match value {
            Value::Constant {
                payload: ConstantPayload::Null,
                ..
            } => [ptg.null_node()].into_iter().collect(),
            Value::Constant { .. } => FxHashSet::default(),
            Value::UnknownValue => {
                let unknown = self.synthesize_unknown(ptg, offset);
                [unknown].into_iter().collect()
            }
            Value::Variable(v) => ptg.get_targets(v),
            Value::InstanceFieldAccess { instance, field, .. } => {
                let base = ptg.get_targets(instance);
                self.load_field(ptg, offset, &base, field)
            }
            Value::StaticFieldAccess { field, .. } => {
                let global = ptg.get_or_insert_node(PtgId::global(), None, PtgNodeKind::Global);
                self.load_field(ptg, offset, &[global].into_iter().collect(), field)
            }
            Value::ArrayLengthAccess { .. } => {
                let unknown = self.synthesize_unknown(ptg, offset);
                [unknown].into_iter().collect()
            }
            Value::ArrayElementAccess { array, .. } => {
                let base = self.resolve_value(ptg, offset, array);
                self.load_field(ptg, offset, &base, &array_element_field())
            }
            Value::Dereference { pointer } | Value::Reference { target: pointer } => {
                let base = self.resolve_value(ptg, offset, pointer);
                self.load_field(ptg, offset, &base, &pointee_field())
            }
            Value::StaticMethodReference { method } => {
                let node = self.allocate_delegate(ptg, offset, method.clone(), None);
                [node].into_iter().collect()
            }
            Value::VirtualMethodReference { instance, method } => {
                let bound_instance = match instance.as_ref() {
                    Value::Variable(v) => Some(v.clone()),
                    _ => None,
                };
                let node = self.allocate_delegate(ptg, offset, method.clone(), bound_instance);
                [node].into_iter().collect()
            }
        }
    }

    /// `r := &m` / `r := &obj::m`: allocates (or finds, by allocation-site id) a fresh
    /// `Delegate` node bound to `method` and `instance`.
    fn allocate_delegate(
        &self,
        ptg: &mut PointsToGraph,
        offset: Offset,
        method: MethodRef,
        instance: Option<Variable>,
    ) -> PtgNodeId {
        ptg.get_or_insert_node(
            PtgId::allocation_site(self.method.clone(), offset as i64),
            None,
            PtgNodeKind::Delegate { method, instance },
        )
    }

    fn synthesize_unknown(&self, ptg: &mut PointsToGraph, offset: Offset) -> PtgNodeId {
        ptg.get_or_insert_node(
            PtgId::allocation_site(self.method.clone(), offset as i64),
            None,
            PtgNodeKind::Unknown,
        )
    }

    /// Field load over a base node set: for each base node missing `field`, if it's
    /// reachable from a parameter, synthesize an escaping `Unknown` target first; then return the
    /// union of `n.targets[field]` over every base node.
    fn load_field(
        &self,
        ptg: &mut PointsToGraph,
        offset: Offset,
        base: &FxHashSet<PtgNodeId>,
        field: &FieldRef,
    ) -> FxHashSet<PtgNodeId> {
        for &n in base {
            let has_field = ptg.node(n).targets.contains_key(field);
            if !has_field && self.reachable_from_some_parameter(ptg, n) {
                let unknown = self.synthesize_unknown(ptg, offset);
                ptg.points_to_field(n, field.clone(), unknown);
            }
        }
        let mut out = FxHashSet::default();
        for &n in base {
            if let Some(targets) = ptg.node(n).targets.get(field) {
                out.extend(targets.iter().copied());
            }
        }
        out
    }

    /// Assigns `dest := source` (null load / variable copy / field load / convert
    /// cases all reduce to this): skips entirely if either side is a value type (copies of value
    /// types carry no pointer information), otherwise clears `dest`'s prior roots and points it at
    /// every node `source` resolves to.
    fn assign(&self, ptg: &mut PointsToGraph, offset: Offset, dest: &Variable, source: &Value) {
        if self.is_value_type(&dest.ty()) || self.is_value_type(&source.ty()) {
            return;
        }
        let targets = self.resolve_value(ptg, offset, source);
        ptg.remove_edges(dest);
        for t in targets {
            ptg.points_to(dest.clone(), t);
        }
    }

    /// Field/array/static/pointer store (field-store case): a may-analysis, so no
    /// strong update -- every base node accumulates the new targets alongside whatever it already
    /// pointed to.
    fn store_field(&self, ptg: &mut PointsToGraph, offset: Offset, base: &Value, field: &FieldRef, source: &Value) {
        let base_nodes = self.resolve_value(ptg, offset, base);
        let source_nodes = self.resolve_value(ptg, offset, source);
        for n in base_nodes {
            for &t in &source_nodes {
                ptg.points_to_field(n, field.clone(), t);
            }
        }
    }

    /// The delegate-constructor retargeting transfer: a `MethodCall` to `.ctor`
    /// immediately following a delegate allocation retargets the delegate's `instance` to its
    /// actual first argument, and points `result` (if any) at every delegate node reachable from
    /// `instance_operand`.
    fn delegate_constructor_call(
        &self,
        ptg: &mut PointsToGraph,
        offset: Offset,
        instance_operand: &Value,
        args: &[Value],
        result: Option<&Variable>,
    ) {
        let delegate_nodes = self.resolve_value(ptg, offset, instance_operand);
        let actual_instance = args.first().and_then(|a| match a {
            Value::Variable(v) => Some(v.clone()),
            _ => None,
        });

        if let Some(actual) = &actual_instance {
            for &node_id in &delegate_nodes {
                ptg.retarget_delegate_instance(node_id, actual.clone());
            }
        }

        if let Some(result) = result {
            ptg.remove_edges(result);
            for node_id in delegate_nodes {
                ptg.points_to(result.clone(), node_id);
            }
        }
    }
}

impl<'a, R: TypeResolver<TypeRef = TypeRef, MethodRef = MethodRef, FieldRef = FieldRef>> Transfer
    for PointsToAnalysis<'a, R>
{
    type Lattice = PointsToGraph;

    fn initial(&self, node: BlockId) -> PointsToGraph {
        if node == self.cfg.entry() {
            self.entry_graph()
        } else {
            PointsToGraph::new()
        }
    }

    fn compare(&self, a: &PointsToGraph, b: &PointsToGraph) -> bool {
        a.graph_equals(b)
    }

    fn join(&self, a: &PointsToGraph, b: &PointsToGraph) -> PointsToGraph {
        let mut out = a.clone();
        out.union(b).expect(
            "union of two points-to graphs produced by the same analysis should never see \
             conflicting node kinds for the same id; a failure here indicates an id-collision bug",
        );
        out
    }

    fn flow(&mut self, node: BlockId, input: &PointsToGraph) -> PointsToGraph {
        let mut ptg = input.clone();
        for instr in &self.cfg.node(node).instructions {
            self.apply_instruction(&mut ptg, instr);
        }
        ptg
    }
}

impl<'a, R: TypeResolver<TypeRef = TypeRef, MethodRef = MethodRef, FieldRef = FieldRef>> PointsToAnalysis<'a, R> {
    fn apply_instruction(&self, ptg: &mut PointsToGraph, instr: &Instruction) {
        let offset = instr.offset;
        match &instr.kind {
            InstructionKind::Load { result, source } => self.assign(ptg, offset, result, source),

            InstructionKind::Store { target, source } => match target {
                StoreTarget::Variable(v) => self.assign(ptg, offset, v, source),
                StoreTarget::InstanceField { instance, field } => {
                    self.store_field(ptg, offset, &Value::Variable(instance.clone()), field, source)
                }
                StoreTarget::StaticField { field } => {
                    let global = ptg.get_or_insert_node(PtgId::global(), None, PtgNodeKind::Global);
                    let source_nodes = self.resolve_value(ptg, offset, source);
                    for &t in &source_nodes {
                        ptg.points_to_field(global, field.clone(), t);
                    }
                }
                StoreTarget::ArrayElement { array, .. } => {
                    self.store_field(ptg, offset, array, &array_element_field(), source)
                }
                StoreTarget::Dereference { pointer } => {
                    self.store_field(ptg, offset, pointer, &pointee_field(), source)
                }
            },

            InstructionKind::CreateObject { result, ty, .. } | InstructionKind::CreateArray { result, element_ty: ty, .. } => {
                let node = ptg.get_or_insert_node(
                    PtgId::allocation_site(self.method.clone(), offset as i64),
                    Some(ty.clone()),
                    PtgNodeKind::Object,
                );
                ptg.remove_edges(result);
                ptg.points_to(result.clone(), node);
            }

            InstructionKind::Convert { result, source, .. } => self.assign(ptg, offset, result, source),

            InstructionKind::MethodCall {
                result,
                method,
                instance,
                args,
            } => {
                if method.is_constructor() {
                    if let Some(instance_operand) = instance {
                        self.delegate_constructor_call(ptg, offset, instance_operand, args, result.as_ref());
                        return;
                    }
                }
                // Interprocedural summary composition is out of scope: a
                // call's return value is treated conservatively as escaping/unknown.
                if let Some(result) = result {
                    if !self.is_value_type(&result.ty()) {
                        let unknown = self.synthesize_unknown(ptg, offset);
                        ptg.remove_edges(result);
                        ptg.points_to(result.clone(), unknown);
                    }
                }
            }

            InstructionKind::Phi { result, operands } => {
                for operand in operands {
                    let targets = self.resolve_value(ptg, offset, operand);
                    for t in targets {
                        ptg.points_to(result.clone(), t);
                    }
                }
            }

            InstructionKind::Return { value } => {
                let rv = Variable::local(RETURN_VARIABLE_NAME, TypeRef::named("?"), false);
                if let Some(value) = value {
                    self.assign(ptg, offset, &rv, value);
                } else {
                    ptg.remove_edges(&rv);
                }
            }

            InstructionKind::Throw { .. }
            | InstructionKind::ConditionalBranch { .. }
            | InstructionKind::UnconditionalBranch { .. }
            | InstructionKind::Switch { .. }
            | InstructionKind::TryStart
            | InstructionKind::TryEnd
            | InstructionKind::HandlerStart { .. } => {}
        }
    }
}
