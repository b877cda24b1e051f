//! Type inference: propagates the most-specific statically-known type through copy, load, and
//! call instructions.
//!
//! A full "type per variable, join = least common supertype" lattice would need a supertype
//! relation the `il-ir` type model (`TypeRef`) doesn't carry -- that lives in the `TypeResolver`
//! collaborator this engine treats opaquely, and type-metadata resolution is out of scope here.
//! This analysis therefore tracks a flatter, three-level fact per variable -- no information yet,
//! a single concretely-known type, or "conflicting, fall back to the variable's own declared
//! type" -- grounded on the flat constant-propagation lattice of
//! `hir-analysis::analyses::constant_propagation::ConstantValue`'s uninitialized/known/unknown
//! levels, generalized from values to types.

use rustc_hash::FxHashMap;

use il_ir::cfg::{BlockId, ControlFlowGraph};
use il_ir::instruction::{Instruction, InstructionKind};
use il_ir::method_body::MethodBody;
use il_ir::refs::TypeRef;
use il_ir::value::{Value, Variable};

use crate::solver::{solve, Direction, Transfer};

/// A variable's type fact at some program point: `Bottom` (no assignment reached this point yet),
/// `Known` (every path that reaches here assigns the same concrete type), or `Top` (two or more
/// paths disagree -- the variable's own declared type, from `Variable::ty`, is the best remaining
/// bound).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFact {
    Bottom,
    Known(TypeRef),
    Top,
}

impl TypeFact {
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) | (x, Self::Bottom) => x.clone(),
            (Self::Known(a), Self::Known(b)) if a == b => Self::Known(a.clone()),
            _ => Self::Top,
        }
    }
}

/// The per-variable type-fact map computed at some program point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeState {
    facts: FxHashMap<Variable, TypeFact>,
}

impl TypeState {
    pub fn fact_of(&self, v: &Variable) -> TypeFact {
        self.facts.get(v).cloned().unwrap_or(TypeFact::Bottom)
    }

    /// The most-specific type known for `v`: its inferred concrete type if every path agreed, else
    /// its own declared type.
    pub fn most_specific_type(&self, v: &Variable) -> TypeRef {
        match self.fact_of(v) {
            TypeFact::Known(ty) => ty,
            TypeFact::Bottom | TypeFact::Top => v.ty(),
        }
    }

    fn join(&self, other: &Self) -> Self {
        let mut facts = self.facts.clone();
        for (v, fact) in &other.facts {
            let joined = facts.get(v).unwrap_or(&TypeFact::Bottom).join(fact);
            facts.insert(v.clone(), joined);
        }
        Self { facts }
    }

    fn set(&mut self, v: Variable, fact: TypeFact) {
        self.facts.insert(v, fact);
    }
}

/// The forward type-inference framework instance.
pub struct TypeInference<'a> {
    cfg: &'a ControlFlowGraph,
}

impl<'a> TypeInference<'a> {
    pub fn new(cfg: &'a ControlFlowGraph) -> Self {
        Self { cfg }
    }

    fn fact_of_value(&self, state: &TypeState, value: &Value) -> TypeFact {
        match value {
            Value::Variable(v) => state.fact_of(v),
            other => TypeFact::Known(other.ty()),
        }
    }

    fn apply(&self, state: &mut TypeState, instr: &Instruction) {
        match &instr.kind {
            InstructionKind::Load { result, source } => {
                let fact = self.fact_of_value(state, source);
                state.set(result.clone(), fact);
            }
            InstructionKind::CreateObject { result, ty, .. }
            | InstructionKind::CreateArray {
                result,
                element_ty: ty,
                ..
            } => {
                state.set(result.clone(), TypeFact::Known(ty.clone()));
            }
            InstructionKind::Convert { result, ty, .. } => {
                state.set(result.clone(), TypeFact::Known(ty.clone()));
            }
            InstructionKind::Phi { result, operands } => {
                let mut fact = TypeFact::Bottom;
                for operand in operands {
                    fact = fact.join(&self.fact_of_value(state, operand));
                }
                state.set(result.clone(), fact);
            }
            InstructionKind::MethodCall { result: Some(result), .. } => {
                // Method return types require resolving the callee's signature, which is out of
                // this crate's scope; conservatively fall back to the declared type.
                state.set(result.clone(), TypeFact::Top);
            }
            _ => {}
        }
    }
}

impl Transfer for TypeInference<'_> {
    type Lattice = TypeState;

    fn initial(&self, _node: BlockId) -> TypeState {
        TypeState::default()
    }

    fn compare(&self, a: &TypeState, b: &TypeState) -> bool {
        a == b
    }

    fn join(&self, a: &TypeState, b: &TypeState) -> TypeState {
        a.join(b)
    }

    fn flow(&mut self, node: BlockId, input: &TypeState) -> TypeState {
        let mut state = input.clone();
        for instr in &self.cfg.node(node).instructions {
            self.apply(&mut state, instr);
        }
        state
    }
}

/// Runs type inference over `cfg` to a fixpoint, seeding `Entry` with each parameter's declared
/// type.
pub fn infer_types(
    cfg: &ControlFlowGraph,
    method_body: &MethodBody,
    config: &il_support::AnalysisConfig,
) -> TypeState {
    let mut entry_state = TypeState::default();
    for param in &method_body.parameters {
        entry_state.set(param.clone(), TypeFact::Known(param.ty()));
    }

    let mut analysis = SeededTypeInference {
        inner: TypeInference::new(cfg),
        entry: entry_state,
    };
    let result = solve(cfg, Direction::Forward, &mut analysis, config);
    result.out_of(cfg.exit()).clone()
}

struct SeededTypeInference<'a> {
    inner: TypeInference<'a>,
    entry: TypeState,
}

impl Transfer for SeededTypeInference<'_> {
    type Lattice = TypeState;

    fn initial(&self, node: BlockId) -> TypeState {
        if node == self.inner.cfg.entry() {
            self.entry.clone()
        } else {
            self.inner.initial(node)
        }
    }

    fn compare(&self, a: &TypeState, b: &TypeState) -> bool {
        self.inner.compare(a, b)
    }

    fn join(&self, a: &TypeState, b: &TypeState) -> TypeState {
        self.inner.join(a, b)
    }

    fn flow(&mut self, node: BlockId, input: &TypeState) -> TypeState {
        self.inner.flow(node, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_ir::cfg::CfgMode;
    use il_ir::instruction::ExceptionInformation;
    use pretty_assertions::assert_eq;

    fn var(name: &str, ty: &str) -> Variable {
        Variable::local(name, TypeRef::named(ty), false)
    }

    #[test]
    fn allocation_gives_an_exact_known_type() {
        let p = var("p", "Base");
        let alloc = Instruction::new(
            0,
            InstructionKind::CreateObject {
                result: p.clone(),
                ty: TypeRef::named("Derived"),
                args: vec![],
            },
        );
        let ret = Instruction::new(4, InstructionKind::Return { value: None });
        let body = MethodBody::new(vec![alloc, ret], vec![], vec![p.clone()], ExceptionInformation::default());
        let cfg = il_ir::cfg::build("M", &body, CfgMode::Normal).unwrap();
        let config = il_support::AnalysisConfig::default();
        let state = infer_types(&cfg, &body, &config);
        assert_eq!(state.most_specific_type(&p), TypeRef::named("Derived"));
    }

    #[test]
    fn conflicting_branch_types_fall_back_to_declared_type() {
        let c = var("c", "bool");
        let p = var("p", "Base");
        let branch = Instruction::new(
            0,
            InstructionKind::ConditionalBranch {
                condition: Value::Variable(c.clone()),
                true_label: "L_0008".into(),
                false_label: "L_0004".into(),
            },
        );
        let alloc_a = Instruction::new(
            4,
            InstructionKind::CreateObject {
                result: p.clone(),
                ty: TypeRef::named("A"),
                args: vec![],
            },
        );
        let goto = Instruction::new(
            5,
            InstructionKind::UnconditionalBranch {
                target_label: "L_000C".into(),
            },
        );
        let alloc_b = Instruction::new(
            8,
            InstructionKind::CreateObject {
                result: p.clone(),
                ty: TypeRef::named("B"),
                args: vec![],
            },
        );
        let ret = Instruction::new(12, InstructionKind::Return { value: None });
        let body = MethodBody::new(
            vec![branch, alloc_a, goto, alloc_b, ret],
            vec![],
            vec![c, p.clone()],
            ExceptionInformation::default(),
        );
        let cfg = il_ir::cfg::build("M", &body, CfgMode::Normal).unwrap();
        let config = il_support::AnalysisConfig::default();
        let state = infer_types(&cfg, &body, &config);
        assert_eq!(state.most_specific_type(&p), TypeRef::named("Base"));
    }
}
