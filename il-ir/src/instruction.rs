use compact_str::CompactString;
use rustc_hash::FxHashSet;

use crate::refs::{MethodRef, TypeRef};
use crate::value::{Value, Variable};

/// A bytecode address. Monotone non-decreasing within a method.
pub type Offset = u32;

/// The canonical label for the instruction at `offset`: `L_<offset:04X>`.
pub fn label_for_offset(offset: Offset) -> CompactString {
    CompactString::from(format!("L_{offset:04X}"))
}

/// The assignment target of a `Store` — everything a `Value` can describe as "referenceable" minus
/// the read-only forms (`Constant`, `UnknownValue`, method references).
#[derive(Debug, Clone)]
pub enum StoreTarget {
    Variable(Variable),
    InstanceField { instance: Variable, field: crate::refs::FieldRef },
    StaticField { field: crate::refs::FieldRef },
    ArrayElement { array: Box<Value>, indices: Vec<Value> },
    Dereference { pointer: Box<Value> },
}

impl StoreTarget {
    fn variables(&self) -> FxHashSet<Variable> {
        match self {
            Self::Variable(v) => [v.clone()].into_iter().collect(),
            Self::InstanceField { instance, .. } => [instance.clone()].into_iter().collect(),
            Self::StaticField { .. } => FxHashSet::default(),
            Self::ArrayElement { array, indices } => {
                let mut out = array.variables();
                for index in indices {
                    out.extend(index.variables());
                }
                out
            }
            Self::Dereference { pointer } => pointer.variables(),
        }
    }

    /// The variable actually assigned to, if this target writes through a bare variable rather
    /// than a heap location (field/array element/dereference targets modify a variable's
    /// *pointee*, not the variable itself).
    fn result_variable(&self) -> Option<Variable> {
        match self {
            Self::Variable(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// One of a handler's kinds, carried by a `Try`/`Catch`/`Finally`/`Fault` marker.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerKind {
    Catch { exception_type: TypeRef },
    Finally,
    Fault,
    Filter { filter_start_label: CompactString },
}

/// A protected block: a `[start_label, end_label)` range guarded by one `handler`.
#[derive(Debug, Clone)]
pub struct ProtectedBlock {
    pub start_label: CompactString,
    pub end_label: CompactString,
    pub handler: HandlerKind,
    pub handler_start_label: CompactString,
    pub handler_end_label: CompactString,
}

/// The full exception table of a method body.
#[derive(Debug, Clone, Default)]
pub struct ExceptionInformation {
    pub protected_blocks: Vec<ProtectedBlock>,
}

/// One instruction in a `MethodBody`. `offset`/`label` identify its position in the bytecode
/// stream; `kind` carries the operation.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub offset: Offset,
    pub label: CompactString,
    pub kind: InstructionKind,
}

#[derive(Debug, Clone)]
pub enum InstructionKind {
    Load { result: Variable, source: Value },
    Store { target: StoreTarget, source: Value },
    CreateObject { result: Variable, ty: TypeRef, args: Vec<Value> },
    CreateArray { result: Variable, element_ty: TypeRef, lengths: Vec<Value> },
    Convert { result: Variable, ty: TypeRef, source: Value },
    MethodCall {
        result: Option<Variable>,
        method: MethodRef,
        instance: Option<Value>,
        args: Vec<Value>,
    },
    Phi { result: Variable, operands: Vec<Value> },
    Return { value: Option<Value> },
    Throw { value: Value },
    ConditionalBranch {
        condition: Value,
        true_label: CompactString,
        false_label: CompactString,
    },
    UnconditionalBranch { target_label: CompactString },
    Switch {
        value: Value,
        case_labels: Vec<CompactString>,
        default_label: CompactString,
    },
    /// Marks the start of a protected block; carries no operands of its own — the block's extent
    /// and handler live in the owning `MethodBody`'s `ExceptionInformation`.
    TryStart,
    TryEnd,
    /// Marks the start of a handler region. `kind` is `Catch`/`Finally`/`Fault`/`Filter`.
    HandlerStart { kind: HandlerKind },
}

impl Instruction {
    pub fn new(offset: Offset, kind: InstructionKind) -> Self {
        Self {
            offset,
            label: label_for_offset(offset),
            kind,
        }
    }

    /// Every variable syntactically mentioned, read or written.
    pub fn variables(&self) -> FxHashSet<Variable> {
        let mut out = self.used_variables();
        out.extend(self.modified_variables());
        out
    }

    /// Variables read by this instruction.
    pub fn used_variables(&self) -> FxHashSet<Variable> {
        match &self.kind {
            InstructionKind::Load { source, .. } => source.variables(),
            InstructionKind::Store { target, source } => {
                let mut out = target.variables();
                out.extend(source.variables());
                out
            }
            InstructionKind::CreateObject { args, .. } => union_all(args),
            InstructionKind::CreateArray { lengths, .. } => union_all(lengths),
            InstructionKind::Convert { source, .. } => source.variables(),
            InstructionKind::MethodCall {
                instance, args, ..
            } => {
                let mut out = instance.as_ref().map(Value::variables).unwrap_or_default();
                out.extend(union_all(args));
                out
            }
            InstructionKind::Phi { operands, .. } => union_all(operands),
            InstructionKind::Return { value } => value.as_ref().map(Value::variables).unwrap_or_default(),
            InstructionKind::Throw { value } => value.variables(),
            InstructionKind::ConditionalBranch { condition, .. } => condition.variables(),
            InstructionKind::UnconditionalBranch { .. } => FxHashSet::default(),
            InstructionKind::Switch { value, .. } => value.variables(),
            InstructionKind::TryStart | InstructionKind::TryEnd | InstructionKind::HandlerStart { .. } => {
                FxHashSet::default()
            }
        }
    }

    /// Variables defined (written) by this instruction.
    pub fn modified_variables(&self) -> FxHashSet<Variable> {
        match self.result() {
            Some(v) => [v].into_iter().collect(),
            None => FxHashSet::default(),
        }
    }

    /// The single variable this instruction defines, if any.
    pub fn result(&self) -> Option<Variable> {
        match &self.kind {
            InstructionKind::Load { result, .. }
            | InstructionKind::CreateObject { result, .. }
            | InstructionKind::CreateArray { result, .. }
            | InstructionKind::Convert { result, .. }
            | InstructionKind::Phi { result, .. } => Some(result.clone()),
            InstructionKind::Store { target, .. } => target.result_variable(),
            InstructionKind::MethodCall { result, .. } => result.clone(),
            _ => None,
        }
    }

    /// Whether control can fall through to the textually-next instruction: false for
    /// unconditional branch, return, and throw; conditional branches fall through on the false
    /// edge, everything else always falls through.
    pub fn can_fall_through(&self) -> bool {
        !matches!(
            self.kind,
            InstructionKind::UnconditionalBranch { .. }
                | InstructionKind::Return { .. }
                | InstructionKind::Throw { .. }
                | InstructionKind::Switch { .. }
        )
    }

    /// True for instructions that end a basic block outright (branch/switch/return/throw).
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::ConditionalBranch { .. }
                | InstructionKind::UnconditionalBranch { .. }
                | InstructionKind::Switch { .. }
                | InstructionKind::Return { .. }
                | InstructionKind::Throw { .. }
        )
    }

    /// The labels this instruction can transfer control to directly, if it is a branch/switch.
    pub fn branch_targets(&self) -> Vec<CompactString> {
        match &self.kind {
            InstructionKind::ConditionalBranch {
                true_label,
                false_label,
                ..
            } => vec![true_label.clone(), false_label.clone()],
            InstructionKind::UnconditionalBranch { target_label } => vec![target_label.clone()],
            InstructionKind::Switch {
                case_labels,
                default_label,
                ..
            } => {
                let mut out = case_labels.clone();
                out.push(default_label.clone());
                out
            }
            _ => Vec::new(),
        }
    }
}

fn union_all(values: &[Value]) -> FxHashSet<Variable> {
    let mut out = FxHashSet::default();
    for v in values {
        out.extend(v.variables());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::FieldRef;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Variable {
        Variable::local(name, TypeRef::named("T"), false)
    }

    #[test]
    fn store_to_field_does_not_modify_the_instance_variable() {
        let instance = var("a");
        let instr = Instruction::new(
            0,
            InstructionKind::Store {
                target: StoreTarget::InstanceField {
                    instance: instance.clone(),
                    field: FieldRef::new("f"),
                },
                source: Value::Variable(var("v")),
            },
        );
        assert!(instr.modified_variables().is_empty());
        assert!(instr.used_variables().contains(&instance));
    }

    #[test]
    fn conditional_branch_can_fall_through() {
        let instr = Instruction::new(
            4,
            InstructionKind::ConditionalBranch {
                condition: Value::Variable(var("c")),
                true_label: "L_0010".into(),
                false_label: "L_0008".into(),
            },
        );
        assert!(instr.can_fall_through());
        assert!(instr.is_terminator());
    }

    #[test]
    fn unconditional_branch_cannot_fall_through() {
        let instr = Instruction::new(4, InstructionKind::UnconditionalBranch { target_label: "L_0010".into() });
        assert!(!instr.can_fall_through());
    }
}
